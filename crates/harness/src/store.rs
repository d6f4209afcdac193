use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use stylebook_core::{
    ids::{CreatedBy, StyleId, UserId},
    overlay::UserOverlay,
    style::{NewStyle, NewVariant, Style, StylePatch, Variant},
};
use stylebook_storage::{CatalogStore, OverlayUpdate, SqliteCatalogStore, StorageError, StyleFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    QueryStyles,
    GetStyle,
    GetVariants,
    CreateStyle,
    UpdateStyle,
    DeleteStyle,
    CreateVariant,
    GetUser,
    UpdateOverlay,
}

impl StoreOp {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::CreateStyle
                | Self::UpdateStyle
                | Self::DeleteStyle
                | Self::CreateVariant
                | Self::UpdateOverlay
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFault {
    Reject,
    Timeout,
}

struct ScriptedFault {
    op: Option<StoreOp>,
    kind: WriteFault,
}

/// Wraps a real SQLite store with scripted failures, write latency, delayed
/// visibility of writes and a log of every call.
pub struct ScriptedStore {
    backing: Arc<SqliteCatalogStore>,
    calls: Mutex<Vec<StoreCall>>,
    faults: Mutex<VecDeque<ScriptedFault>>,
    reads_fail: AtomicBool,
    write_latency: Mutex<Duration>,
    visibility_lag: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedStore {
    pub fn new(backing: SqliteCatalogStore) -> Self {
        Self {
            backing: Arc::new(backing),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(VecDeque::new()),
            reads_fail: AtomicBool::new(false),
            write_latency: Mutex::new(Duration::ZERO),
            visibility_lag: Mutex::new(Duration::ZERO),
        }
    }

    /// In-memory store holding the canonical system styles.
    pub fn seeded() -> Result<Self, StorageError> {
        let backing = SqliteCatalogStore::open_in_memory()?;
        backing.seed_system_styles()?;
        Ok(Self::new(backing))
    }

    /// Direct access for fixtures. Bypasses the log and all faults.
    pub fn backing(&self) -> &SqliteCatalogStore {
        &self.backing
    }

    pub fn fail_next_writes(&self, count: usize) {
        let mut faults = lock(&self.faults);
        for _ in 0..count {
            faults.push_back(ScriptedFault {
                op: None,
                kind: WriteFault::Reject,
            });
        }
    }

    /// Fails the next write once it is a write of `op`; earlier writes of
    /// other kinds go through.
    pub fn fail_next(&self, op: StoreOp) {
        lock(&self.faults).push_back(ScriptedFault {
            op: Some(op),
            kind: WriteFault::Reject,
        });
    }

    pub fn time_out_next_write(&self) {
        lock(&self.faults).push_back(ScriptedFault {
            op: None,
            kind: WriteFault::Timeout,
        });
    }

    pub fn fail_reads(&self, fail: bool) {
        self.reads_fail.store(fail, Ordering::SeqCst);
    }

    /// Every write waits this long before it is answered.
    pub fn set_write_latency(&self, latency: Duration) {
        *lock(&self.write_latency) = latency;
    }

    /// Acknowledged overlay, update and delete writes only become readable
    /// after this long.
    pub fn set_visibility_lag(&self, lag: Duration) {
        *lock(&self.visibility_lag) = lag;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, op: StoreOp) -> usize {
        lock(&self.calls).iter().filter(|c| c.op == op).count()
    }

    pub fn write_count(&self) -> usize {
        lock(&self.calls).iter().filter(|c| c.op.is_write()).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, op: StoreOp) {
        lock(&self.calls).push(StoreCall {
            op,
            at: Instant::now(),
        });
    }

    fn check_read(&self, op: StoreOp) -> Result<(), StorageError> {
        self.record(op);
        if self.reads_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(format!("scripted read failure ({op:?})")));
        }
        Ok(())
    }

    async fn check_write(&self, op: StoreOp) -> Result<(), StorageError> {
        self.record(op);
        let latency = *lock(&self.write_latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let fault = {
            let mut faults = lock(&self.faults);
            let due = faults
                .front()
                .is_some_and(|f| f.op.is_none_or(|o| o == op));
            if due {
                faults.pop_front().map(|f| f.kind)
            } else {
                None
            }
        };
        match fault {
            Some(WriteFault::Reject) => {
                debug!(?op, "scripted write rejection");
                Err(StorageError::Unavailable(format!("scripted write failure ({op:?})")))
            }
            Some(WriteFault::Timeout) => {
                debug!(?op, "scripted write timeout");
                Err(StorageError::Timeout(latency))
            }
            None => Ok(()),
        }
    }

    fn lag(&self) -> Duration {
        *lock(&self.visibility_lag)
    }
}

/// Applies `write` to the backing store after `lag` on a detached task.
fn apply_lagged<F, Fut>(backing: &Arc<SqliteCatalogStore>, lag: Duration, write: F)
where
    F: FnOnce(Arc<SqliteCatalogStore>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), StorageError>> + Send,
{
    let backing = Arc::clone(backing);
    tokio::spawn(async move {
        tokio::time::sleep(lag).await;
        if let Err(e) = write(backing).await {
            warn!(error = %e, "lagged write failed");
        }
    });
}

#[async_trait]
impl CatalogStore for ScriptedStore {
    async fn query_styles(&self, filter: &StyleFilter) -> Result<Vec<Style>, StorageError> {
        self.check_read(StoreOp::QueryStyles)?;
        self.backing.query_styles(filter).await
    }

    async fn get_style(&self, style_id: &StyleId) -> Result<Option<Style>, StorageError> {
        self.check_read(StoreOp::GetStyle)?;
        self.backing.get_style(style_id).await
    }

    async fn get_variants(&self, style_ids: &[StyleId]) -> Result<Vec<Variant>, StorageError> {
        self.check_read(StoreOp::GetVariants)?;
        self.backing.get_variants(style_ids).await
    }

    async fn create_style(
        &self,
        draft: &NewStyle,
        created_by: &CreatedBy,
    ) -> Result<Style, StorageError> {
        self.check_write(StoreOp::CreateStyle).await?;
        self.backing.create_style(draft, created_by).await
    }

    async fn update_style(&self, style_id: &StyleId, patch: &StylePatch) -> Result<(), StorageError> {
        self.check_write(StoreOp::UpdateStyle).await?;
        let lag = self.lag();
        if lag.is_zero() {
            return self.backing.update_style(style_id, patch).await;
        }
        let (style_id, patch) = (style_id.clone(), patch.clone());
        apply_lagged(&self.backing, lag, move |backing| async move {
            backing.update_style(&style_id, &patch).await
        });
        Ok(())
    }

    async fn delete_style(&self, style_id: &StyleId) -> Result<(), StorageError> {
        self.check_write(StoreOp::DeleteStyle).await?;
        let lag = self.lag();
        if lag.is_zero() {
            return self.backing.delete_style(style_id).await;
        }
        let style_id = style_id.clone();
        apply_lagged(&self.backing, lag, move |backing| async move {
            backing.delete_style(&style_id).await
        });
        Ok(())
    }

    async fn create_variant(
        &self,
        style_id: &StyleId,
        draft: &NewVariant,
        created_by: &CreatedBy,
    ) -> Result<Variant, StorageError> {
        self.check_write(StoreOp::CreateVariant).await?;
        self.backing.create_variant(style_id, draft, created_by).await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<Option<UserOverlay>, StorageError> {
        self.check_read(StoreOp::GetUser)?;
        self.backing.get_user(user_id).await
    }

    async fn update_overlay(
        &self,
        user_id: &UserId,
        update: &OverlayUpdate,
    ) -> Result<(), StorageError> {
        self.check_write(StoreOp::UpdateOverlay).await?;
        let lag = self.lag();
        if lag.is_zero() {
            return self.backing.update_overlay(user_id, update).await;
        }
        let (user_id, update) = (user_id.clone(), update.clone());
        apply_lagged(&self.backing, lag, move |backing| async move {
            backing.update_overlay(&user_id, &update).await
        });
        Ok(())
    }
}
