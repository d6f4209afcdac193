pub mod aggregator;
pub mod config;
pub mod error;
pub mod events;
pub mod overlay;
pub mod scheduler;
pub mod session;
pub mod snapshot;

pub use aggregator::{CatalogAggregator, CatalogView};
pub use config::EngineConfig;
pub use error::{EngineError, ValidationError};
pub use events::{CatalogEvents, CatalogListener, CatalogSignal, ChangeReason, ListenerId};
pub use overlay::OverlayRepository;
pub use scheduler::ReconciliationScheduler;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use stylebook_core::{
    catalog::{Catalog, CatalogEntry},
    error::CoreError,
    ids::{CreatedBy, StyleId, UserId, VariantId},
    overlay::{OverlayField, UserOverlay},
    selection::{ResolvedPrompt, Selection},
    style::{NewStyle, Style, StylePatch, Variant},
};
use stylebook_storage::{CatalogStore, OverlayUpdate, StorageError};

use crate::session::SessionState;
use crate::snapshot::{SessionSnapshot, SnapshotScope};

/// Prefix of the local id a created style carries until the store assigns one.
pub const PROVISIONAL_PREFIX: &str = "pending-";

struct EngineInner {
    store: Arc<dyn CatalogStore>,
    config: EngineConfig,
    aggregator: CatalogAggregator,
    overlays: OverlayRepository,
    scheduler: ReconciliationScheduler,
    events: CatalogEvents,
    session: Mutex<SessionState>,
}

impl EngineInner {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A mutation applied locally whose remote call has not settled yet.
struct PendingMutation {
    action: &'static str,
    user_id: UserId,
    epoch: u64,
    snapshot: SessionSnapshot,
    /// Position among the mutations begun in this session.
    sequence: u64,
    /// Other mutations were still in flight when the snapshot was taken.
    overlapped: bool,
    /// A reconciliation was cancelled to make way for this mutation.
    displaced_reconciliation: bool,
}

/// Local view of one user's style catalog, kept in step with the remote
/// store. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CatalogEngine {
    inner: Arc<EngineInner>,
}

impl CatalogEngine {
    pub fn new(store: Arc<dyn CatalogStore>, config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let aggregator = CatalogAggregator::new(Arc::clone(&store), config.variant_batch_size);
        let overlays = OverlayRepository::new(Arc::clone(&store));
        Ok(Self {
            inner: Arc::new(EngineInner {
                store,
                config,
                aggregator,
                overlays,
                scheduler: ReconciliationScheduler::new(),
                events: CatalogEvents::new(),
                session: Mutex::new(SessionState::default()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &CatalogEvents {
        &self.inner.events
    }

    pub fn on_catalog_changed(
        &self,
        listener: impl Fn(&Catalog, ChangeReason) + Send + Sync + 'static,
    ) -> ListenerId {
        self.inner.events.on_catalog_changed(listener)
    }

    pub fn subscribe_signals(&self) -> broadcast::Receiver<CatalogSignal> {
        self.inner.events.subscribe_signals()
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Starts a session for `user_id` (`None` for anonymous). Read failures
    /// yield the fallback catalog rather than an error.
    pub async fn login(&self, user_id: Option<UserId>) -> Catalog {
        let (epoch, previous) = {
            let mut session = self.inner.session();
            let previous = session.user_id.clone();
            (session.begin_epoch(user_id.clone()), previous)
        };
        if let Some(previous) = &previous {
            self.inner.scheduler.cancel(previous);
        }

        let view = self.inner.aggregator.build_view(user_id.as_ref()).await;
        let catalog = self.install_view(view, epoch, ChangeReason::Login);
        info!(user = ?user_id, styles = catalog.len(), "session started");
        catalog
    }

    pub async fn logout(&self) -> Catalog {
        info!(user = ?self.user_id(), "signing out");
        self.login(None).await
    }

    /// Forced re-fetch with the same fallback policy as [`Self::login`].
    /// Supersedes any pending reconciliation.
    pub async fn refresh(&self) -> Catalog {
        let (user_id, epoch) = {
            let session = self.inner.session();
            (session.user_id.clone(), session.epoch)
        };
        if let Some(user_id) = &user_id {
            self.inner.scheduler.cancel(user_id);
        }
        let view = self.inner.aggregator.build_view(user_id.as_ref()).await;
        self.install_view(view, epoch, ChangeReason::Refresh)
    }

    /// Reads the community library and caches it for add-to-account lookups.
    pub async fn browse_library(&self) -> Result<Vec<CatalogEntry>, EngineError> {
        let epoch = self.inner.session().epoch;
        let library = self
            .inner
            .aggregator
            .library()
            .await
            .map_err(EngineError::RemoteRead)?;
        let mut session = self.inner.session();
        if session.epoch == epoch {
            session.library = library.clone();
        }
        debug!(styles = library.len(), "library loaded");
        Ok(library)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The current catalog. Later changes produce a new `Catalog`; this one
    /// never changes.
    pub fn catalog(&self) -> Catalog {
        self.inner.session().catalog.clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.inner.session().user_id.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session().user_id.is_some()
    }

    pub fn overlay(&self) -> Option<UserOverlay> {
        self.inner.session().overlay.clone()
    }

    pub fn library(&self) -> Vec<CatalogEntry> {
        self.inner.session().library.clone()
    }

    pub fn selection(&self) -> Option<Selection> {
        self.inner.session().selection.clone()
    }

    pub fn resolved_prompt(&self) -> Option<ResolvedPrompt> {
        let session = self.inner.session();
        session.selection.as_ref()?.resolve(&session.catalog)
    }

    /// Mutations applied locally and still waiting on the store.
    pub fn pending_mutations(&self) -> usize {
        self.inner.session().in_flight
    }

    pub fn has_pending_reconciliation(&self) -> bool {
        self.user_id()
            .is_some_and(|user_id| self.inner.scheduler.is_pending(&user_id))
    }

    pub fn reconciliation_due(&self) -> Option<Instant> {
        self.user_id()
            .and_then(|user_id| self.inner.scheduler.due_at(&user_id))
    }

    pub fn select(
        &self,
        style_id: &StyleId,
        variant_id: Option<VariantId>,
    ) -> Result<ResolvedPrompt, EngineError> {
        let mut session = self.inner.session();
        let selection = Selection::new(style_id.clone(), variant_id);
        let Some(resolved) = selection.resolve(&session.catalog) else {
            let err = if session.catalog.contains(style_id) {
                ValidationError::UnknownVariant {
                    style: style_id.clone(),
                    variant: selection.variant_id,
                }
            } else {
                ValidationError::UnknownStyle(style_id.clone())
            };
            return Err(err.into());
        };
        session.selection = Some(selection);
        Ok(resolved)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Creates a private style. It shows up under a provisional id at once
    /// and is swapped for the stored record when the store answers.
    pub async fn create_style(&self, draft: NewStyle) -> Result<Style, EngineError> {
        self.require_user()?;
        let draft = draft.normalized().map_err(invalid_draft)?;
        self.create_owned("create", draft).await
    }

    /// Private copy of a catalog or library style, variants included.
    pub async fn copy_style(&self, source_id: &StyleId) -> Result<Style, EngineError> {
        let user_id = self.require_user()?;
        let source = self.resolve_entry(source_id).await?;
        if !source.style.is_public && !source.style.is_owned_by(&user_id) {
            return Err(ValidationError::NotPublic(source_id.clone()).into());
        }
        let draft = NewStyle::copy_of(&source.style, &source.variants, &self.inner.config.copy_suffix)
            .normalized()
            .map_err(invalid_draft)?;
        self.create_owned("copy", draft).await
    }

    pub async fn update_style(&self, style_id: &StyleId, patch: &StylePatch) -> Result<(), EngineError> {
        self.require_user()?;
        ensure_stored(style_id)?;
        patch.validate().map_err(invalid_draft)?;
        let pending = self.begin("update", SnapshotScope::CATALOG, |session, user_id| {
            let entry = session
                .catalog
                .find(style_id)
                .ok_or_else(|| ValidationError::UnknownStyle(style_id.clone()))?;
            ensure_editable(&entry.style, user_id)?;
            let next = session
                .catalog
                .map_entry(style_id, |entry| entry.style.apply_patch(patch));
            session.replace_catalog(next);
            Ok(())
        })?;
        let result = self.inner.store.update_style(style_id, patch).await;
        self.settle(pending, result)
    }

    /// Deletes an owned private style and its variants.
    pub async fn delete_style(&self, style_id: &StyleId) -> Result<(), EngineError> {
        self.require_user()?;
        ensure_stored(style_id)?;
        let pending = self.begin("delete", SnapshotScope::CATALOG, |session, user_id| {
            let entry = session
                .catalog
                .find(style_id)
                .ok_or_else(|| ValidationError::UnknownStyle(style_id.clone()))?;
            ensure_editable(&entry.style, user_id)?;
            let next = session.catalog.without(style_id);
            session.replace_catalog(next);
            Ok(())
        })?;
        let result = self.inner.store.delete_style(style_id).await;
        self.settle(pending, result)
    }

    /// Puts a shared style in the user's catalog. Adding also unhides, so an
    /// explicit add is never swallowed by an older hide.
    pub async fn add_to_account(&self, style_id: &StyleId) -> Result<(), EngineError> {
        self.require_user()?;
        let entry = self.resolve_entry(style_id).await?;
        let (pending, update) =
            self.begin_with("add", SnapshotScope::CATALOG_AND_OVERLAY, |session, user_id| {
                let update = if entry.style.is_system() {
                    OverlayUpdate::new().remove(OverlayField::Hidden, style_id.clone())
                } else if entry.style.is_public {
                    OverlayUpdate::new()
                        .union(OverlayField::Added, style_id.clone())
                        .remove(OverlayField::Hidden, style_id.clone())
                } else if entry.style.is_owned_by(user_id) {
                    return Err(ValidationError::OwnedStyle(style_id.clone()));
                } else {
                    return Err(ValidationError::NotPublic(style_id.clone()));
                };
                if let Some(overlay) = session.overlay.as_mut() {
                    update.apply_to(overlay);
                }
                let next = session.catalog.with_entry(entry);
                session.replace_catalog(next);
                Ok(update)
            })?;
        let result = self.inner.overlays.apply(&pending.user_id, &update).await;
        self.settle(pending, result)
    }

    /// Takes a style out of the user's catalog without touching the style:
    /// system styles are hidden, added styles are un-added. A target absent
    /// from every local list gets exactly one forced re-fetch.
    pub async fn remove_from_account(&self, style_id: &StyleId) -> Result<(), EngineError> {
        self.require_user()?;
        let known = self.inner.session().knows(style_id);
        if !known {
            self.refetch_for_drift(style_id).await?;
        }

        let (pending, update) =
            self.begin_with("remove", SnapshotScope::CATALOG_AND_OVERLAY, |session, user_id| {
                let is_added = session
                    .overlay
                    .as_ref()
                    .is_some_and(|o| o.is_added(style_id));
                let update = match session.catalog.find(style_id) {
                    Some(entry) if entry.style.is_system() => {
                        OverlayUpdate::new().union(OverlayField::Hidden, style_id.clone())
                    }
                    Some(entry) if entry.style.is_private_to(user_id) => {
                        return Err(ValidationError::OwnedStyle(style_id.clone()));
                    }
                    Some(_) => OverlayUpdate::new().remove(OverlayField::Added, style_id.clone()),
                    None if is_added => {
                        OverlayUpdate::new().remove(OverlayField::Added, style_id.clone())
                    }
                    None => return Err(ValidationError::UnknownStyle(style_id.clone())),
                };
                if let Some(overlay) = session.overlay.as_mut() {
                    update.apply_to(overlay);
                }
                let next = session.catalog.without(style_id);
                session.replace_catalog(next);
                Ok(update)
            })?;
        let result = self.inner.overlays.apply(&pending.user_id, &update).await;
        self.settle(pending, result)
    }

    /// Unhides a hidden style.
    pub async fn restore_style(&self, style_id: &StyleId) -> Result<(), EngineError> {
        self.require_user()?;
        let hidden = self
            .inner
            .session()
            .overlay
            .as_ref()
            .is_some_and(|o| o.is_hidden(style_id));
        if !hidden {
            return Err(ValidationError::NotHidden(style_id.clone()).into());
        }
        // A hidden style that no longer exists can still be unhidden.
        let entry = match self.resolve_entry(style_id).await {
            Ok(entry) => Some(entry),
            Err(EngineError::Validation(ValidationError::UnknownStyle(_))) => None,
            Err(e) => return Err(e),
        };

        let pending = self.begin("restore", SnapshotScope::CATALOG_AND_OVERLAY, |session, user_id| {
            let overlay = session
                .overlay
                .as_mut()
                .ok_or_else(|| ValidationError::NotHidden(style_id.clone()))?;
            if !overlay.remove(OverlayField::Hidden, style_id) {
                return Err(ValidationError::NotHidden(style_id.clone()));
            }
            let visible = entry.as_ref().is_some_and(|e| {
                e.style.is_system()
                    || (e.style.is_public && overlay.is_added(style_id))
                    || e.style.is_private_to(user_id)
            });
            if let Some(entry) = entry.filter(|_| visible) {
                let next = session.catalog.with_entry(entry);
                session.replace_catalog(next);
            }
            Ok(())
        })?;
        let result = self
            .inner
            .overlays
            .remove_from_overlay(&pending.user_id, OverlayField::Hidden, style_id)
            .await;
        self.settle(pending, result)
    }

    // ========================================================================
    // Optimistic Protocol
    // ========================================================================

    fn require_user(&self) -> Result<UserId, ValidationError> {
        self.inner.session().require_user()
    }

    fn begin(
        &self,
        action: &'static str,
        scope: SnapshotScope,
        apply: impl FnOnce(&mut SessionState, &UserId) -> Result<(), ValidationError>,
    ) -> Result<PendingMutation, EngineError> {
        self.begin_with(action, scope, apply).map(|(pending, ())| pending)
    }

    /// Snapshots the lists in `scope` and applies the change locally, all
    /// under one lock. `apply` checks every precondition before it writes.
    fn begin_with<T>(
        &self,
        action: &'static str,
        scope: SnapshotScope,
        apply: impl FnOnce(&mut SessionState, &UserId) -> Result<T, ValidationError>,
    ) -> Result<(PendingMutation, T), EngineError> {
        let (user_id, epoch, snapshot, sequence, overlapped, value, catalog) = {
            let mut session = self.inner.session();
            let user_id = session.require_user()?;
            let snapshot = SessionSnapshot::capture(&session, scope);
            let value = apply(&mut session, &user_id)?;
            let overlapped = session.in_flight > 0;
            session.in_flight += 1;
            session.mutations_started += 1;
            (
                user_id,
                session.epoch,
                snapshot,
                session.mutations_started,
                overlapped,
                value,
                session.catalog.clone(),
            )
        };

        let displaced_reconciliation = self.inner.scheduler.cancel(&user_id);
        debug!(action, user = %user_id, "applied optimistically");
        self.inner.events.catalog_changed(&catalog, ChangeReason::Optimistic);

        let pending = PendingMutation {
            action,
            user_id,
            epoch,
            snapshot,
            sequence,
            overlapped,
            displaced_reconciliation,
        };
        Ok((pending, value))
    }

    fn settle<T>(
        &self,
        pending: PendingMutation,
        result: Result<T, StorageError>,
    ) -> Result<T, EngineError> {
        match result {
            Ok(value) => {
                self.acknowledge(pending);
                Ok(value)
            }
            Err(source) => Err(self.roll_back(pending, source)),
        }
    }

    fn acknowledge(&self, pending: PendingMutation) {
        let current = {
            let mut session = self.inner.session();
            let current = session.same_session(&pending.user_id, pending.epoch);
            if current {
                session.in_flight = session.in_flight.saturating_sub(1);
            }
            current
        };
        debug!(action = pending.action, user = %pending.user_id, "store acknowledged");
        if current {
            self.schedule_reconciliation(&pending.user_id, pending.epoch);
        }
        self.inner.events.possibly_stale(&pending.user_id);
    }

    /// Puts the snapshot back verbatim. Returns the error to hand the caller.
    ///
    /// A snapshot only describes the store when no other mutation overlapped
    /// this one. Otherwise it may carry another mutation's rejected change or
    /// drop one still pending, so a reconciliation is always armed.
    fn roll_back(&self, pending: PendingMutation, source: StorageError) -> EngineError {
        let PendingMutation {
            action,
            user_id,
            epoch,
            snapshot,
            sequence,
            overlapped,
            displaced_reconciliation,
        } = pending;

        let restored = {
            let mut session = self.inner.session();
            if session.same_session(&user_id, epoch) {
                let interleaved = overlapped
                    || session.in_flight > 1
                    || session.mutations_started != sequence;
                session.in_flight = session.in_flight.saturating_sub(1);
                let catalog = snapshot
                    .restore(&mut session)
                    .then(|| session.catalog.clone());
                Some((catalog, interleaved))
            } else {
                None
            }
        };
        warn!(action, user = %user_id, error = %source, "store rejected mutation, rolled back");

        if let Some((catalog, interleaved)) = restored {
            if let Some(catalog) = catalog {
                self.inner.events.catalog_changed(&catalog, ChangeReason::Rollback);
            }
            if interleaved {
                debug!(action, user = %user_id, "rollback overlapped other mutations, reconciling");
            }
            if displaced_reconciliation || interleaved {
                self.schedule_reconciliation(&user_id, epoch);
            }
        }
        EngineError::RemoteWrite { action, source }
    }

    async fn create_owned(&self, action: &'static str, draft: NewStyle) -> Result<Style, EngineError> {
        let (pending, provisional_id) = self.begin_with(action, SnapshotScope::CATALOG, |session, user_id| {
            let entry = provisional_entry(&draft, user_id);
            let id = entry.id().clone();
            let next = session.catalog.with_entry(entry);
            session.replace_catalog(next);
            Ok(id)
        })?;

        let created_by = CreatedBy::from(&pending.user_id);
        match self.persist_new_style(&draft, &created_by).await {
            Ok(entry) => {
                self.swap_provisional(&provisional_id, &entry, pending.epoch);
                let style = entry.style;
                info!(action, user = %pending.user_id, style = %style.id, "style stored");
                self.acknowledge(pending);
                Ok(style)
            }
            Err(source) => Err(self.roll_back(pending, source)),
        }
    }

    /// Writes the style and then each variant. If a variant write fails the
    /// style is deleted again so no half-created record is left behind.
    async fn persist_new_style(
        &self,
        draft: &NewStyle,
        created_by: &CreatedBy,
    ) -> Result<CatalogEntry, StorageError> {
        let store = &self.inner.store;
        let style = store.create_style(draft, created_by).await?;
        let mut variants = Vec::with_capacity(draft.variants.len());
        for variant in &draft.variants {
            match store.create_variant(&style.id, variant, created_by).await {
                Ok(created) => variants.push(created),
                Err(e) => {
                    if let Err(cleanup) = store.delete_style(&style.id).await {
                        warn!(style = %style.id, error = %cleanup, "could not remove partially created style");
                    }
                    return Err(e);
                }
            }
        }
        Ok(CatalogEntry::new(style, variants))
    }

    fn swap_provisional(&self, provisional_id: &StyleId, entry: &CatalogEntry, epoch: u64) {
        let catalog = {
            let mut session = self.inner.session();
            if session.epoch != epoch || !session.catalog.contains(provisional_id) {
                return;
            }
            let was_selected = session
                .selection
                .as_ref()
                .is_some_and(|s| &s.style_id == provisional_id);
            let next = session.catalog.without(provisional_id).with_entry(entry.clone());
            session.replace_catalog(next);
            if was_selected {
                session.selection = Some(Selection::default_of(entry));
            }
            session.catalog.clone()
        };
        self.inner.events.catalog_changed(&catalog, ChangeReason::Optimistic);
    }

    /// Catalog, then library cache, then one store read.
    async fn resolve_entry(&self, style_id: &StyleId) -> Result<CatalogEntry, EngineError> {
        let local = self.inner.session().find_entry(style_id);
        if let Some(entry) = local {
            return Ok(entry);
        }
        let style = self
            .inner
            .store
            .get_style(style_id)
            .await
            .map_err(EngineError::RemoteRead)?
            .ok_or_else(|| ValidationError::UnknownStyle(style_id.clone()))?;
        self.inner
            .aggregator
            .attach_variants(vec![style])
            .await
            .map_err(EngineError::RemoteRead)?
            .pop()
            .ok_or_else(|| ValidationError::UnknownStyle(style_id.clone()).into())
    }

    /// One forced re-fetch. Never retried.
    async fn refetch_for_drift(&self, style_id: &StyleId) -> Result<(), EngineError> {
        let (user_id, epoch) = {
            let session = self.inner.session();
            (session.require_user()?, session.epoch)
        };
        debug!(user = %user_id, style = %style_id, "target not held locally, re-fetching once");
        let view = self
            .inner
            .aggregator
            .try_build_view(Some(&user_id))
            .await
            .map_err(EngineError::RemoteRead)?;
        self.install_view(view, epoch, ChangeReason::Refresh);

        let found = self.inner.session().knows(style_id);
        if found {
            Ok(())
        } else {
            warn!(user = %user_id, style = %style_id, "target still missing after re-fetch");
            Err(EngineError::NotFoundDrift(style_id.clone()))
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    fn schedule_reconciliation(&self, user_id: &UserId, epoch: u64) {
        let engine = Arc::downgrade(&self.inner);
        let target = user_id.clone();
        let delay = self.inner.config.reconcile_delay;
        self.inner.scheduler.schedule(user_id.clone(), delay, async move {
            if let Some(inner) = engine.upgrade() {
                CatalogEngine { inner }.reconcile(&target, epoch).await;
            }
        });
        debug!(user = %user_id, delay_ms = delay.as_millis() as u64, "reconciliation armed");
    }

    /// Silent full re-fetch. Dropped if the session changed, a mutation is
    /// in flight, or the catalog moved while reading. A failed read keeps
    /// the optimistic catalog.
    async fn reconcile(&self, user_id: &UserId, epoch: u64) {
        let revision = {
            let session = self.inner.session();
            if !session.same_session(user_id, epoch) {
                debug!(user = %user_id, "session ended, skipping reconciliation");
                return;
            }
            if session.in_flight > 0 {
                debug!(user = %user_id, in_flight = session.in_flight, "mutation in flight, skipping reconciliation");
                return;
            }
            session.revision
        };

        let view = match self.inner.aggregator.try_build_view(Some(user_id)).await {
            Ok(view) => view,
            Err(e) => {
                warn!(user = %user_id, error = %e, "reconciliation read failed, keeping local catalog");
                return;
            }
        };

        let catalog = {
            let mut session = self.inner.session();
            if !session.same_session(user_id, epoch)
                || session.revision != revision
                || session.in_flight > 0
            {
                debug!(user = %user_id, "catalog moved during reconciliation, dropping result");
                return;
            }
            let changed = match (session.catalog.digest(), view.catalog.digest()) {
                (Ok(before), Ok(after)) => before != after,
                _ => true,
            };
            session.overlay = view.overlay;
            session.replace_catalog(view.catalog);
            info!(user = %user_id, styles = session.catalog.len(), changed, "catalog reconciled");
            session.catalog.clone()
        };
        self.inner.events.catalog_changed(&catalog, ChangeReason::Reconciled);
    }

    /// Returns the catalog now installed, which is the current one if the
    /// session moved on while `view` was being read.
    fn install_view(&self, view: CatalogView, epoch: u64, reason: ChangeReason) -> Catalog {
        let catalog = {
            let mut session = self.inner.session();
            if session.epoch != epoch {
                debug!(?reason, "session changed while reading, dropping result");
                return session.catalog.clone();
            }
            session.overlay = view.overlay;
            session.replace_catalog(view.catalog);
            session.catalog.clone()
        };
        self.inner.events.catalog_changed(&catalog, reason);
        catalog
    }
}

fn invalid_draft(err: CoreError) -> ValidationError {
    match err {
        CoreError::InvalidData(msg) | CoreError::Serialization(msg) => ValidationError::InvalidDraft(msg),
    }
}

/// A provisional id has no store record to edit until its create settles.
fn ensure_stored(style_id: &StyleId) -> Result<(), ValidationError> {
    if style_id.as_str().starts_with(PROVISIONAL_PREFIX) {
        return Err(ValidationError::StillSaving(style_id.clone()));
    }
    Ok(())
}

/// System styles and other users' or public styles are read-only here.
fn ensure_editable(style: &Style, user_id: &UserId) -> Result<(), ValidationError> {
    if style.is_system() {
        return Err(ValidationError::SystemStyle(style.id.clone()));
    }
    if !style.is_owned_by(user_id) {
        return Err(ValidationError::NotOwner(style.id.clone()));
    }
    if style.is_public {
        return Err(ValidationError::PublicStyle(style.id.clone()));
    }
    Ok(())
}

fn provisional_entry(draft: &NewStyle, user_id: &UserId) -> CatalogEntry {
    let created_by = CreatedBy::from(user_id);
    let created_at = Utc::now();
    let style = Style {
        id: StyleId::new(format!("{PROVISIONAL_PREFIX}{}", StyleId::generate())),
        name: draft.name.clone(),
        display_name: draft.display_name.clone(),
        description: draft.description.clone(),
        prompt_template: draft.prompt_template.clone(),
        is_public: false,
        created_by: created_by.clone(),
        usage_count: 0,
        created_at,
    };
    let variants = draft
        .variants
        .iter()
        .map(|v| Variant {
            id: VariantId::new(format!("{PROVISIONAL_PREFIX}{}", VariantId::generate())),
            style_id: style.id.clone(),
            name: v.name.clone(),
            description: v.description.clone(),
            prompt_override: v.prompt_override.clone(),
            created_by: created_by.clone(),
            is_public: false,
            usage_count: 0,
            created_at,
        })
        .collect();
    CatalogEntry::new(style, variants)
}

#[cfg(test)]
mod tests {
    use stylebook_storage::SqliteCatalogStore;

    use super::*;

    fn engine() -> CatalogEngine {
        let store = SqliteCatalogStore::open_in_memory().unwrap();
        store.seed_system_styles().unwrap();
        CatalogEngine::new(Arc::new(store), EngineConfig::default()).unwrap()
    }

    #[test]
    fn editable_only_when_owned_and_private() {
        let alice = UserId::new("alice");
        let mut style = provisional_entry(
            &NewStyle {
                name: "memo".into(),
                prompt_template: "t".into(),
                ..Default::default()
            },
            &alice,
        )
        .style;
        assert!(ensure_editable(&style, &alice).is_ok());
        assert_eq!(
            ensure_editable(&style, &UserId::new("bob")),
            Err(ValidationError::NotOwner(style.id.clone()))
        );
        style.is_public = true;
        assert_eq!(
            ensure_editable(&style, &alice),
            Err(ValidationError::PublicStyle(style.id.clone()))
        );
    }

    #[tokio::test]
    async fn anonymous_mutations_are_rejected_locally() {
        let engine = engine();
        engine.login(None).await;
        let err = engine
            .add_to_account(&StyleId::new("casual"))
            .await
            .unwrap_err();
        assert_eq!(err.validation(), Some(&ValidationError::NotAuthenticated));
        assert!(!err.is_retryable());
        assert_eq!(engine.pending_mutations(), 0);
    }

    #[tokio::test]
    async fn select_validates_against_catalog() {
        let engine = engine();
        engine.login(None).await;
        let resolved = engine.select(&StyleId::new("academic"), None).unwrap();
        assert_eq!(resolved.style_id.as_str(), "academic");
        assert_eq!(engine.resolved_prompt(), Some(resolved));

        let err = engine
            .select(&StyleId::new("academic"), Some(VariantId::new("nope")))
            .unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::UnknownVariant { .. })
        ));
        let err = engine.select(&StyleId::new("nope"), None).unwrap_err();
        assert_eq!(
            err.validation(),
            Some(&ValidationError::UnknownStyle(StyleId::new("nope")))
        );
    }

    #[tokio::test]
    async fn login_selects_first_entry() {
        let engine = engine();
        engine.login(Some(UserId::new("alice"))).await;
        assert_eq!(
            engine.selection().map(|s| s.style_id),
            Some(StyleId::new("professional"))
        );
        assert!(engine.overlay().is_some());
    }
}
