use std::sync::{Arc, Mutex, PoisonError};

use stylebook_core::{
    catalog::{Catalog, CatalogEntry},
    ids::{StyleId, UserId},
    overlay::UserOverlay,
    selection::Selection,
};
use stylebook_engine::{CatalogEngine, ChangeReason, EngineConfig, EngineError};
use stylebook_storage::CatalogStore;

use crate::store::ScriptedStore;

/// Everything a consumer can observe about one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalState {
    pub catalog: Catalog,
    pub overlay: Option<UserOverlay>,
    pub selection: Option<Selection>,
    pub library: Vec<CatalogEntry>,
}

/// One engine instance (a browser tab, say) over a scripted store, recording
/// every catalog change it announces.
pub struct TestSession {
    pub engine: CatalogEngine,
    pub store: Arc<ScriptedStore>,
    changes: Arc<Mutex<Vec<ChangeReason>>>,
}

impl TestSession {
    pub fn new(store: Arc<ScriptedStore>, config: EngineConfig) -> Result<Self, EngineError> {
        let shared: Arc<dyn CatalogStore> = store.clone();
        let engine = CatalogEngine::new(shared, config)?;
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        engine.on_catalog_changed(move |_, reason| {
            sink.lock().unwrap_or_else(PoisonError::into_inner).push(reason);
        });
        Ok(Self {
            engine,
            store,
            changes,
        })
    }

    pub async fn signed_in(store: Arc<ScriptedStore>, user: &str) -> Result<Self, EngineError> {
        Self::signed_in_with(store, user, EngineConfig::default()).await
    }

    pub async fn signed_in_with(
        store: Arc<ScriptedStore>,
        user: &str,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let session = Self::new(store, config)?;
        session.engine.login(Some(UserId::new(user))).await;
        Ok(session)
    }

    pub fn state(&self) -> LocalState {
        LocalState {
            catalog: self.engine.catalog(),
            overlay: self.engine.overlay(),
            selection: self.engine.selection(),
            library: self.engine.library(),
        }
    }

    pub fn style_ids(&self) -> Vec<String> {
        self.engine
            .catalog()
            .iter()
            .map(|e| e.id().as_str().to_string())
            .collect()
    }

    pub fn has_style(&self, id: &str) -> bool {
        self.engine.catalog().contains(&StyleId::new(id))
    }

    pub fn added(&self) -> Vec<String> {
        self.engine
            .overlay()
            .map(|o| o.added_styles.iter().map(|s| s.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn hidden(&self) -> Vec<String> {
        self.engine
            .overlay()
            .map(|o| o.hidden_styles.iter().map(|s| s.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn changes(&self) -> Vec<ChangeReason> {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_changes(&self) {
        self.changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
