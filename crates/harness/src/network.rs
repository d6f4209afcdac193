use std::sync::Arc;

use stylebook_engine::{EngineConfig, EngineError};

use crate::TestSession;
use crate::store::ScriptedStore;

/// Several sessions of the same application sharing one store. Sessions are
/// not coordinated with each other.
pub struct TestTabs {
    store: Arc<ScriptedStore>,
    config: EngineConfig,
    tabs: Vec<TestSession>,
}

impl TestTabs {
    pub fn new(store: Arc<ScriptedStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            tabs: Vec::new(),
        }
    }

    pub fn store(&self) -> &ScriptedStore {
        &self.store
    }

    pub async fn open(&mut self, user: &str) -> Result<usize, EngineError> {
        let tab =
            TestSession::signed_in_with(Arc::clone(&self.store), user, self.config.clone()).await?;
        let index = self.tabs.len();
        self.tabs.push(tab);
        Ok(index)
    }

    pub fn tab(&self, index: usize) -> &TestSession {
        &self.tabs[index]
    }
}
