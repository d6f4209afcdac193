pub mod fixtures;
pub mod network;
pub mod session;
pub mod store;

pub use network::TestTabs;
pub use session::{LocalState, TestSession};
pub use store::{ScriptedStore, StoreCall, StoreOp, WriteFault};

use tracing_subscriber::EnvFilter;

/// Routes engine logs to the test output. `RUST_LOG` overrides the default
/// `warn` level. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
