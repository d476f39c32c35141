use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::engine::WalStore;

/// How often the compactor checks the append counter.
pub const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that rewrites the WAL once `threshold` appends pile up.
pub async fn run_compactor(store: WalStore, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match store.maybe_compact(threshold).await {
            Ok(true) => info!(threshold, "periodic compaction done"),
            Ok(false) => {}
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}

/// Spawn `run_compactor` with the configured threshold. Abort the handle to stop it.
pub fn spawn_compactor(store: WalStore, config: &Config) -> JoinHandle<()> {
    tokio::spawn(run_compactor(store, config.compact_threshold, COMPACT_CHECK_INTERVAL))
}
