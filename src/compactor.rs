use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::WalStore;

/// Compact once the WAL has grown by `threshold` appends. Returns whether a
/// compaction ran.
pub async fn compact_if_needed(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not needed");
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(appends, "WAL compacted");
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "ok").increment(1);
            true
        }
        Err(e) => {
            warn!(error = %e, "WAL compaction failed");
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL, "status" => "error").increment(1);
            false
        }
    }
}

/// Background task: check every `every` and compact past `threshold`.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_needed(&store, threshold).await;
    }
}
