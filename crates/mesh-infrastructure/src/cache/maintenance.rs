//! Background cache upkeep: expiry sweeps and periodic snapshots

use super::ResponseCache;
use crate::utils::ScheduledTask;
use mesh_domain::ports::CacheSnapshotStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Periodically drop expired entries
pub fn spawn_expiry_sweeper(cache: Arc<ResponseCache>, interval: Duration) -> ScheduledTask {
    ScheduledTask::spawn("cache-expiry-sweep", interval, move || {
        let cache = Arc::clone(&cache);
        async move {
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!(removed, "Expired cache entries purged");
            }
            Ok(())
        }
    })
}

/// Periodically save the cache through `store`
///
/// Entries are copied under the cache lock and written afterwards, so
/// request-path operations never wait on storage. Failures are logged by
/// the scheduler.
pub fn spawn_snapshotter(
    cache: Arc<ResponseCache>,
    store: Arc<dyn CacheSnapshotStore>,
    interval: Duration,
) -> ScheduledTask {
    ScheduledTask::spawn("cache-snapshot", interval, move || {
        let cache = Arc::clone(&cache);
        let store = Arc::clone(&store);
        async move {
            let entries = cache.export();
            store.save(&entries).await
        }
    })
}
