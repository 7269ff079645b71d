//! Runs the background sweep which keeps the cache warm.
//!
//! A single task ticks at a quarter of the TTL (but at least once per second) and renews every
//! expired entry via [Registry::refresh_stale](crate::registry::Registry::refresh_stale), so
//! that foreground requests are normally served from fresh memory and the directory sees a
//! smooth, bounded query rate. The task observes the [Platform](crate::platform::Platform) and
//! exits promptly on shutdown instead of waiting for its next tick.
use crate::platform::Platform;
use crate::registry::Registry;
use crate::spawn;
use std::sync::Arc;
use std::time::Duration;

/// Computes the pause between two sweeps for the given TTL.
fn interval(ttl: Duration) -> Duration {
    (ttl / 4).max(Duration::from_secs(1))
}

/// Installs the background refresh loop.
///
/// With caching disabled there is nothing to refresh and no task is started.
pub fn install(platform: Arc<Platform>, registry: Arc<Registry>) {
    let ttl = registry.ttl();
    if ttl.is_zero() {
        log::info!("Caching is disabled - not starting the refresh loop.");
        return;
    }

    spawn!(async move {
        log::info!(
            "Starting the cache refresh loop (every {:?})...",
            interval(ttl)
        );

        while platform.is_running() {
            tokio::select! {
                _ = tokio::time::sleep(interval(ttl)) => {
                    let _ = registry.refresh_stale().await;
                }
                _ = platform.terminated() => {}
            }
        }

        log::info!("The cache refresh loop has stopped.");
    });
}
