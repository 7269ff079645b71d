//! Provides the central lifecycle handle shared by all background components.
//!
//! The platform keeps the **is_running** flag which is toggled to *false* once
//! [Platform::terminate](Platform::terminate) is invoked. Long running tasks (the refresh
//! scheduler, the HTTP server) poll this flag in their loop condition and additionally await
//! [Platform::terminated](Platform::terminated) so that a shutdown interrupts them promptly
//! instead of after their next tick.
//!
//! Wiring `terminate()` up to process signals is left to the embedding application.
//!
//! # Examples
//!
//! ```
//! # use ldap_registry::platform::Platform;
//! let platform = Platform::new();
//!
//! // By default the platform is running...
//! assert_eq!(platform.is_running(), true);
//!
//! // Once terminated...
//! platform.terminate();
//!
//! // ...it is no longer considered active.
//! assert_eq!(platform.is_running(), false);
//! ```
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Represents the shared lifecycle state of the system.
pub struct Platform {
    is_running: AtomicBool,
    shutdown: Notify,
}

impl Platform {
    /// Creates a new platform instance..
    pub fn new() -> Arc<Self> {
        Arc::new(Platform {
            is_running: AtomicBool::new(true),
            shutdown: Notify::new(),
        })
    }

    /// Determines if the platform is still running or if [Platform::terminate](Platform::terminate)
    /// has already been called.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Terminates the platform.
    ///
    /// This toggles the [is_running()](Platform::is_running) flag to **false** and wakes every
    /// task currently awaiting [terminated()](Platform::terminated).
    pub fn terminate(&self) {
        self.is_running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();
    }

    /// Waits until the platform is terminated.
    ///
    /// Returns immediately if [Platform::terminate](Platform::terminate) has already been
    /// called. Note that the flag is re-checked after registering as a waiter, as otherwise a
    /// termination happening in between would be missed.
    pub async fn terminated(&self) {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        let _ = notified.as_mut().enable();

        if self.is_running() {
            notified.await;
        }
    }
}
