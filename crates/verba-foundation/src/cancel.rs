use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// How often cooperative loops check for cancellation.
pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cooperative cancellation token shared by every pipeline stage.
///
/// Stages poll `is_cancelled()` at their safe points (at most every 100 ms)
/// or await `cancelled()`. Thread-kill is never used; a stage that cannot
/// observe the token must bound its own blocking calls.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.inner.notify.notified().await;
    }

    /// Reset for session restart. Only valid while no stage is running.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }
}
