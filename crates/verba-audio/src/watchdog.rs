use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Watches for a stalled capture stream. The cpal callback feeds it on
/// every buffer; a monitor thread trips `triggered` when no feed arrives
/// within the timeout, and the capture loop reopens the stream.
#[derive(Clone)]
pub struct WatchdogTimer {
    timeout: Duration,
    last_feed: Arc<RwLock<Option<Instant>>>,
    triggered: Arc<AtomicBool>,
    handle: Arc<RwLock<Option<JoinHandle<()>>>>,
}

impl WatchdogTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_feed: Arc::new(RwLock::new(None)),
            triggered: Arc::new(AtomicBool::new(false)),
            handle: Arc::new(RwLock::new(None)),
        }
    }

    pub fn start(&mut self, running: Arc<AtomicBool>) {
        let timeout = self.timeout;
        let last_feed = Arc::clone(&self.last_feed);
        let triggered = Arc::clone(&self.triggered);

        *last_feed.write() = Some(Instant::now());

        let handle = thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_secs(1));

                let stalled = {
                    let guard = last_feed.read();
                    match *guard {
                        Some(last) => {
                            last.elapsed() > timeout && !triggered.load(Ordering::SeqCst)
                        }
                        None => false,
                    }
                };

                if stalled {
                    tracing::error!("Capture watchdog timeout; no audio for over {:?}", timeout);
                    triggered.store(true, Ordering::SeqCst);
                }
            }
        });

        *self.handle.write() = Some(handle);
    }

    pub fn feed(&self) {
        *self.last_feed.write() = Some(Instant::now());
        self.triggered.store(false, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.write().take() {
            let _ = handle.join();
        }
        self.triggered.store(false, Ordering::SeqCst);
        *self.last_feed.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triggers_after_timeout() {
        let mut wd = WatchdogTimer::new(Duration::from_millis(50));
        let running = Arc::new(AtomicBool::new(true));
        wd.start(running.clone());

        thread::sleep(Duration::from_millis(1200));
        assert!(wd.is_triggered());

        wd.feed();
        assert!(!wd.is_triggered());

        running.store(false, Ordering::SeqCst);
        wd.stop();
    }
}
