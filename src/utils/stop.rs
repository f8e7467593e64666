//! Shared shutdown signal.
//!
//! Both halves of the pipeline hold a clone: Ctrl-C and window close cancel
//! playback, the decode worker polls the flag between frames, and anything
//! parked on a bounded wait is woken so cancellation is observed within one
//! wait interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    stopped: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                stopped: AtomicBool::new(false),
                lock: Mutex::new(()),
                cond: Condvar::new(),
            }),
        }
    }

    /// Request shutdown and wake every waiter. Idempotent.
    pub fn cancel(&self) {
        self.shared.stopped.store(true, Ordering::Release);

        // Lock briefly so a waiter cannot miss the notification between
        // checking the flag and parking on the condvar.
        let _guard = self.shared.lock.lock().unwrap();
        self.shared.cond.notify_all();
    }

    pub fn cancelled(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    /// Sleep up to `timeout`, returning early (with `true`) on cancellation.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.shared.lock.lock().unwrap();
        loop {
            if self.cancelled() {
                return true;
            }
            let (g, result) = self.shared.cond.wait_timeout(guard, timeout).unwrap();
            guard = g;
            if result.timed_out() {
                return self.cancelled();
            }
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
