//! Cooperative cancellation and delay handling.
//!
//! Programs run synchronously on the host's thread. A [`CancelToken`] is
//! polled before every step and on every delay tick; a [`DelayDriver`] decides
//! how the host stays responsive while a `delay` block waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Shared flag requesting that a running program stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Strategy for waiting out a `delay` block.
pub trait DelayDriver {
    /// Wait for `duration`, returning `false` if `cancel` fired first.
    fn wait(&mut self, duration: Duration, cancel: &CancelToken) -> bool;
}

/// Sleeps the current thread in short ticks, checking for cancellation
/// between them. Hosts with an event loop substitute a driver that pumps
/// pending events on each tick.
#[derive(Debug, Clone)]
pub struct ThreadDelay {
    tick: Duration,
}

impl ThreadDelay {
    /// Create a driver with the given tick length.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }
}

impl Default for ThreadDelay {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl DelayDriver for ThreadDelay {
    fn wait(&mut self, duration: Duration, cancel: &CancelToken) -> bool {
        // A deadline past the clock's range never arrives; only cancel ends it.
        let deadline = Instant::now().checked_add(duration);
        if deadline.is_none() {
            tracing::warn!(?duration, "delay exceeds clock range; waiting for cancellation");
        }
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    self.tick.min(deadline - now)
                }
                None => self.tick,
            };
            thread::sleep(pause);
        }
    }
}

/// Records requested delays without waiting. Used by dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingDelay {
    /// Every delay requested so far.
    pub requested: Vec<Duration>,
}

impl DelayDriver for RecordingDelay {
    fn wait(&mut self, duration: Duration, cancel: &CancelToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.requested.push(duration);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn thread_delay_waits_and_observes_cancel() {
        let mut driver = ThreadDelay::new(Duration::from_millis(1));
        let token = CancelToken::new();

        let started = Instant::now();
        assert!(driver.wait(Duration::from_millis(5), &token));
        assert!(started.elapsed() >= Duration::from_millis(5));

        token.cancel();
        assert!(!driver.wait(Duration::from_secs(60), &token));
    }

    #[test]
    fn unrepresentable_deadline_waits_for_cancel() {
        let mut driver = ThreadDelay::new(Duration::from_millis(1));
        let token = CancelToken::new();
        let canceller = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        assert!(!driver.wait(Duration::from_secs_f64(1e19), &token));
        assert!(!driver.wait(Duration::MAX, &token));
        handle.join().unwrap();
    }

    #[test]
    fn recording_delay_does_not_sleep() {
        let mut driver = RecordingDelay::default();
        assert!(driver.wait(Duration::from_secs(3600), &CancelToken::new()));
        assert_eq!(driver.requested, vec![Duration::from_secs(3600)]);
    }
}
