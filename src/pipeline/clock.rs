//! Wall-clock pacing for frame presentation.

use std::thread;
use std::time::{Duration, Instant};

/// Slowest and fastest rates the pacer will honor; outside this range the
/// stream metadata is considered broken and the fallback applies.
const MIN_FPS: f64 = 0.1;
const MAX_FPS: f64 = 480.0;
const FALLBACK_FPS: f64 = 30.0;

/// Schedules one tick per frame interval.
///
/// Ticks are anchored to an absolute schedule rather than restarted after
/// each frame, so sleep jitter does not accumulate into drift. When a tick is
/// serviced late the schedule snaps to now instead of queuing a burst of
/// catch-up frames.
pub struct FramePacer {
    interval: Duration,
    next: Instant,
}

impl FramePacer {
    pub fn new(fps: f64) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps.clamp(MIN_FPS, MAX_FPS)
        } else {
            FALLBACK_FPS
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / fps),
            // The first frame goes up immediately.
            next: Instant::now(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Sleep until the next tick is due, then advance the schedule.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            thread::sleep(self.next - now);
        }
        self.next += self.interval;

        let now = Instant::now();
        if self.next < now {
            // More than a full interval behind: restart the schedule from
            // here instead of queueing a burst of catch-up ticks.
            self.next = now + self.interval;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_fps() {
        assert_eq!(FramePacer::new(25.0).interval(), Duration::from_millis(40));
        assert_eq!(FramePacer::new(50.0).interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_bad_rates_fall_back() {
        let expected = Duration::from_secs_f64(1.0 / FALLBACK_FPS);
        assert_eq!(FramePacer::new(0.0).interval(), expected);
        assert_eq!(FramePacer::new(-24.0).interval(), expected);
        assert_eq!(FramePacer::new(f64::NAN).interval(), expected);
        assert_eq!(FramePacer::new(f64::INFINITY).interval(), expected);
    }

    #[test]
    fn test_extreme_rates_clamped() {
        assert!(FramePacer::new(1_000_000.0).interval() >= Duration::from_secs_f64(1.0 / MAX_FPS));
        assert!(FramePacer::new(0.000_1).interval() <= Duration::from_secs_f64(1.0 / MIN_FPS));
    }

    #[test]
    fn test_ticks_are_never_early() {
        let mut pacer = FramePacer::new(100.0);
        pacer.wait(); // first tick is immediate

        let start = Instant::now();
        for _ in 0..5 {
            pacer.wait();
        }
        // Five ticks at 10ms each; allow generous scheduler slack below the
        // ideal but require we did actually pace.
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_late_service_does_not_burst() {
        let mut pacer = FramePacer::new(100.0);
        pacer.wait();

        // Miss several ticks worth of schedule.
        thread::sleep(Duration::from_millis(50));

        // The next two ticks must still be an interval apart, not back to
        // back catch-up ticks.
        pacer.wait();
        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(8));
    }
}
