//! Paced presentation loop.
//!
//! Runs on the main thread and owns the display surface. Waits for the
//! decode worker's initial fill, then displays one frame per pacing tick,
//! strictly in production order, until the window goes away or every frame
//! the stream will ever produce has been shown.

use std::time::Duration;

use crate::display::{DisplaySurface, RingConsumer, SurfaceEvent};
use crate::pipeline::clock::FramePacer;
use crate::utils::StopSignal;

/// Bound on every park so window events and cancellation stay responsive
/// even while the decoder is behind.
const FILL_WAIT: Duration = Duration::from_millis(10);
const FRAME_WAIT: Duration = Duration::from_millis(10);

pub struct Presenter<S: DisplaySurface> {
    surface: S,
    frames: RingConsumer,
    pacer: FramePacer,
    stop: StopSignal,
}

impl<S: DisplaySurface> Presenter<S> {
    pub fn new(surface: S, frames: RingConsumer, frame_rate: f64, stop: StopSignal) -> Self {
        Self {
            surface,
            frames,
            pacer: FramePacer::new(frame_rate),
            stop,
        }
    }

    /// Drive the display until playback finishes; returns the surface for
    /// teardown by the caller.
    pub fn run(mut self) -> S {
        // Let the worker build its lookahead, keeping the window alive and
        // honoring close/cancel while we wait.
        while !self.frames.wait_filled_timeout(FILL_WAIT) {
            self.pump_events();
            if self.interrupted() {
                return self.surface;
            }
        }

        loop {
            self.pacer.wait();
            self.pump_events();

            if self.interrupted() {
                log::info!("playback interrupted");
                break;
            }
            if self.frames.is_complete() {
                log::info!("playback complete after {} frame(s)", self.frames.read());
                break;
            }

            // The decoder may have fallen behind; wait for the next frame
            // rather than reading ahead of production.
            let Some(slot) = self.frames.read_timeout(FRAME_WAIT) else {
                continue;
            };
            if slot.is_last() {
                log::debug!("displaying final frame");
            }

            let shown = self
                .surface
                .update(&slot)
                .and_then(|_| self.surface.present());
            if let Err(e) = shown {
                log::error!("presentation failed: {e}");
                self.surface.close();
                break;
            }
            slot.commit();
        }

        self.surface
    }

    fn interrupted(&self) -> bool {
        !self.surface.is_open() || self.stop.cancelled()
    }

    fn pump_events(&mut self) {
        loop {
            match self.surface.poll_event() {
                SurfaceEvent::Closed => {
                    log::info!("close requested");
                    self.surface.close();
                }
                SurfaceEvent::Resized(width, height) => self.surface.resize(width, height),
                SurfaceEvent::None => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{FrameProducer, Produced};
    use crate::display::FrameRing;
    use crate::error::PlayerError;
    use crate::pipeline::decode::run_worker;
    use std::thread;

    const FRAME_LEN: usize = 8;
    const FAST: f64 = 480.0;

    /// In-memory surface recording what was shown.
    struct FakeSurface {
        open: bool,
        uploaded: Option<u8>,
        displayed: Vec<u8>,
        resizes: Vec<(u32, u32)>,
        /// Emit `Closed` once this many frames have been displayed.
        close_after: Option<usize>,
    }

    impl FakeSurface {
        fn new() -> Self {
            Self {
                open: true,
                uploaded: None,
                displayed: Vec::new(),
                resizes: Vec::new(),
                close_after: None,
            }
        }
    }

    impl DisplaySurface for FakeSurface {
        fn poll_event(&mut self) -> SurfaceEvent {
            match self.close_after {
                Some(limit) if self.open && self.displayed.len() >= limit => SurfaceEvent::Closed,
                _ => SurfaceEvent::None,
            }
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.resizes.push((width, height));
        }

        fn update(&mut self, pixels: &[u8]) -> Result<(), PlayerError> {
            assert_eq!(pixels.len(), FRAME_LEN);
            self.uploaded = Some(pixels[0]);
            Ok(())
        }

        fn present(&mut self) -> Result<(), PlayerError> {
            let frame = self.uploaded.expect("present before update");
            self.displayed.push(frame);
            Ok(())
        }

        fn close(&mut self) {
            self.open = false;
        }
    }

    struct CountedProducer {
        remaining: u8,
        stamp: u8,
        delay: Duration,
    }

    impl FrameProducer for CountedProducer {
        fn produce(&mut self, dest: &mut [u8]) -> Produced {
            if self.remaining == 0 {
                return Produced::End;
            }
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            dest.fill(self.stamp);
            self.stamp = self.stamp.wrapping_add(1);
            self.remaining -= 1;
            Produced::Frame
        }
    }

    fn spawn_worker(
        frames: u8,
        capacity: usize,
        delay: Duration,
        stop: &StopSignal,
    ) -> (RingConsumer, thread::JoinHandle<()>) {
        let (ring, consumer) = FrameRing::with_capacity(capacity, FRAME_LEN).unwrap();
        let stop = stop.clone();
        let handle = thread::spawn(move || {
            let mut producer = CountedProducer {
                remaining: frames,
                stamp: 0,
                delay,
            };
            run_worker(&mut producer, ring, &stop);
        });
        (consumer, handle)
    }

    #[test]
    fn test_displays_whole_stream_in_order() {
        let stop = StopSignal::new();
        let (consumer, worker) = spawn_worker(10, 5, Duration::ZERO, &stop);

        let surface = Presenter::new(FakeSurface::new(), consumer, FAST, stop).run();

        worker.join().unwrap();
        let expected: Vec<u8> = (0..10).collect();
        assert_eq!(surface.displayed, expected);
        assert!(surface.open);
    }

    #[test]
    fn test_waits_for_slow_decoder() {
        let stop = StopSignal::new();
        // Each frame takes longer to produce than a pacing tick.
        let (consumer, worker) = spawn_worker(5, 2, Duration::from_millis(15), &stop);

        let surface = Presenter::new(FakeSurface::new(), consumer, FAST, stop).run();

        worker.join().unwrap();
        assert_eq!(surface.displayed, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_close_stops_playback() {
        let stop = StopSignal::new();
        let (consumer, worker) = spawn_worker(200, 5, Duration::ZERO, &stop);

        let mut fake = FakeSurface::new();
        fake.close_after = Some(3);
        let surface = Presenter::new(fake, consumer, FAST, stop.clone()).run();

        assert!(!surface.open);
        assert_eq!(surface.displayed, vec![0, 1, 2]);

        // The worker is cancelled by the caller once presentation ends.
        stop.cancel();
        worker.join().unwrap();
    }

    #[test]
    fn test_empty_stream_terminates() {
        let stop = StopSignal::new();
        let (consumer, worker) = spawn_worker(0, 4, Duration::ZERO, &stop);

        let surface = Presenter::new(FakeSurface::new(), consumer, FAST, stop).run();

        worker.join().unwrap();
        assert!(surface.displayed.is_empty());
        assert!(surface.open);
    }

    #[test]
    fn test_cancellation_stops_waiting_for_fill() {
        let stop = StopSignal::new();
        // Producer stalls forever on its first frame.
        let (consumer, worker) = spawn_worker(1, 4, Duration::from_secs(30), &stop);

        stop.cancel();
        let surface = Presenter::new(FakeSurface::new(), consumer, FAST, stop).run();

        assert!(surface.displayed.is_empty());
        // Only the presenter must return promptly; the worker finishes its
        // in-flight sleep on its own schedule.
        drop(worker);
    }

    #[test]
    fn test_resize_events_reach_surface() {
        let stop = StopSignal::new();
        let (consumer, worker) = spawn_worker(2, 2, Duration::ZERO, &stop);

        struct ResizingSurface(FakeSurface, bool);
        impl DisplaySurface for ResizingSurface {
            fn poll_event(&mut self) -> SurfaceEvent {
                if !self.1 {
                    self.1 = true;
                    return SurfaceEvent::Resized(640, 360);
                }
                self.0.poll_event()
            }
            fn is_open(&self) -> bool {
                self.0.is_open()
            }
            fn resize(&mut self, w: u32, h: u32) {
                self.0.resize(w, h);
            }
            fn update(&mut self, p: &[u8]) -> Result<(), PlayerError> {
                self.0.update(p)
            }
            fn present(&mut self) -> Result<(), PlayerError> {
                self.0.present()
            }
            fn close(&mut self) {
                self.0.close();
            }
        }

        let surface =
            Presenter::new(ResizingSurface(FakeSurface::new(), false), consumer, FAST, stop).run();

        worker.join().unwrap();
        assert_eq!(surface.0.resizes, vec![(640, 360)]);
        assert_eq!(surface.0.displayed, vec![0, 1]);
    }
}
