//! Background decode worker.
//!
//! One OS thread owns the whole production side: container, decoder and
//! scaler contexts come up on this thread (FFmpeg contexts do not cross
//! threads), setup results are handed back over a channel, and frames then
//! flow into the ring until the stream ends or playback is cancelled.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::PlayerConfig;
use crate::decoder::{FrameProducer, PlaybackSource, Produced, RgbaConverter, StreamDescriptor, VideoSource};
use crate::display::{FrameRing, RingConsumer, RingProducer};
use crate::error::PlayerError;
use crate::utils::StopSignal;

/// How long the worker parks on a full ring before re-checking shutdown.
const RESERVE_WAIT: Duration = Duration::from_millis(50);

type Setup = Result<(StreamDescriptor, RingConsumer), PlayerError>;

/// Handle to the decode thread.
pub struct DecodeWorker {
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    /// Start the worker for `config` and wait for its setup verdict.
    ///
    /// Fatal setup problems (unreadable file, no video stream, missing codec,
    /// allocation failure) are returned here, before any frame is decoded.
    pub fn spawn(
        config: &PlayerConfig,
        stop: StopSignal,
    ) -> Result<(Self, RingConsumer, StreamDescriptor), PlayerError> {
        let config = config.clone();
        let (setup_tx, setup_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("decode".into())
            .spawn(move || decode_thread(config, stop, setup_tx))
            .map_err(|e| {
                log::error!("cannot spawn decode worker: {e}");
                PlayerError::WorkerFailed
            })?;

        match setup_rx.recv() {
            Ok(Ok((descriptor, consumer))) => Ok((
                Self {
                    handle: Some(handle),
                },
                consumer,
                descriptor,
            )),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(PlayerError::WorkerFailed)
            }
        }
    }

    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("decode worker panicked");
            }
        }
    }
}

fn decode_thread(config: PlayerConfig, stop: StopSignal, setup_tx: mpsc::Sender<Setup>) {
    match open_pipeline(&config) {
        Ok((mut playback, ring, consumer)) => {
            let descriptor = playback.descriptor().clone();
            if setup_tx.send(Ok((descriptor, consumer))).is_err() {
                return;
            }
            run_worker(&mut playback, ring, &stop);
        }
        Err(e) => {
            let _ = setup_tx.send(Err(e));
        }
    }
}

fn open_pipeline(
    config: &PlayerConfig,
) -> Result<(PlaybackSource, RingProducer, RingConsumer), PlayerError> {
    let source = VideoSource::open(&config.path)?;
    let descriptor = source.descriptor();
    log::info!("opened {}: {descriptor}", config.path.display());

    let capacity = config.ring_capacity(descriptor.frame_rate);
    let converter = RgbaConverter::new(descriptor, config.dest_width, config.dest_height)?;
    let (ring, consumer) = FrameRing::with_capacity(capacity, converter.frame_len())?;

    Ok((PlaybackSource::new(source, converter), ring, consumer))
}

/// Produce frames into the ring until the stream runs dry or `stop` fires.
pub(crate) fn run_worker<P: FrameProducer>(
    playback: &mut P,
    mut ring: RingProducer,
    stop: &StopSignal,
) {
    let capacity = ring.capacity() as u64;
    let mut exhausted = false;

    // Initial fill: one buffer of lookahead before playback starts. Slots
    // 0..capacity-1 are all free, so reservations cannot block here.
    while ring.decoded() < capacity && !exhausted && !stop.cancelled() {
        let Some(mut slot) = ring.try_reserve() else {
            break;
        };
        match playback.produce(&mut slot) {
            Produced::Frame => slot.commit(),
            Produced::Skipped => {}
            Produced::End => exhausted = true,
        }
    }
    ring.mark_filled();
    log::info!("buffer primed with {} frame(s)", ring.decoded());

    // Steady state: top the ring back up as the presenter drains it.
    while !exhausted && !stop.cancelled() {
        let Some(mut slot) = ring.reserve_timeout(RESERVE_WAIT) else {
            continue;
        };
        match playback.produce(&mut slot) {
            Produced::Frame => slot.commit(),
            Produced::Skipped => {}
            Produced::End => exhausted = true,
        }
    }

    if exhausted {
        log::info!("stream ended after {} frame(s)", ring.decoded());
    } else {
        log::debug!("decode worker stopped before end of stream");
    }
    ring.finish();
}
