//! Audio playback to speakers
//!
//! Each utterance plays on its own OS thread so the frame loop never waits
//! on audio hardware. At most one playback runs at a time: starting a new
//! one stops the previous one first.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, atomic::AtomicBool};
use std::thread;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::resample::resample;
use crate::{Error, Result};

/// How long `play` waits for the device to open
const START_TIMEOUT: Duration = Duration::from_secs(2);

/// How long `stop` waits for the playback thread to acknowledge
const STOP_WAIT: Duration = Duration::from_millis(150);

/// Poll interval of the playback thread
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Extra time allowed past the nominal clip length before giving up
const TAIL_GRACE: Duration = Duration::from_millis(500);

/// Small delay so the device drains its last buffer
const DRAIN_DELAY: Duration = Duration::from_millis(100);

const RUNNING: u8 = 0;
const FINISHED: u8 = 1;
const STOPPED: u8 = 2;

/// Identifies one call to [`PlaybackWorker::play`]
pub type PlaybackId = u64;

/// Invoked from the playback thread when a clip plays to the end
pub type FinishedCallback = Arc<dyn Fn(PlaybackId) + Send + Sync>;

/// An output backend
///
/// `start` runs on the playback thread, so the returned handle does not
/// need to be `Send` (cpal streams are not).
pub trait AudioSink: Send + Sync + 'static {
    /// Begin rendering `samples` (mono)
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActiveOutput>>;
}

/// A playing clip; dropping it halts output
pub trait ActiveOutput {
    /// True once every sample has been handed to the device
    fn is_finished(&self) -> bool;
}

struct ActivePlayback {
    id: PlaybackId,
    state: Arc<AtomicU8>,
    done_rx: std_mpsc::Receiver<()>,
}

/// Owns the single live playback thread
pub struct PlaybackWorker {
    sink: Arc<dyn AudioSink>,
    current: Option<ActivePlayback>,
    next_id: PlaybackId,
    on_finished: Option<FinishedCallback>,
}

impl PlaybackWorker {
    #[must_use]
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            sink,
            current: None,
            next_id: 1,
            on_finished: None,
        }
    }

    /// Register the natural-completion callback (last registration wins)
    pub fn set_on_finished(&mut self, callback: FinishedCallback) {
        self.on_finished = Some(callback);
    }

    /// Stop whatever is playing and start `samples` on a fresh thread
    ///
    /// Blocks only until the device has opened, never for the clip length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if output could not be started
    #[allow(clippy::cast_precision_loss)]
    pub fn play(&mut self, samples: Arc<[f32]>, sample_rate: u32) -> Result<PlaybackId> {
        self.stop();

        if sample_rate == 0 {
            return Err(Error::Playback("sample rate is zero".to_string()));
        }

        let id = self.next_id;
        self.next_id += 1;

        let clip_len = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));
        let state = Arc::new(AtomicU8::new(RUNNING));
        let (ack_tx, ack_rx) = std_mpsc::channel::<Result<()>>();
        let (done_tx, done_rx) = std_mpsc::channel::<()>();

        let sink = Arc::clone(&self.sink);
        let thread_state = Arc::clone(&state);
        let on_finished = self.on_finished.clone();

        thread::Builder::new()
            .name(format!("jarvis-playback-{id}"))
            .spawn(move || {
                let output = match sink.start(samples, sample_rate) {
                    Ok(output) => {
                        let _ = ack_tx.send(Ok(()));
                        output
                    }
                    Err(e) => {
                        let _ = ack_tx.send(Err(e));
                        let _ = done_tx.send(());
                        return;
                    }
                };

                let deadline = Instant::now() + clip_len + TAIL_GRACE;
                while thread_state.load(Ordering::Acquire) == RUNNING
                    && !output.is_finished()
                    && Instant::now() < deadline
                {
                    thread::sleep(POLL_INTERVAL);
                }

                if thread_state
                    .compare_exchange(RUNNING, FINISHED, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    thread::sleep(DRAIN_DELAY);
                    drop(output);
                    tracing::debug!(id, "playback complete");
                    if let Some(callback) = on_finished {
                        callback(id);
                    }
                } else {
                    drop(output);
                    tracing::debug!(id, "playback stopped");
                }

                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Playback(format!("failed to spawn playback thread: {e}")))?;

        match ack_rx.recv_timeout(START_TIMEOUT) {
            Ok(Ok(())) => {
                self.current = Some(ActivePlayback {
                    id,
                    state,
                    done_rx,
                });
                tracing::debug!(id, sample_rate, "playback started");
                Ok(id)
            }
            Ok(Err(e)) => Err(Error::Playback(e.to_string())),
            Err(_) => {
                state.store(STOPPED, Ordering::Release);
                Err(Error::Playback("audio device did not open in time".to_string()))
            }
        }
    }

    /// Request the live playback to halt and wait briefly for it
    ///
    /// A stopped clip never invokes the completion callback.
    pub fn stop(&mut self) {
        let Some(current) = self.current.take() else {
            return;
        };

        let preempted = current
            .state
            .compare_exchange(RUNNING, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if preempted && current.done_rx.recv_timeout(STOP_WAIT).is_err() {
            tracing::warn!(id = current.id, "playback thread slow to stop");
        }
    }

    /// Whether a clip is currently being rendered
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|c| c.state.load(Ordering::Acquire) == RUNNING)
    }

    /// Id of the most recently started clip, if it has not been stopped
    #[must_use]
    pub fn current_id(&self) -> Option<PlaybackId> {
        self.current.as_ref().map(|c| c.id)
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Plays to the default output device via cpal
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalSink;

impl CpalSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Pick an output config that plays `sample_rate` natively, or the device default
    fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
        let native = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .filter(|c| c.channels() <= 2)
            .find(|c| {
                c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            });

        if let Some(range) = native {
            return Ok(range.with_sample_rate(SampleRate(sample_rate)).config());
        }

        device
            .default_output_config()
            .map(|c| c.config())
            .map_err(|e| Error::Audio(e.to_string()))
    }
}

impl AudioSink for CpalSink {
    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActiveOutput>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let config = Self::output_config(&device, sample_rate)?;
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = if config.sample_rate.0 == sample_rate {
            samples
        } else {
            resample(&samples, sample_rate, config.sample_rate.0)?.into()
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels,
            "audio output opened"
        );

        let finished = Arc::new(AtomicBool::new(false));
        let finished_cb = Arc::clone(&finished);
        let mut position = 0usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(position).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if position < samples.len() {
                            position += 1;
                        } else {
                            finished_cb.store(true, Ordering::Release);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Box::new(CpalOutput {
            _stream: stream,
            finished,
        }))
    }
}

struct CpalOutput {
    _stream: cpal::Stream,
    finished: Arc<AtomicBool>,
}

impl ActiveOutput for CpalOutput {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

/// Silent sink that only keeps time
///
/// Used with `--mute` and in tests: a clip "plays" for exactly its nominal
/// length without touching audio hardware.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockSink;

impl ClockSink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioSink for ClockSink {
    #[allow(clippy::cast_precision_loss)]
    fn start(&self, samples: Arc<[f32]>, sample_rate: u32) -> Result<Box<dyn ActiveOutput>> {
        let length = Duration::from_secs_f64(samples.len() as f64 / f64::from(sample_rate));
        Ok(Box::new(ClockOutput {
            ends_at: Instant::now() + length,
        }))
    }
}

struct ClockOutput {
    ends_at: Instant,
}

impl ActiveOutput for ClockOutput {
    fn is_finished(&self) -> bool {
        Instant::now() >= self.ends_at
    }
}
