//! Speech pipeline: synthesis, envelope extraction and playback
//!
//! The pipeline keeps at most one live [`Utterance`]. Starting a new one
//! stops the previous clip first; only clips that play to the end produce a
//! [`PlaybackEnded`] notification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::RuntimeFlavor;
use tokio::sync::mpsc;

use super::envelope::{self, FRAME_MS};
use super::playback::{AudioSink, FinishedCallback, PlaybackId, PlaybackWorker};
use super::tts::{Pcm, Synthesizer};
use crate::{Error, Result};

/// Sample rate of the silent fallback clip
pub const FALLBACK_SAMPLE_RATE: u32 = 22_050;

/// Envelope length of the silent fallback clip
pub const FALLBACK_ENVELOPE_POINTS: usize = 50;

/// One synthesized clip with its loudness envelope
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
    pub envelope: Vec<f32>,
    pub duration: Duration,
}

impl Utterance {
    /// Build from synthesized audio, computing the envelope
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_pcm(text: impl Into<String>, pcm: Pcm) -> Self {
        let envelope = envelope::extract(&pcm.samples, pcm.sample_rate, FRAME_MS);
        let duration = if pcm.sample_rate == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(pcm.samples.len() as f64 / f64::from(pcm.sample_rate))
        };

        Self {
            text: text.into(),
            samples: pcm.samples.into(),
            sample_rate: pcm.sample_rate,
            envelope,
            duration,
        }
    }

    /// One second of silence with a flat envelope, used when synthesis fails
    #[must_use]
    pub fn silent(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            samples: vec![0.0; FALLBACK_SAMPLE_RATE as usize].into(),
            sample_rate: FALLBACK_SAMPLE_RATE,
            envelope: vec![0.0; FALLBACK_ENVELOPE_POINTS],
            duration: Duration::from_secs(1),
        }
    }
}

/// Run a call that may block on the audio device
///
/// On a multi-threaded runtime the worker hands its other tasks off first.
fn off_worker<T>(f: impl FnOnce() -> T) -> T {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Result of a synthesis attempt
///
/// Always carries a playable utterance; `error` is set when the backend
/// failed and the utterance is the silent fallback.
#[derive(Debug)]
pub struct Synthesis {
    pub utterance: Utterance,
    pub error: Option<Error>,
}

impl Synthesis {
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Synthesize `text`, degrading to silence on failure
pub async fn synthesize(synth: &dyn Synthesizer, text: &str, rate: f32) -> Synthesis {
    match synth.synthesize(text, rate).await {
        Ok(pcm) if pcm.sample_rate > 0 && !pcm.samples.is_empty() => Synthesis {
            utterance: Utterance::from_pcm(text, pcm),
            error: None,
        },
        Ok(_) => {
            tracing::warn!("synthesis returned no audio, using silence");
            Synthesis {
                utterance: Utterance::silent(text),
                error: Some(Error::Tts("synthesis returned no audio".to_string())),
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "synthesis failed, using silence");
            Synthesis {
                utterance: Utterance::silent(text),
                error: Some(e),
            }
        }
    }
}

/// Natural end of a clip's playback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackEnded {
    pub id: PlaybackId,
}

/// A started utterance
#[derive(Debug, Clone)]
pub struct Speech {
    pub utterance: Arc<Utterance>,
    /// Set when the utterance is the silent fallback
    pub synthesis_error: Option<Arc<Error>>,
}

struct LiveUtterance {
    utterance: Arc<Utterance>,
    started_at: Instant,
    id: PlaybackId,
}

/// Drives synth -> envelope -> playback and tracks the live utterance
pub struct TtsPipeline {
    synth: Arc<dyn Synthesizer>,
    player: PlaybackWorker,
    live: Option<LiveUtterance>,
}

impl TtsPipeline {
    /// Create a pipeline and the receiver for "playback ended" notifications
    ///
    /// Notifications are sent from the playback thread; the receiver is meant
    /// to be drained by the frame loop.
    #[must_use]
    pub fn new(
        synth: Arc<dyn Synthesizer>,
        sink: Arc<dyn AudioSink>,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEnded>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut player = PlaybackWorker::new(sink);
        let on_finished: FinishedCallback = Arc::new(move |id| {
            let _ = tx.send(PlaybackEnded { id });
        });
        player.set_on_finished(on_finished);

        (
            Self {
                synth,
                player,
                live: None,
            },
            rx,
        )
    }

    /// Shared handle to the synthesizer, for synthesis off the frame loop
    #[must_use]
    pub fn synthesizer(&self) -> Arc<dyn Synthesizer> {
        Arc::clone(&self.synth)
    }

    /// Synthesize and start speaking `text`
    ///
    /// Synthesis failures do not fail the call: the silent fallback is
    /// played and the error is reported in [`Speech::synthesis_error`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if audio output could not start
    pub async fn speak(&mut self, text: &str, rate: f32) -> Result<Speech> {
        let synthesis = synthesize(self.synth.as_ref(), text, rate).await;
        let utterance = self.start(synthesis.utterance)?;
        Ok(Speech {
            utterance,
            synthesis_error: synthesis.error.map(Arc::new),
        })
    }

    /// Make `utterance` the live one, preempting any current playback
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if audio output could not start
    pub fn start(&mut self, utterance: Utterance) -> Result<Arc<Utterance>> {
        let utterance = Arc::new(utterance);
        let samples = Arc::clone(&utterance.samples);
        let id = off_worker(|| {
            self.stop();
            self.player.play(samples, utterance.sample_rate)
        })?;

        tracing::debug!(
            id,
            text = %utterance.text,
            duration_ms = u64::try_from(utterance.duration.as_millis()).unwrap_or(u64::MAX),
            envelope_points = utterance.envelope.len(),
            "utterance started"
        );

        self.live = Some(LiveUtterance {
            utterance: Arc::clone(&utterance),
            started_at: Instant::now(),
            id,
        });

        Ok(utterance)
    }

    /// Stop the live utterance, if any
    pub fn stop(&mut self) {
        self.player.stop();
        self.live = None;
    }

    /// Handle a "playback ended" notification
    ///
    /// Returns true if it belonged to the live utterance (which is then
    /// cleared); stale notifications are ignored.
    pub fn finish(&mut self, ended: PlaybackEnded) -> bool {
        if self.live.as_ref().is_some_and(|l| l.id == ended.id) {
            self.live = None;
            true
        } else {
            false
        }
    }

    /// Fraction of the live utterance elapsed at `now`, clamped to `0..=1`
    #[must_use]
    pub fn progress_at(&self, now: Instant) -> f32 {
        let Some(live) = &self.live else {
            return 0.0;
        };

        if live.utterance.duration.is_zero() {
            return 1.0;
        }

        let elapsed = now.saturating_duration_since(live.started_at);
        #[allow(clippy::cast_possible_truncation)]
        let progress = (elapsed.as_secs_f64() / live.utterance.duration.as_secs_f64()) as f32;
        progress.clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress_at(Instant::now())
    }

    /// Envelope value for the live utterance at `now` (zero when idle or done)
    #[must_use]
    pub fn pulse_at(&self, now: Instant) -> f32 {
        let Some(live) = &self.live else {
            return 0.0;
        };

        if now.saturating_duration_since(live.started_at) >= live.utterance.duration {
            return 0.0;
        }

        envelope::sample_at(&live.utterance.envelope, self.progress_at(now))
    }

    /// The live utterance, if any
    #[must_use]
    pub fn live(&self) -> Option<&Arc<Utterance>> {
        self.live.as_ref().map(|l| &l.utterance)
    }

    /// When the live utterance started
    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        self.live.as_ref().map(|l| l.started_at)
    }

    #[must_use]
    pub const fn is_speaking(&self) -> bool {
        self.live.is_some()
    }
}
