//! Per-frame orchestration
//!
//! The [`Coordinator`] owns the focus state machine and the speech pipeline
//! and is driven from a single task. Synthesis results and "playback ended"
//! notifications arrive on channels and are applied between frames, so no
//! state here is shared with another thread.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::{BroadcastBridge, WsOutgoing};
use crate::focus::FocusStateMachine;
use crate::gaze::{AttentionStatus, ClickOrigin, FrameInput};
use crate::voice::{PlaybackEnded, Synthesis, TtsPipeline, synthesize};
use crate::{Error, Result};

/// Bubble reveal speed in characters per second
pub const TYPEWRITER_CPS: f64 = 40.0;

/// Line spoken when the orb is clicked
pub const DEFAULT_CLICK_LINE: &str = "You're not Iron-Man lil bro";

/// A roast that was acted on this frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoastEvent {
    pub line: String,
}

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameView {
    pub status: AttentionStatus,
    #[serde(serialize_with = "as_secs")]
    pub away_duration: Duration,
    pub active: bool,
    /// Envelope value of the live utterance, 0 when silent
    pub pulse: f32,
    /// Full bubble text
    pub line: Option<String>,
    /// Portion of `line` revealed so far
    pub revealed_text: String,
    pub speaking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roast: Option<RoastEvent>,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Round-robin roast lines
#[derive(Debug, Clone)]
pub struct RoastLines {
    lines: Vec<String>,
    next: usize,
}

impl RoastLines {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `lines` is empty
    pub fn new(lines: Vec<String>) -> Result<Self> {
        if lines.is_empty() {
            return Err(Error::Config("at least one roast line is required".to_string()));
        }
        Ok(Self { lines, next: 0 })
    }

    /// Next line, wrapping at the end
    pub fn next_line(&mut self) -> &str {
        let index = self.next;
        self.next = (self.next + 1) % self.lines.len();
        &self.lines[index]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Reveals bubble text a few characters at a time
#[derive(Debug, Clone, Default)]
pub struct Typewriter {
    text: Option<String>,
    started_at: Option<Instant>,
}

impl Typewriter {
    pub fn set_at(&mut self, text: impl Into<String>, now: Instant) {
        self.text = Some(text.into());
        self.started_at = Some(now);
    }

    pub fn clear(&mut self) {
        self.text = None;
        self.started_at = None;
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Prefix of the text visible at `now`
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn revealed_at(&self, now: Instant) -> &str {
        let (Some(text), Some(start)) = (self.text.as_deref(), self.started_at) else {
            return "";
        };

        let chars = (now.saturating_duration_since(start).as_secs_f64() * TYPEWRITER_CPS) as usize;
        text.char_indices()
            .nth(chars)
            .map_or(text, |(end, _)| &text[..end])
    }
}

/// Static settings for the frame loop
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub lines: Vec<String>,
    pub click_line: String,
    pub speaking_rate: f32,
}

/// A finished synthesis tagged with the request it answers
#[derive(Debug)]
pub struct Synthesized {
    seq: u64,
    synthesis: Synthesis,
}

/// Channels the frame loop drains between inputs
pub struct Inbox {
    synthesized: mpsc::UnboundedReceiver<Synthesized>,
    ended: Option<mpsc::UnboundedReceiver<PlaybackEnded>>,
}

async fn next_ended(
    ended: &mut Option<mpsc::UnboundedReceiver<PlaybackEnded>>,
) -> Option<PlaybackEnded> {
    match ended {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Wires focus tracking, speech and the push channel together
pub struct Coordinator {
    focus: FocusStateMachine,
    tts: Option<TtsPipeline>,
    bridge: Option<BroadcastBridge>,
    lines: RoastLines,
    click_line: String,
    speaking_rate: f32,
    typewriter: Typewriter,
    speaking: bool,
    /// Sequence number of the latest speak request
    speech_seq: u64,
    pending: Option<JoinHandle<()>>,
    synthesized_tx: mpsc::UnboundedSender<Synthesized>,
}

impl Coordinator {
    /// Create the coordinator
    ///
    /// `voice` is the pipeline and its "playback ended" receiver, or `None`
    /// when speech is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no roast lines are configured
    pub fn new(
        focus: FocusStateMachine,
        settings: CoordinatorSettings,
        voice: Option<(TtsPipeline, mpsc::UnboundedReceiver<PlaybackEnded>)>,
        bridge: Option<BroadcastBridge>,
    ) -> Result<(Self, Inbox)> {
        let lines = RoastLines::new(settings.lines)?;
        let (synthesized_tx, synthesized) = mpsc::unbounded_channel();
        let (tts, ended) = voice.unzip();

        Ok((
            Self {
                focus,
                tts,
                bridge,
                lines,
                click_line: settings.click_line,
                speaking_rate: settings.speaking_rate,
                typewriter: Typewriter::default(),
                speaking: false,
                speech_seq: 0,
                pending: None,
                synthesized_tx,
            },
            Inbox { synthesized, ended },
        ))
    }

    /// Drive the loop until input ends, `quit` arrives or `shutdown` resolves
    ///
    /// `on_view` is called with the view produced by every frame.
    pub async fn run<F>(
        mut self,
        mut inputs: mpsc::Receiver<FrameInput>,
        inbox: Inbox,
        shutdown: impl Future<Output = ()>,
        mut on_view: F,
    ) where
        F: FnMut(&FrameView),
    {
        let Inbox {
            mut synthesized,
            mut ended,
        } = inbox;
        tokio::pin!(shutdown);
        tracing::info!(
            tts = self.tts.is_some(),
            bridge = self.bridge.is_some(),
            lines = self.lines.len(),
            "frame loop started"
        );

        loop {
            tokio::select! {
                input = inputs.recv() => {
                    let Some(input) = input else {
                        tracing::info!("input closed");
                        break;
                    };
                    match self.handle_input_at(input, Instant::now()) {
                        ControlFlow::Break(()) => break,
                        ControlFlow::Continue(Some(view)) => on_view(&view),
                        ControlFlow::Continue(None) => {}
                    }
                }
                Some(synthesized) = synthesized.recv() => self.on_synthesized(synthesized),
                Some(done) = next_ended(&mut ended) => self.on_playback_ended(done),
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        self.shutdown();
    }

    /// Apply one input observed at `now`
    ///
    /// Frames produce a view; `Quit` breaks.
    pub fn handle_input_at(
        &mut self,
        input: FrameInput,
        now: Instant,
    ) -> ControlFlow<(), Option<FrameView>> {
        match input {
            FrameInput::Frame(classification) => {
                ControlFlow::Continue(Some(self.handle_frame_at(classification.status, now)))
            }
            FrameInput::Unavailable => {
                let reason = Error::Classification("no face detected".to_string());
                tracing::trace!(%reason, "treating frame as away");
                ControlFlow::Continue(Some(self.handle_frame_at(AttentionStatus::Away, now)))
            }
            FrameInput::Toggle => {
                self.focus.toggle_active();
                ControlFlow::Continue(None)
            }
            FrameInput::Reset => {
                self.reset();
                ControlFlow::Continue(None)
            }
            FrameInput::Click(origin) => {
                self.click_at(origin, now);
                ControlFlow::Continue(None)
            }
            FrameInput::Quit => ControlFlow::Break(()),
        }
    }

    /// Feed one classification and build the frame's view
    pub fn handle_frame_at(&mut self, raw: AttentionStatus, now: Instant) -> FrameView {
        let mut roast = None;

        if let Some(trigger) = self.focus.update_at(raw, now) {
            if !self.focus.is_active() {
                tracing::debug!("roast suppressed while inactive");
            } else if self.tts.is_none() {
                tracing::debug!("roast due but speech is disabled");
            } else {
                let line = self.lines.next_line().to_string();
                tracing::info!(
                    line = %line,
                    away_ms = u64::try_from(trigger.away_for.as_millis()).unwrap_or(u64::MAX),
                    "roasting"
                );
                self.speak_line_at(&line, now);
                roast = Some(RoastEvent { line });
            }
        }

        self.broadcast(&WsOutgoing::Status {
            value: self.focus.status(),
        });

        let mut view = self.view_at(now);
        view.roast = roast;
        view
    }

    /// Speak the click line, whichever side the click came from
    pub fn click_at(&mut self, origin: ClickOrigin, now: Instant) {
        if self.tts.is_none() {
            tracing::info!(?origin, "click ignored, speech is disabled");
            return;
        }
        tracing::info!(?origin, "orb clicked");
        let line = self.click_line.clone();
        self.speak_line_at(&line, now);
    }

    /// Reset cooldown and clear the bubble; live audio keeps playing
    pub fn reset(&mut self) {
        self.focus.reset_cooldown();
        self.typewriter.clear();
        self.speaking = false;
    }

    /// Show `text` in the bubble and synthesize it off the frame loop
    ///
    /// A newer request supersedes any synthesis still in flight.
    fn speak_line_at(&mut self, text: &str, now: Instant) {
        let Some(pipeline) = &self.tts else {
            return;
        };

        self.typewriter.set_at(text, now);

        if let Some(previous) = self.pending.take() {
            previous.abort();
        }
        self.speech_seq += 1;

        let seq = self.speech_seq;
        let synth = pipeline.synthesizer();
        let tx = self.synthesized_tx.clone();
        let text = text.to_string();
        let rate = self.speaking_rate;
        self.pending = Some(tokio::spawn(async move {
            let synthesis = synthesize(synth.as_ref(), &text, rate).await;
            let _ = tx.send(Synthesized { seq, synthesis });
        }));
    }

    /// Apply a finished synthesis unless a newer request replaced it
    pub fn on_synthesized(&mut self, synthesized: Synthesized) {
        let Synthesized { seq, synthesis } = synthesized;
        if seq != self.speech_seq {
            tracing::debug!(
                seq,
                latest = self.speech_seq,
                text = %synthesis.utterance.text,
                "dropping superseded synthesis"
            );
            return;
        }

        self.pending = None;
        self.start_synthesis(synthesis);
    }

    fn start_synthesis(&mut self, synthesis: Synthesis) {
        let Some(pipeline) = &mut self.tts else {
            return;
        };

        let fallback = synthesis.is_fallback();
        let text = synthesis.utterance.text.clone();
        let envelope = synthesis.utterance.envelope.clone();

        match pipeline.start(synthesis.utterance) {
            Ok(_) => {
                self.speaking = true;
                if fallback {
                    tracing::debug!(text = %text, "playing silent fallback");
                } else {
                    self.broadcast(&WsOutgoing::Speak { text, envelope });
                    self.broadcast(&WsOutgoing::Playing { value: true });
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, text = %text, "failed to start playback");
                self.speaking = false;
            }
        }
    }

    /// Apply a "playback ended" notification
    pub fn on_playback_ended(&mut self, ended: PlaybackEnded) {
        let Some(pipeline) = &mut self.tts else {
            return;
        };

        if pipeline.finish(ended) {
            tracing::debug!(id = ended.id, "utterance finished");
            self.speaking = false;
            self.broadcast(&WsOutgoing::Playing { value: false });
        }
    }

    /// Renderer view at `now` (without a roast event)
    #[must_use]
    pub fn view_at(&self, now: Instant) -> FrameView {
        let pulse = match &self.tts {
            Some(pipeline) if self.speaking => pipeline.pulse_at(now),
            _ => 0.0,
        };

        FrameView {
            status: self.focus.status(),
            away_duration: self.focus.away_duration_at(now),
            active: self.focus.is_active(),
            pulse,
            line: self.typewriter.text().map(str::to_string),
            revealed_text: self.typewriter.revealed_at(now).to_string(),
            speaking: self.speaking,
            roast: None,
        }
    }

    #[must_use]
    pub const fn focus(&self) -> &FocusStateMachine {
        &self.focus
    }

    /// Stop any live playback
    pub fn shutdown(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
        if let Some(pipeline) = &mut self.tts {
            pipeline.stop();
        }
        self.speaking = false;
        tracing::info!("frame loop stopped");
    }

    fn broadcast(&self, message: &WsOutgoing) {
        if let Some(bridge) = &self.bridge {
            bridge.broadcast(message);
        }
    }
}

/// Click handler that forwards remote clicks into the frame loop
#[must_use]
pub fn remote_click_forwarder(
    inputs: mpsc::Sender<FrameInput>,
) -> impl Fn() + Send + Sync + 'static {
    move || {
        if inputs.try_send(FrameInput::Click(ClickOrigin::Remote)).is_err() {
            tracing::warn!("frame loop busy, dropping remote click");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::{FocusTimings, StatusSmoother};
    use crate::gaze::AttentionStatus::{Away, Looking};

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            lines: vec!["one".to_string(), "two".to_string()],
            click_line: DEFAULT_CLICK_LINE.to_string(),
            speaking_rate: 1.0,
        }
    }

    fn silent_coordinator() -> Coordinator {
        let focus = FocusStateMachine::new(FocusTimings::default(), StatusSmoother::new(1, 0.6));
        Coordinator::new(focus, settings(), None, None).unwrap().0
    }

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    struct Offline;

    #[async_trait::async_trait]
    impl crate::voice::Synthesizer for Offline {
        async fn synthesize(&self, _text: &str, _rate: f32) -> Result<crate::voice::Pcm> {
            Err(Error::Tts("offline".to_string()))
        }
    }

    fn finished(seq: u64, text: &str) -> Synthesized {
        Synthesized {
            seq,
            synthesis: Synthesis {
                utterance: crate::voice::Utterance::silent(text),
                error: None,
            },
        }
    }

    #[tokio::test]
    async fn superseded_synthesis_is_dropped() {
        let focus = FocusStateMachine::new(FocusTimings::default(), StatusSmoother::new(1, 0.6));
        let voice = TtsPipeline::new(
            std::sync::Arc::new(Offline),
            std::sync::Arc::new(crate::voice::ClockSink::new()),
        );
        let (mut coordinator, _inbox) =
            Coordinator::new(focus, settings(), Some(voice), None).unwrap();
        let now = Instant::now();

        coordinator.click_at(ClickOrigin::Local, now);
        coordinator.click_at(ClickOrigin::Remote, now);

        coordinator.on_synthesized(finished(1, "older"));
        assert!(!coordinator.view_at(now).speaking);

        coordinator.on_synthesized(finished(2, DEFAULT_CLICK_LINE));
        assert!(coordinator.view_at(now).speaking);
        coordinator.shutdown();
    }

    #[test]
    fn lines_round_robin() {
        let mut lines = RoastLines::new(vec!["a".into(), "b".into(), "c".into()]).unwrap();
        let picked: Vec<_> = (0..5).map(|_| lines.next_line().to_string()).collect();
        assert_eq!(picked, vec!["a", "b", "c", "a", "b"]);
    }

    #[test]
    fn empty_lines_rejected() {
        assert!(matches!(RoastLines::new(Vec::new()), Err(Error::Config(_))));
    }

    #[test]
    fn typewriter_reveals_forty_chars_per_second() {
        let base = Instant::now();
        let mut tw = Typewriter::default();
        assert_eq!(tw.revealed_at(base), "");

        tw.set_at("You're not Iron-Man lil bro", base);
        assert_eq!(tw.revealed_at(base), "");
        assert_eq!(tw.revealed_at(at(base, 250)), "You're not");
        assert_eq!(tw.revealed_at(at(base, 5000)), "You're not Iron-Man lil bro");

        tw.clear();
        assert_eq!(tw.text(), None);
    }

    #[test]
    fn typewriter_respects_char_boundaries() {
        let base = Instant::now();
        let mut tw = Typewriter::default();
        tw.set_at("héllo", base);
        assert_eq!(tw.revealed_at(at(base, 50)), "hé");
    }

    #[test]
    fn frames_report_status_and_away_time() {
        let base = Instant::now();
        let mut coordinator = silent_coordinator();

        let view = coordinator.handle_frame_at(Away, base);
        assert_eq!(view.status, Away);

        let view = coordinator.handle_frame_at(Away, at(base, 400));
        assert_eq!(view.away_duration, Duration::from_millis(400));
        assert!((view.pulse).abs() < f32::EPSILON);
        assert!(!view.speaking);

        let view = coordinator.handle_frame_at(Looking, at(base, 500));
        assert_eq!(view.status, Looking);
        assert_eq!(view.away_duration, Duration::ZERO);
    }

    #[test]
    fn unavailable_counts_as_away() {
        let base = Instant::now();
        let mut coordinator = silent_coordinator();
        let flow = coordinator.handle_input_at(FrameInput::Unavailable, base);
        let ControlFlow::Continue(Some(view)) = flow else {
            panic!("expected a frame view");
        };
        assert_eq!(view.status, Away);
    }

    #[test]
    fn quit_breaks_and_controls_produce_no_view() {
        let base = Instant::now();
        let mut coordinator = silent_coordinator();
        assert_eq!(
            coordinator.handle_input_at(FrameInput::Toggle, base),
            ControlFlow::Continue(None)
        );
        assert!(!coordinator.focus().is_active());
        assert_eq!(
            coordinator.handle_input_at(FrameInput::Quit, base),
            ControlFlow::Break(())
        );
    }

    #[test]
    fn view_serializes_for_renderers() {
        let base = Instant::now();
        let mut coordinator = silent_coordinator();
        let view = coordinator.handle_frame_at(Looking, base);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["status"], "LOOKING");
        assert_eq!(json["active"], true);
        assert!(json.get("roast").is_none());
    }
}
