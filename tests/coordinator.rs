//! Frame loop integration tests
//!
//! Drives [`Coordinator::run`] through its input channel with a fake
//! synthesizer, a wall-clock sink and a push-channel client attached to the
//! hub.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use jarvis_focus::focus::{FocusStateMachine, FocusTimings, StatusSmoother};
use jarvis_focus::gaze::{Classification, ClickOrigin};
use async_trait::async_trait;
use jarvis_focus::voice::{ClockSink, Pcm, Synthesizer};
use jarvis_focus::{
    AttentionStatus, BroadcastBridge, Coordinator, CoordinatorSettings, FrameInput, FrameView,
    TtsPipeline,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod common;

use common::{OfflineSynth, TEST_RATE, ToneSynth, next_json, tone};

const LINE: &str = "Eyes up.";
const CLICK_LINE: &str = "Nice try.";

/// Running loop plus everything the test needs to poke it
struct Harness {
    inputs: mpsc::Sender<FrameInput>,
    viewer: mpsc::Receiver<Arc<str>>,
    views: Arc<Mutex<Vec<FrameView>>>,
    bridge: BroadcastBridge,
    task: JoinHandle<()>,
}

impl Harness {
    async fn start(synth: Arc<dyn Synthesizer>) -> Self {
        let bridge = BroadcastBridge::spawn();
        let (_, mut viewer) = bridge.register_client().await.unwrap();
        assert_eq!(next_json(&mut viewer).await["type"], "connected");

        // Roast on the first AWAY frame, then stay quiet
        let focus = FocusStateMachine::new(
            FocusTimings {
                away_hold: Duration::ZERO,
                cooldown: Duration::from_secs(60),
            },
            StatusSmoother::new(1, 0.6),
        );
        let settings = CoordinatorSettings {
            lines: vec![LINE.to_string()],
            click_line: CLICK_LINE.to_string(),
            speaking_rate: 1.0,
        };
        let voice = TtsPipeline::new(synth, Arc::new(ClockSink::new()));
        let (coordinator, inbox) =
            Coordinator::new(focus, settings, Some(voice), Some(bridge.clone())).unwrap();

        let (inputs, rx) = mpsc::channel(16);
        let views = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&views);
        let task = tokio::spawn(coordinator.run(
            rx,
            inbox,
            std::future::pending(),
            move |view: &FrameView| sink.lock().unwrap().push(view.clone()),
        ));

        Self {
            inputs,
            viewer,
            views,
            bridge,
            task,
        }
    }

    async fn send(&self, input: FrameInput) {
        self.inputs.send(input).await.unwrap();
    }

    async fn quit(self) -> Vec<FrameView> {
        self.send(FrameInput::Quit).await;
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .unwrap()
            .unwrap();
        let views = self.views.lock().unwrap().clone();
        views
    }
}

fn away() -> FrameInput {
    FrameInput::Frame(Classification::label(AttentionStatus::Away))
}

#[tokio::test]
async fn roast_is_spoken_and_mirrored_to_viewers() {
    let synth = ToneSynth::new(0.2);
    let mut h = Harness::start(synth.clone()).await;

    h.send(away()).await;

    let status = next_json(&mut h.viewer).await;
    assert_eq!(status["type"], "status");
    assert_eq!(status["value"], "AWAY");

    let speak = next_json(&mut h.viewer).await;
    assert_eq!(speak["type"], "speak");
    assert_eq!(speak["text"], LINE);
    let envelope = speak["envelope"].as_array().unwrap();
    assert_eq!(envelope.len(), 10);
    assert!(envelope.iter().all(|v| v.as_f64().unwrap() > 0.0));

    let started = next_json(&mut h.viewer).await;
    assert_eq!(started["type"], "playing");
    assert_eq!(started["value"], true);

    let ended = next_json(&mut h.viewer).await;
    assert_eq!(ended["type"], "playing");
    assert_eq!(ended["value"], false);

    let views = h.quit().await;
    assert_eq!(synth.calls(), 1);
    assert_eq!(views.len(), 1);
    let first = &views[0];
    assert_eq!(first.status, AttentionStatus::Away);
    assert_eq!(first.line.as_deref(), Some(LINE));
    assert_eq!(first.roast.as_ref().map(|r| r.line.as_str()), Some(LINE));
}

#[tokio::test]
async fn remote_click_speaks_the_click_line() {
    let synth = ToneSynth::new(0.05);
    let mut h = Harness::start(synth.clone()).await;
    h.bridge
        .set_click_handler(jarvis_focus::coordinator::remote_click_forwarder(
            h.inputs.clone(),
        ));

    h.bridge.dispatch_click();

    let speak = next_json(&mut h.viewer).await;
    assert_eq!(speak["type"], "speak");
    assert_eq!(speak["text"], CLICK_LINE);
    assert_eq!(next_json(&mut h.viewer).await["value"], true);
    assert_eq!(next_json(&mut h.viewer).await["value"], false);

    h.quit().await;
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn local_click_interrupts_a_roast() {
    let synth = ToneSynth::new(0.5);
    let mut h = Harness::start(synth.clone()).await;

    h.send(away()).await;
    assert_eq!(next_json(&mut h.viewer).await["type"], "status");
    assert_eq!(next_json(&mut h.viewer).await["text"], LINE);
    assert_eq!(next_json(&mut h.viewer).await["value"], true);

    h.send(FrameInput::Click(ClickOrigin::Local)).await;
    let speak = next_json(&mut h.viewer).await;
    assert_eq!(speak["text"], CLICK_LINE);
    assert_eq!(next_json(&mut h.viewer).await["value"], true);

    // Only the click line completes; the roast was preempted
    let ended = next_json(&mut h.viewer).await;
    assert_eq!(ended["type"], "playing");
    assert_eq!(ended["value"], false);

    h.send(FrameInput::Frame(Classification::label(AttentionStatus::Looking)))
        .await;
    assert_eq!(next_json(&mut h.viewer).await["value"], "LOOKING");

    h.quit().await;
    assert_eq!(synth.calls(), 2);
}

/// Roast lines synthesize slowly, everything else quickly
struct SlowRoastSynth;

#[async_trait]
impl Synthesizer for SlowRoastSynth {
    async fn synthesize(&self, text: &str, _rate: f32) -> jarvis_focus::Result<Pcm> {
        let delay = if text == LINE { 300 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(Pcm {
            samples: tone(0.05),
            sample_rate: TEST_RATE,
        })
    }
}

#[tokio::test]
async fn click_supersedes_a_roast_still_synthesizing() {
    let mut h = Harness::start(Arc::new(SlowRoastSynth)).await;

    h.send(away()).await;
    h.send(FrameInput::Click(ClickOrigin::Local)).await;

    // Collect everything pushed well past the slow roast's synthesis time
    let mut spoken = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(800);
    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, h.viewer.recv()).await {
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        if value["type"] == "speak" {
            spoken.push(value["text"].as_str().unwrap().to_string());
        }
    }
    assert_eq!(spoken, vec![CLICK_LINE.to_string()]);

    let views = h.quit().await;
    assert_eq!(views[0].roast.as_ref().map(|r| r.line.as_str()), Some(LINE));
}

#[tokio::test]
async fn synthesis_outage_stays_off_the_wire() {
    let mut h = Harness::start(Arc::new(OfflineSynth)).await;

    h.send(away()).await;
    assert_eq!(next_json(&mut h.viewer).await["value"], "AWAY");

    // One second of silence plays, but viewers never see a speak frame
    let ended = tokio::time::timeout(Duration::from_secs(3), h.viewer.recv())
        .await
        .unwrap()
        .unwrap();
    let ended: serde_json::Value = serde_json::from_str(&ended).unwrap();
    assert_eq!(ended["type"], "playing");
    assert_eq!(ended["value"], false);

    let views = h.quit().await;
    assert_eq!(views[0].line.as_deref(), Some(LINE));
}

#[tokio::test]
async fn closing_input_stops_the_loop() {
    let h = Harness::start(ToneSynth::new(0.05)).await;
    let Harness { inputs, task, .. } = h;
    drop(inputs);
    tokio_test::assert_ok!(tokio::time::timeout(Duration::from_secs(2), task).await);
}
