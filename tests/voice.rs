//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::sync::Arc;
use std::time::Duration;

use jarvis_focus::voice::{
    ClockSink, FALLBACK_ENVELOPE_POINTS, Pcm, TtsPipeline, Utterance, envelope, read_wav,
    samples_to_wav, synthesize, write_wav,
};

mod common;

use common::{OfflineSynth, TEST_RATE, ToneSynth, tone};

#[test]
fn envelope_of_silence_is_all_zero() {
    // 8 kHz, 20 ms => 160 samples per frame
    let env = envelope::extract(&[0.0; 1000], TEST_RATE, envelope::FRAME_MS);
    assert_eq!(env.len(), 1000 / 160);
    assert!(env.iter().all(|v| *v == 0.0));
}

#[test]
fn envelope_shorter_than_a_frame_is_empty() {
    assert!(envelope::extract(&[0.3; 159], TEST_RATE, envelope::FRAME_MS).is_empty());
}

#[test]
fn envelope_is_normalized_to_loudest_frame() {
    let mut samples = vec![0.1f32; 160];
    samples.extend(vec![0.4f32; 160]);
    let env = envelope::extract(&samples, TEST_RATE, envelope::FRAME_MS);

    assert_eq!(env.len(), 2);
    assert!((env[1] - 1.0).abs() < 1e-6);
    assert!((env[0] - 0.25).abs() < 1e-4);
    assert_eq!(env, envelope::extract(&samples, TEST_RATE, envelope::FRAME_MS));
}

#[test]
fn utterance_duration_comes_from_samples() {
    let utterance = Utterance::from_pcm(
        "hi",
        Pcm {
            samples: tone(1.5),
            sample_rate: TEST_RATE,
        },
    );
    assert_eq!(utterance.duration, Duration::from_millis(1500));
    assert_eq!(utterance.envelope.len(), 75);
}

#[tokio::test]
async fn outage_produces_silent_second() {
    let synthesis = synthesize(&OfflineSynth, "anyone there?", 1.2).await;

    assert!(synthesis.is_fallback());
    let utterance = synthesis.utterance;
    assert_eq!(utterance.duration, Duration::from_secs(1));
    assert_eq!(utterance.envelope.len(), FALLBACK_ENVELOPE_POINTS);
    assert!(utterance.samples.iter().all(|s| *s == 0.0));
}

#[tokio::test]
async fn preempted_utterance_never_reports_completion() {
    let synth = ToneSynth::new(10.0);
    let (mut pipeline, mut ended) = TtsPipeline::new(synth.clone(), Arc::new(ClockSink::new()));

    let first = pipeline.speak("long one", 1.0).await.unwrap();
    assert!(first.synthesis_error.is_none());
    assert!(pipeline.is_speaking());

    let short = Utterance::from_pcm(
        "short one",
        Pcm {
            samples: tone(0.1),
            sample_rate: TEST_RATE,
        },
    );
    pipeline.start(short).unwrap();
    assert_eq!(pipeline.live().map(|u| u.text.as_str()), Some("short one"));

    let done = tokio::time::timeout(Duration::from_secs(2), ended.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(pipeline.finish(done));

    // The long clip was stopped, so nothing else may arrive
    let extra = tokio::time::timeout(Duration::from_millis(500), ended.recv()).await;
    assert!(extra.is_err());
    assert_eq!(synth.calls(), 1);
}

#[tokio::test]
async fn pulse_follows_envelope_while_speaking() {
    let (mut pipeline, _ended) = TtsPipeline::new(ToneSynth::new(2.0), Arc::new(ClockSink::new()));
    pipeline.speak("pulse", 1.0).await.unwrap();
    let start = pipeline.started_at().unwrap();

    assert!(pipeline.pulse_at(start + Duration::from_millis(100)) > 0.9);
    assert!(pipeline.pulse_at(start + Duration::from_secs(3)).abs() < f32::EPSILON);

    pipeline.stop();
    assert!(!pipeline.is_speaking());
    assert!(pipeline.pulse_at(start + Duration::from_millis(100)).abs() < f32::EPSILON);
}

#[test]
fn wav_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    let samples = tone(0.2);

    write_wav(&path, &samples, TEST_RATE).unwrap();
    let pcm = read_wav(&path).unwrap();
    assert_eq!(pcm.sample_rate, TEST_RATE);
    assert_eq!(pcm.samples.len(), samples.len());

    let bytes = samples_to_wav(&samples, TEST_RATE).unwrap();
    assert_eq!(&bytes[..4], b"RIFF");
}
