//! Shared test utilities

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jarvis_focus::voice::{Pcm, Synthesizer};
use jarvis_focus::{Error, Result};
use tokio::sync::mpsc;

/// Sample rate used by the fake synthesizers
pub const TEST_RATE: u32 = 8_000;

/// Square-ish tone of `secs` seconds at [`TEST_RATE`]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn tone(secs: f32) -> Vec<f32> {
    let len = (secs * TEST_RATE as f32) as usize;
    (0..len)
        .map(|i| if (i / 20) % 2 == 0 { 0.4 } else { -0.4 })
        .collect()
}

/// Synthesizer that returns a fixed-length tone and counts calls
pub struct ToneSynth {
    secs: f32,
    calls: AtomicUsize,
}

impl ToneSynth {
    #[must_use]
    pub fn new(secs: f32) -> Arc<Self> {
        Arc::new(Self {
            secs,
            calls: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Synthesizer for ToneSynth {
    async fn synthesize(&self, _text: &str, _rate: f32) -> Result<Pcm> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Pcm {
            samples: tone(self.secs),
            sample_rate: TEST_RATE,
        })
    }
}

/// Synthesizer whose backend is always down
pub struct OfflineSynth;

#[async_trait]
impl Synthesizer for OfflineSynth {
    async fn synthesize(&self, _text: &str, _rate: f32) -> Result<Pcm> {
        Err(Error::Tts("503 service unavailable".to_string()))
    }
}

/// Next pushed frame as JSON, failing the test after two seconds
pub async fn next_json(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
    let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a pushed frame")
        .expect("client dropped by hub");
    serde_json::from_str(&text).expect("pushed frame is not JSON")
}

/// Skip frames until one of the given `type` arrives
pub async fn next_of_type(rx: &mut mpsc::Receiver<Arc<str>>, kind: &str) -> serde_json::Value {
    loop {
        let value = next_json(rx).await;
        if value["type"] == kind {
            return value;
        }
    }
}
