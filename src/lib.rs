//! Jarvis focus - a webcam attention coach that roasts you for looking away
//!
//! This library provides the attention and speech core:
//! - Focus tracking (smoothing, hold and cooldown timers)
//! - Speech synthesis with loudness envelopes for the pulse animation
//! - Speaker playback on a dedicated thread
//! - A WebSocket push channel for remote HUD viewers
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                Detector (stdin lines)                │
//! └─────────────────────────┬────────────────────────────┘
//!                           │ LOOKING / AWAY
//! ┌─────────────────────────▼────────────────────────────┐
//! │                     Coordinator                      │
//! │   Focus state machine  │  TTS pipeline  │  Typewriter │
//! └──────────┬─────────────────────┬─────────────────────┘
//!            │ broadcast            │ samples
//! ┌──────────▼──────────┐  ┌───────▼────────┐
//! │  Broadcast bridge   │  │ Playback thread│
//! │  (WebSocket hub)    │  │   (cpal)       │
//! └─────────────────────┘  └────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod focus;
pub mod gaze;
pub mod voice;

pub use api::{BridgeServer, BroadcastBridge, WsIncoming, WsOutgoing};
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorSettings, FrameView, RoastEvent, Typewriter};
pub use error::{Error, Result};
pub use focus::{FocusStateMachine, FocusTimings, StatusSmoother};
pub use gaze::{AttentionStatus, Classification, ClickOrigin, FrameInput, PoseThresholds};
pub use voice::{TtsPipeline, Utterance};
