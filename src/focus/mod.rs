//! Focus tracking
//!
//! Turns noisy per-frame gaze labels into a stable attention state and
//! decides when a roast is due.

mod journal;
mod machine;
mod smoothing;

pub use journal::{FocusEvent, FocusEventKind, FocusJournal};
pub use machine::{AttentionSession, FocusStateMachine, FocusTimings, RoastTrigger};
pub use smoothing::{DEFAULT_THRESHOLD, DEFAULT_WINDOW, StatusSmoother};
