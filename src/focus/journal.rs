//! Bounded in-memory log of focus events

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::gaze::AttentionStatus;

/// Oldest entries are dropped past this many events
const MAX_EVENTS: usize = 256;

/// What happened
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FocusEventKind {
    /// Smoothed status went LOOKING -> AWAY
    AwayStart,
    /// Smoothed status went AWAY -> LOOKING
    LookingReturn { away_ms: u64 },
    /// Hold elapsed outside cooldown
    Roast { away_ms: u64 },
    /// Active gate flipped
    Toggle { active: bool },
    /// Cooldown cleared
    Reset,
}

/// A timestamped focus event
#[derive(Debug, Clone, Serialize)]
pub struct FocusEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: FocusEventKind,
    pub status: AttentionStatus,
}

/// Ring buffer of recent [`FocusEvent`]s
#[derive(Debug, Clone, Default)]
pub struct FocusJournal {
    events: VecDeque<FocusEvent>,
}

impl FocusJournal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event stamped with the current wall-clock time
    pub fn record(&mut self, kind: FocusEventKind, status: AttentionStatus) {
        if self.events.len() == MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(FocusEvent {
            timestamp: Utc::now(),
            kind,
            status,
        });
    }

    /// Snapshot of recorded events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<FocusEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Milliseconds in a duration, saturating
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
