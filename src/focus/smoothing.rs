//! Majority-vote smoothing over a rolling window of raw labels

use std::collections::VecDeque;

use crate::gaze::AttentionStatus;

/// Number of frames in the rolling window
pub const DEFAULT_WINDOW: usize = 5;

/// Share of the window a label needs before the smoothed status follows it
pub const DEFAULT_THRESHOLD: f64 = 0.6;

/// Slack for float comparison of window shares (3/5 must count as 60%)
const SHARE_EPSILON: f64 = 1e-9;

/// Rolling-window majority filter
///
/// Until the window fills, the smoothed status simply follows the raw label.
/// Once full, it changes only when one label holds at least `threshold` of
/// the window; otherwise the previous smoothed status is kept.
#[derive(Debug, Clone)]
pub struct StatusSmoother {
    history: VecDeque<AttentionStatus>,
    window: usize,
    threshold: f64,
    current: AttentionStatus,
}

impl Default for StatusSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_THRESHOLD)
    }
}

impl StatusSmoother {
    /// Create a smoother; `window` is clamped to at least one frame
    #[must_use]
    pub fn new(window: usize, threshold: f64) -> Self {
        let window = window.max(1);
        Self {
            history: VecDeque::with_capacity(window),
            window,
            threshold,
            current: AttentionStatus::Looking,
        }
    }

    /// Feed one raw label and return the smoothed status
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, raw: AttentionStatus) -> AttentionStatus {
        self.history.push_back(raw);
        while self.history.len() > self.window {
            self.history.pop_front();
        }

        if self.history.len() < self.window {
            self.current = raw;
            return raw;
        }

        let total = self.history.len() as f64;
        let away = self.history.iter().filter(|s| s.is_away()).count() as f64;
        let looking = total - away;

        if looking / total + SHARE_EPSILON >= self.threshold {
            self.current = AttentionStatus::Looking;
        } else if away / total + SHARE_EPSILON >= self.threshold {
            self.current = AttentionStatus::Away;
        }

        self.current
    }

    /// Current smoothed status
    #[must_use]
    pub const fn status(&self) -> AttentionStatus {
        self.current
    }

    /// Whether the window has filled up
    #[must_use]
    pub fn is_primed(&self) -> bool {
        self.history.len() == self.window
    }

    #[must_use]
    pub const fn window(&self) -> usize {
        self.window
    }
}
