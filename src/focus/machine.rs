//! Attention state machine with hold and cooldown timers

use std::time::{Duration, Instant};

use super::journal::{FocusEventKind, FocusJournal, millis};
use super::smoothing::StatusSmoother;
use crate::gaze::AttentionStatus;

/// Hold and cooldown timings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusTimings {
    /// Continuous away time before a roast may fire
    pub away_hold: Duration,
    /// Minimum time between two roasts
    pub cooldown: Duration,
}

impl Default for FocusTimings {
    fn default() -> Self {
        Self {
            away_hold: Duration::from_millis(600),
            cooldown: Duration::from_secs(2),
        }
    }
}

/// Timers for the current away session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttentionSession {
    /// Set when the smoothed status turns AWAY, cleared when it turns back
    pub away_start: Option<Instant>,
    /// When the last roast fired
    pub last_roast: Option<Instant>,
    /// Whether roasts should be acted on
    pub active: bool,
}

impl Default for AttentionSession {
    fn default() -> Self {
        Self {
            away_start: None,
            last_roast: None,
            active: true,
        }
    }
}

/// Emitted when the away hold elapses outside the cooldown window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoastTrigger {
    /// How long the user had been away when it fired
    pub away_for: Duration,
}

/// Turns per-frame labels into at most one roast per qualifying hold
///
/// `update_at` must be called once per classification with non-decreasing
/// timestamps. The active flag is only a gate for callers: `update` keeps
/// tracking (and consuming cooldowns) while inactive.
#[derive(Debug, Clone)]
pub struct FocusStateMachine {
    timings: FocusTimings,
    smoother: StatusSmoother,
    session: AttentionSession,
    journal: FocusJournal,
}

impl Default for FocusStateMachine {
    fn default() -> Self {
        Self::new(FocusTimings::default(), StatusSmoother::default())
    }
}

impl FocusStateMachine {
    #[must_use]
    pub fn new(timings: FocusTimings, smoother: StatusSmoother) -> Self {
        Self {
            timings,
            smoother,
            session: AttentionSession::default(),
            journal: FocusJournal::new(),
        }
    }

    /// Feed a raw label using the current time
    pub fn update(&mut self, raw: AttentionStatus) -> Option<RoastTrigger> {
        self.update_at(raw, Instant::now())
    }

    /// Feed a raw label observed at `now`
    pub fn update_at(&mut self, raw: AttentionStatus, now: Instant) -> Option<RoastTrigger> {
        let status = self.smoother.push(raw);

        match status {
            AttentionStatus::Away => {
                let away_start = if let Some(start) = self.session.away_start {
                    start
                } else {
                    tracing::debug!("started looking away");
                    self.journal.record(FocusEventKind::AwayStart, status);
                    self.session.away_start = Some(now);
                    now
                };

                let away_for = now.saturating_duration_since(away_start);
                if away_for < self.timings.away_hold {
                    return None;
                }

                if let Some(last) = self.session.last_roast {
                    let since = now.saturating_duration_since(last);
                    if since < self.timings.cooldown {
                        tracing::trace!(
                            remaining_ms = millis(self.timings.cooldown.saturating_sub(since)),
                            "cooldown active"
                        );
                        return None;
                    }
                }

                self.session.last_roast = Some(now);
                self.journal.record(
                    FocusEventKind::Roast {
                        away_ms: millis(away_for),
                    },
                    status,
                );
                tracing::info!(away_ms = millis(away_for), "roast triggered");
                Some(RoastTrigger { away_for })
            }
            AttentionStatus::Looking => {
                if let Some(start) = self.session.away_start.take() {
                    let away_ms = millis(now.saturating_duration_since(start));
                    self.journal
                        .record(FocusEventKind::LookingReturn { away_ms }, status);
                    tracing::debug!(away_ms, "returned to looking");
                }
                None
            }
        }
    }

    /// Smoothed status
    #[must_use]
    pub const fn status(&self) -> AttentionStatus {
        self.smoother.status()
    }

    /// How long the current away session has lasted (zero when looking)
    #[must_use]
    pub fn away_duration_at(&self, now: Instant) -> Duration {
        self.session
            .away_start
            .map_or(Duration::ZERO, |start| now.saturating_duration_since(start))
    }

    #[must_use]
    pub fn away_duration(&self) -> Duration {
        self.away_duration_at(Instant::now())
    }

    /// Time since the last roast (zero if none yet)
    #[must_use]
    pub fn time_since_last_roast_at(&self, now: Instant) -> Duration {
        self.session
            .last_roast
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last))
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.session.active
    }

    /// Flip the active gate and return the new value
    pub fn toggle_active(&mut self) -> bool {
        self.session.active = !self.session.active;
        let active = self.session.active;
        self.journal
            .record(FocusEventKind::Toggle { active }, self.status());
        tracing::info!(active, "focus tracking toggled");
        active
    }

    /// Forget the last roast so the next qualifying hold fires immediately
    pub fn reset_cooldown(&mut self) {
        self.session.last_roast = None;
        self.journal.record(FocusEventKind::Reset, self.status());
        tracing::info!("cooldown reset");
    }

    #[must_use]
    pub const fn session(&self) -> &AttentionSession {
        &self.session
    }

    #[must_use]
    pub const fn timings(&self) -> FocusTimings {
        self.timings
    }

    #[must_use]
    pub const fn journal(&self) -> &FocusJournal {
        &self.journal
    }

    pub fn clear_events(&mut self) {
        self.journal.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::FocusEventKind;
    use AttentionStatus::{Away, Looking};

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    /// Machine without smoothing so timing tests see raw labels directly
    fn unsmoothed() -> FocusStateMachine {
        FocusStateMachine::new(FocusTimings::default(), StatusSmoother::new(1, 0.6))
    }

    #[test]
    fn away_start_set_and_cleared() {
        let base = Instant::now();
        let mut fsm = unsmoothed();

        fsm.update_at(Away, base);
        assert_eq!(fsm.session().away_start, Some(base));
        assert_eq!(fsm.away_duration_at(at(base, 300)), Duration::from_millis(300));

        fsm.update_at(Looking, at(base, 400));
        assert_eq!(fsm.session().away_start, None);
        assert_eq!(fsm.away_duration_at(at(base, 500)), Duration::ZERO);

        let kinds: Vec<_> = fsm.journal().events().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FocusEventKind::AwayStart,
                FocusEventKind::LookingReturn { away_ms: 400 }
            ]
        );
    }

    #[test]
    fn cooldown_spaces_roasts() {
        let base = Instant::now();
        let mut fsm = unsmoothed();

        let mut fired = Vec::new();
        for ms in (0..=3000).step_by(100) {
            if fsm.update_at(Away, at(base, ms)).is_some() {
                fired.push(ms);
            }
        }
        assert_eq!(fired, vec![600, 2600]);
    }

    #[test]
    fn reset_cooldown_allows_immediate_roast() {
        let base = Instant::now();
        let mut fsm = unsmoothed();

        fsm.update_at(Away, base);
        assert!(fsm.update_at(Away, at(base, 600)).is_some());
        assert!(fsm.update_at(Away, at(base, 700)).is_none());

        fsm.reset_cooldown();
        assert!(fsm.update_at(Away, at(base, 800)).is_some());
    }

    #[test]
    fn toggle_flips_gate() {
        let mut fsm = unsmoothed();
        assert!(fsm.is_active());
        assert!(!fsm.toggle_active());
        assert!(fsm.toggle_active());
    }

    #[test]
    fn time_since_last_roast_zero_before_first() {
        let base = Instant::now();
        let mut fsm = unsmoothed();
        assert_eq!(fsm.time_since_last_roast_at(base), Duration::ZERO);

        fsm.update_at(Away, base);
        fsm.update_at(Away, at(base, 600));
        assert_eq!(
            fsm.time_since_last_roast_at(at(base, 1000)),
            Duration::from_millis(400)
        );
    }
}
