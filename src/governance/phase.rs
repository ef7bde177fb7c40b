//! Phase state machine
//!
//! Coarse media gate with a grace period:
//!
//! - not governed, or requirement met → `unlocked`
//! - `unlocked` and requirement unmet → `pending`
//! - `pending` for at least the grace period → `locked`
//!
//! Challenges are not an input here; the composer folds them in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Phase of the media gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Media may play.
    #[default]
    Unlocked,
    /// Requirement unmet; grace period running.
    Pending,
    /// Grace period elapsed with the requirement unmet.
    Locked,
}

impl Phase {
    /// Lowercase name used in logs, events, and metric labels.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unlocked => "unlocked",
            Self::Pending => "pending",
            Self::Locked => "locked",
        }
    }

    /// Numeric value for the phase gauge.
    #[must_use]
    pub const fn gauge_value(self) -> f64 {
        match self {
            Self::Unlocked => 0.0,
            Self::Pending => 1.0,
            Self::Locked => 2.0,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A phase change produced by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    /// Phase before the step
    pub from: Phase,
    /// Phase after the step
    pub to: Phase,
}

/// Phase machine for one session.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: Phase,
    pending_since: Option<Instant>,
    grace_period: Duration,
}

impl PhaseMachine {
    /// Creates an `unlocked` machine.
    #[must_use]
    pub const fn new(grace_period: Duration) -> Self {
        Self {
            phase: Phase::Unlocked,
            pending_since: None,
            grace_period,
        }
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Instant the current pending period started.
    #[must_use]
    pub const fn pending_since(&self) -> Option<Instant> {
        self.pending_since
    }

    /// Advances the machine for one tick.
    ///
    /// With a zero grace period, `unlocked → locked` happens in a single
    /// step (reported as one transition).
    pub fn step(&mut self, governed: bool, requirement_met: bool, now: Instant) -> Option<PhaseTransition> {
        let from = self.phase;

        if !governed || requirement_met {
            self.phase = Phase::Unlocked;
            self.pending_since = None;
        } else {
            if self.phase == Phase::Unlocked {
                self.phase = Phase::Pending;
                self.pending_since = Some(now);
            }
            if self.phase == Phase::Pending {
                let since = *self.pending_since.get_or_insert(now);
                if now.saturating_duration_since(since) >= self.grace_period {
                    self.phase = Phase::Locked;
                }
            }
        }

        (from != self.phase).then_some(PhaseTransition {
            from,
            to: self.phase,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(10);

    #[test]
    fn test_starts_unlocked() {
        let machine = PhaseMachine::new(GRACE);
        assert_eq!(machine.phase(), Phase::Unlocked);
        assert!(machine.pending_since().is_none());
    }

    #[test]
    fn test_unmet_goes_pending_then_locked() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(GRACE);

        let tr = machine.step(true, false, t0).unwrap();
        assert_eq!((tr.from, tr.to), (Phase::Unlocked, Phase::Pending));

        assert!(machine.step(true, false, t0 + Duration::from_secs(9)).is_none());

        let tr = machine.step(true, false, t0 + GRACE).unwrap();
        assert_eq!((tr.from, tr.to), (Phase::Pending, Phase::Locked));
    }

    #[test]
    fn test_zero_grace_locks_same_tick() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(Duration::ZERO);
        let tr = machine.step(true, false, t0).unwrap();
        assert_eq!((tr.from, tr.to), (Phase::Unlocked, Phase::Locked));
    }

    #[test]
    fn test_requirement_met_unlocks() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(Duration::ZERO);
        machine.step(true, false, t0);

        let tr = machine.step(true, true, t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(tr.to, Phase::Unlocked);
        assert!(machine.pending_since().is_none());
    }

    #[test]
    fn test_ungoverned_always_unlocked() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(GRACE);
        machine.step(true, false, t0);
        assert_eq!(machine.phase(), Phase::Pending);

        machine.step(false, false, t0 + Duration::from_secs(1));
        assert_eq!(machine.phase(), Phase::Unlocked);
        assert!(machine.step(false, false, t0 + Duration::from_secs(60)).is_none());
    }

    #[test]
    fn test_pending_clock_restarts_after_unlock() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(GRACE);
        machine.step(true, false, t0);
        machine.step(true, true, t0 + Duration::from_secs(8));
        machine.step(true, false, t0 + Duration::from_secs(9));

        assert!(machine.step(true, false, t0 + Duration::from_secs(12)).is_none());
        assert_eq!(machine.phase(), Phase::Pending);
    }

    #[test]
    fn test_repeated_steps_are_stable() {
        let t0 = Instant::now();
        let mut machine = PhaseMachine::new(GRACE);
        machine.step(true, false, t0);
        machine.step(true, false, t0 + GRACE);
        for _ in 0..5 {
            assert!(machine.step(true, false, t0 + GRACE).is_none());
            assert_eq!(machine.phase(), Phase::Locked);
        }
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Phase::Locked).unwrap(), "\"locked\"");
        assert_eq!(Phase::Pending.to_string(), "pending");
    }
}
