//! Active challenge
//!
//! A materialized quorum challenge with a pause-aware deadline. Status moves
//! `pending → success | failed`, and `failed → success` on recovery.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::RequiredRule;
use crate::governance::evaluator::ChallengeSummary;

/// Lifecycle status of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    /// Running; the deadline has not passed.
    Pending,
    /// Requirement met (possibly after recovery).
    Success,
    /// Deadline passed with the requirement unmet.
    Failed,
}

impl ChallengeStatus {
    /// Returns `true` for `success` and `failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// A running or recently finished challenge.
#[derive(Debug, Clone)]
pub struct ActiveChallenge {
    /// Unique id (UUID v4)
    pub id: String,
    /// Policy that produced it
    pub policy_id: String,
    /// Selection it was built from
    pub selection_id: String,
    /// Target zone
    pub zone_id: String,
    /// Required-count rule
    pub rule: RequiredRule,
    /// Creation-time snapshot; informational only
    pub required_count: usize,
    /// Total time allowed
    pub time_limit: Duration,
    /// Creation instant
    pub started_at: Instant,
    /// Deadline (moves on resume)
    pub expires_at: Instant,
    /// Current status
    pub status: ChallengeStatus,
    /// Archived in history
    pub history_recorded: bool,
    /// Latest evaluator output
    pub summary: Option<ChallengeSummary>,
    /// Pause instant, while paused
    pub paused_at: Option<Instant>,
    /// Time left on the clock when paused
    pub paused_remaining: Option<Duration>,
    /// Flipped from failed to success by recovery
    pub recovered: bool,
}

impl ActiveChallenge {
    /// Creates a pending challenge that expires `time_limit` after `now`.
    #[must_use]
    pub fn new(
        policy_id: impl Into<String>,
        selection_id: impl Into<String>,
        zone_id: impl Into<String>,
        rule: RequiredRule,
        required_count: usize,
        time_limit: Duration,
        now: Instant,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            policy_id: policy_id.into(),
            selection_id: selection_id.into(),
            zone_id: zone_id.into(),
            rule,
            required_count,
            time_limit,
            started_at: now,
            expires_at: now + time_limit,
            status: ChallengeStatus::Pending,
            history_recorded: false,
            summary: None,
            paused_at: None,
            paused_remaining: None,
            recovered: false,
        }
    }

    /// Returns `true` while the clock is frozen.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Freezes the clock. No-op when already paused or not pending.
    pub fn pause(&mut self, now: Instant) {
        if self.is_paused() || self.status != ChallengeStatus::Pending {
            return;
        }
        self.paused_at = Some(now);
        self.paused_remaining = Some(self.expires_at.saturating_duration_since(now));
    }

    /// Restarts the clock with exactly the time that was left at pause.
    /// No-op when not paused.
    pub fn resume(&mut self, now: Instant) {
        if self.paused_at.take().is_none() {
            return;
        }
        if let Some(remaining) = self.paused_remaining.take() {
            self.expires_at = now + remaining;
        }
    }

    /// Time left before the deadline; frozen while paused.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.paused_remaining {
            Some(remaining) => remaining,
            None => self.expires_at.saturating_duration_since(now),
        }
    }

    /// Applies this tick's evaluation to a pending challenge.
    ///
    /// Satisfied → `success`. Unsatisfied past the deadline and not paused →
    /// `failed`. Returns the new status when it changed.
    pub fn settle(&mut self, satisfied: bool, now: Instant) -> Option<ChallengeStatus> {
        if self.status != ChallengeStatus::Pending {
            return None;
        }
        if satisfied {
            self.status = ChallengeStatus::Success;
        } else if !self.is_paused() && now >= self.expires_at {
            self.status = ChallengeStatus::Failed;
        } else {
            return None;
        }
        self.paused_at = None;
        self.paused_remaining = None;
        Some(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(now: Instant) -> ActiveChallenge {
        ActiveChallenge::new(
            "policy",
            "all-hot",
            "hot",
            RequiredRule::All,
            3,
            Duration::from_secs(30),
            now,
        )
    }

    #[test]
    fn test_new_challenge_is_pending() {
        let now = Instant::now();
        let c = challenge(now);
        assert_eq!(c.status, ChallengeStatus::Pending);
        assert_eq!(c.expires_at, now + Duration::from_secs(30));
        assert_eq!(uuid::Uuid::parse_str(&c.id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_pause_resume_preserves_remaining() {
        let t0 = Instant::now();
        let mut c = challenge(t0);

        let paused = t0 + Duration::from_secs(10);
        c.pause(paused);
        assert_eq!(c.remaining(paused + Duration::from_secs(100)), Duration::from_secs(20));

        let resumed = paused + Duration::from_secs(300);
        c.resume(resumed);
        assert_eq!(c.expires_at, resumed + Duration::from_secs(20));
        assert_eq!(c.remaining(resumed), Duration::from_secs(20));
    }

    #[test]
    fn test_pause_twice_keeps_first_pause() {
        let t0 = Instant::now();
        let mut c = challenge(t0);
        c.pause(t0 + Duration::from_secs(5));
        c.pause(t0 + Duration::from_secs(25));
        assert_eq!(c.paused_remaining, Some(Duration::from_secs(25)));
    }

    #[test]
    fn test_resume_without_pause_is_noop() {
        let t0 = Instant::now();
        let mut c = challenge(t0);
        c.resume(t0 + Duration::from_secs(10));
        assert_eq!(c.expires_at, t0 + Duration::from_secs(30));
    }

    #[test]
    fn test_settle_success_and_failure() {
        let t0 = Instant::now();
        let mut c = challenge(t0);
        assert_eq!(c.settle(false, t0 + Duration::from_secs(29)), None);
        assert_eq!(
            c.settle(false, t0 + Duration::from_secs(30)),
            Some(ChallengeStatus::Failed)
        );
        assert_eq!(c.settle(true, t0 + Duration::from_secs(31)), None);

        let mut c = challenge(t0);
        assert_eq!(c.settle(true, t0), Some(ChallengeStatus::Success));
    }

    #[test]
    fn test_paused_challenge_cannot_fail() {
        let t0 = Instant::now();
        let mut c = challenge(t0);
        c.pause(t0 + Duration::from_secs(1));
        assert_eq!(c.settle(false, t0 + Duration::from_secs(60)), None);
        assert_eq!(
            c.settle(true, t0 + Duration::from_secs(61)),
            Some(ChallengeStatus::Success)
        );
        assert!(!c.is_paused());
    }
}
