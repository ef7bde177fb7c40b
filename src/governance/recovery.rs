//! Recovery controller
//!
//! Re-checks failed challenges every tick against this tick's evaluator
//! output. When the live roster now satisfies the requirement (someone left,
//! zones improved) the challenge flips to `success` and stops locking.

use tracing::info;

use crate::governance::challenge::{ActiveChallenge, ChallengeStatus};
use crate::governance::evaluator::ChallengeSummary;

/// Flips failed challenges back to success.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryController;

impl RecoveryController {
    /// Creates a recovery controller.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Applies `summary` to a failed challenge.
    ///
    /// Returns `true` when the challenge was recovered on this call.
    pub fn try_recover(&self, challenge: &mut ActiveChallenge, summary: &ChallengeSummary) -> bool {
        if challenge.status != ChallengeStatus::Failed || !summary.satisfied {
            return false;
        }

        challenge.status = ChallengeStatus::Success;
        challenge.recovered = true;
        info!(
            challenge_id = %challenge.id,
            policy_id = %challenge.policy_id,
            actual = summary.actual_count,
            required = summary.required_count,
            "failed challenge recovered"
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RequiredRule;
    use std::time::Duration;
    use tokio::time::Instant;

    fn failed() -> ActiveChallenge {
        let now = Instant::now();
        let mut c = ActiveChallenge::new(
            "p",
            "s",
            "hot",
            RequiredRule::All,
            2,
            Duration::from_secs(1),
            now,
        );
        c.settle(false, now + Duration::from_secs(1));
        c
    }

    fn summary(satisfied: bool) -> ChallengeSummary {
        ChallengeSummary {
            satisfied,
            met_users: vec!["A".to_string()],
            missing_users: if satisfied { vec![] } else { vec!["B".to_string()] },
            actual_count: 1,
            required_count: if satisfied { 1 } else { 2 },
            zone_label: "Hot".to_string(),
        }
    }

    #[test]
    fn test_recovers_when_satisfied() {
        let mut c = failed();
        assert!(RecoveryController::new().try_recover(&mut c, &summary(true)));
        assert_eq!(c.status, ChallengeStatus::Success);
        assert!(c.recovered);
    }

    #[test]
    fn test_stays_failed_when_unsatisfied() {
        let mut c = failed();
        assert!(!RecoveryController::new().try_recover(&mut c, &summary(false)));
        assert_eq!(c.status, ChallengeStatus::Failed);
    }

    #[test]
    fn test_ignores_pending_challenge() {
        let mut c = failed();
        c.status = ChallengeStatus::Pending;
        assert!(!RecoveryController::new().try_recover(&mut c, &summary(true)));
        assert_eq!(c.status, ChallengeStatus::Pending);
        assert!(!c.recovered);
    }
}
