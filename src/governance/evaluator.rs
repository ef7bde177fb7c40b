//! Challenge evaluator
//!
//! The only code that answers "is this requirement satisfied right now".
//! Everything is recomputed from the live roster snapshot; the frozen
//! `required_count` on an [`ActiveChallenge`] is never consulted.

use std::sync::Arc;

use serde::Serialize;

use crate::config::schema::RequiredRule;
use crate::error::GovernanceError;
use crate::governance::challenge::ActiveChallenge;
use crate::governance::roster::RosterSnapshot;
use crate::governance::rule::normalize_required_count;
use crate::governance::zone::ZoneLadder;

/// Live evaluation of a zone requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeSummary {
    /// `actual_count >= required_count`
    pub satisfied: bool,
    /// Present participants at or above the target zone, exempt ones included
    pub met_users: Vec<String>,
    /// Present, non-exempt participants below the target zone
    pub missing_users: Vec<String>,
    /// `met_users.len()`
    pub actual_count: usize,
    /// Live required count
    pub required_count: usize,
    /// Ladder name of the target zone
    pub zone_label: String,
}

/// Evaluates zone requirements against a roster snapshot.
#[derive(Debug, Clone)]
pub struct ChallengeEvaluator {
    ladder: Arc<ZoneLadder>,
}

impl ChallengeEvaluator {
    /// Creates an evaluator over the session's zone ladder.
    #[must_use]
    pub const fn new(ladder: Arc<ZoneLadder>) -> Self {
        Self { ladder }
    }

    /// Evaluates an active challenge against the live roster.
    ///
    /// # Errors
    ///
    /// Returns `GovernanceError::UnknownZone` if the challenge targets a zone
    /// that is not on the ladder.
    pub fn evaluate_challenge(
        &self,
        challenge: &ActiveChallenge,
        snapshot: &RosterSnapshot,
    ) -> Result<ChallengeSummary, GovernanceError> {
        self.evaluate(&challenge.zone_id, challenge.rule, snapshot)
    }

    /// Evaluates whether enough present participants are in `zone_id` or above.
    ///
    /// The required count is `rule` applied to the eligible (non-exempt)
    /// participants. Exemption also keeps a participant out of
    /// `missing_users`; an exempt participant in zone still counts as met.
    ///
    /// # Errors
    ///
    /// Returns `GovernanceError::UnknownZone` if `zone_id` is not on the ladder.
    pub fn evaluate(
        &self,
        zone_id: &str,
        rule: RequiredRule,
        snapshot: &RosterSnapshot,
    ) -> Result<ChallengeSummary, GovernanceError> {
        let target = self
            .ladder
            .get(zone_id)
            .ok_or_else(|| GovernanceError::UnknownZone(zone_id.to_string()))?;

        let (met_users, below): (Vec<String>, Vec<String>) = snapshot
            .active_participants
            .iter()
            .cloned()
            .partition(|id| {
                snapshot
                    .zone_of
                    .get(id)
                    .and_then(|zone| self.ladder.rank(zone))
                    .is_some_and(|rank| rank >= target.rank)
            });
        let missing_users = below
            .into_iter()
            .filter(|id| !snapshot.is_exempt(id))
            .collect();

        let required_count = normalize_required_count(rule, snapshot);
        let actual_count = met_users.len();

        Ok(ChallengeSummary {
            satisfied: actual_count >= required_count,
            met_users,
            missing_users,
            actual_count,
            required_count,
            zone_label: target.name.clone(),
        })
    }
}
