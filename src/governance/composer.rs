//! State composer
//!
//! Pure projection of one tick's outputs into the externally visible
//! [`GovernanceState`]. The lock flag is derived here and only here.

use serde::Serialize;
use tokio::time::Instant;

use crate::config::schema::RequiredRule;
use crate::governance::challenge::{ActiveChallenge, ChallengeStatus};
use crate::governance::evaluator::ChallengeSummary;
use crate::governance::phase::Phase;
use crate::governance::scheduler::ChallengePreview;

/// Snapshot consumed by playback control and UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GovernanceState {
    /// Phase gate
    pub phase: Phase,
    /// Playback must stop
    pub video_locked: bool,
    /// Current media is governed
    pub media_governed: bool,
    /// Session media is paused
    pub paused: bool,
    /// Running or most recent challenge
    pub active_challenge: Option<ChallengeView>,
    /// Next challenge that will start
    pub next_challenge_preview: Option<ChallengePreview>,
}

/// Serializable view of an [`ActiveChallenge`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChallengeView {
    /// Challenge id
    pub id: String,
    /// Policy id
    pub policy_id: String,
    /// Selection id
    pub selection_id: String,
    /// Target zone
    pub zone_id: String,
    /// Rule of the selection
    pub rule: RequiredRule,
    /// Status after this tick
    pub status: ChallengeStatus,
    /// Total time allowed, in seconds
    pub time_limit_seconds: u64,
    /// Time left on the clock while pending, in milliseconds
    pub remaining_ms: u64,
    /// Clock is frozen
    pub paused: bool,
    /// Flipped from failed by recovery
    pub recovered: bool,
    /// This tick's evaluator output
    pub summary: Option<ChallengeSummary>,
}

impl ChallengeView {
    fn project(challenge: &ActiveChallenge, now: Instant) -> Self {
        let remaining_ms = if challenge.status == ChallengeStatus::Pending {
            u64::try_from(challenge.remaining(now).as_millis()).unwrap_or(u64::MAX)
        } else {
            0
        };

        Self {
            id: challenge.id.clone(),
            policy_id: challenge.policy_id.clone(),
            selection_id: challenge.selection_id.clone(),
            zone_id: challenge.zone_id.clone(),
            rule: challenge.rule,
            status: challenge.status,
            time_limit_seconds: challenge.time_limit.as_secs(),
            remaining_ms,
            paused: challenge.is_paused(),
            recovered: challenge.recovered,
            summary: challenge.summary.clone(),
        }
    }
}

/// Inputs to one composition, all from the same tick.
#[derive(Debug, Clone, Copy)]
pub struct ComposeInputs<'a> {
    /// Phase after this tick's step
    pub phase: Phase,
    /// Media governed flag
    pub media_governed: bool,
    /// Session pause flag
    pub paused: bool,
    /// Challenge with this tick's summary written back
    pub challenge: Option<&'a ActiveChallenge>,
    /// Scheduler preview for this tick
    pub preview: Option<&'a ChallengePreview>,
    /// Tick instant
    pub now: Instant,
}

/// Composes the governance state.
///
/// `video_locked = failed challenge || (governed && phase != unlocked)`.
#[must_use]
pub fn compose(inputs: ComposeInputs<'_>) -> GovernanceState {
    let challenge_failed = inputs
        .challenge
        .is_some_and(|c| c.status == ChallengeStatus::Failed);
    let phase_locks = inputs.media_governed && inputs.phase != Phase::Unlocked;

    GovernanceState {
        phase: inputs.phase,
        video_locked: challenge_failed || phase_locks,
        media_governed: inputs.media_governed,
        paused: inputs.paused,
        active_challenge: inputs
            .challenge
            .map(|c| ChallengeView::project(c, inputs.now)),
        next_challenge_preview: inputs.preview.cloned(),
    }
}
