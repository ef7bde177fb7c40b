//! Governance core
//!
//! Decides, tick by tick, whether governed media may play.
//!
//! # Architecture
//!
//! - [`Roster`] - latest zone and presence per participant
//! - [`normalize_required_count`] - the one required-count rule
//! - [`ChallengeEvaluator`] - the one "is it satisfied" authority
//! - [`ChallengeScheduler`] - randomized per-policy challenge arming
//! - [`RecoveryController`] - failed → success when live state allows
//! - [`PhaseMachine`] - `unlocked` / `pending` / `locked` with grace
//! - [`compose`] - projection to [`GovernanceState`]
//! - [`GovernanceEngine`] - owns all of the above for one session

pub mod challenge;
pub mod composer;
pub mod engine;
pub mod evaluator;
pub mod history;
pub mod phase;
pub mod recovery;
pub mod roster;
pub mod rule;
pub mod scheduler;
pub mod zone;

pub use challenge::{ActiveChallenge, ChallengeStatus};
pub use composer::{ChallengeView, ComposeInputs, GovernanceState, compose};
pub use engine::{EngineEvent, GovernanceEngine, TickOutcome};
pub use evaluator::{ChallengeEvaluator, ChallengeSummary};
pub use history::{ChallengeHistory, ChallengeOutcome, HistoryEntry};
pub use phase::{Phase, PhaseMachine, PhaseTransition};
pub use recovery::RecoveryController;
pub use roster::{Participant, Roster, RosterSnapshot, SampleOutcome};
pub use rule::normalize_required_count;
pub use scheduler::{ChallengePreview, ChallengeScheduler, SchedulerPoll};
pub use zone::ZoneLadder;
