//! Governance engine
//!
//! Owns every governance component for one session. Commands mutate inputs
//! (roster, governed flag, pause); [`GovernanceEngine::tick`] runs the
//! pipeline in a fixed order and composes the published state:
//!
//! scheduler → evaluator → recovery → phase → composer
//!
//! The engine is single-owner and never shared between sessions. All time
//! is passed in explicitly so the pipeline is deterministic under test.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::schema::GovernanceConfig;
use crate::config::validation::check_zone_references;
use crate::error::{ConfigError, GovernanceError, RosterError};
use crate::governance::challenge::{ActiveChallenge, ChallengeStatus};
use crate::governance::composer::{ComposeInputs, GovernanceState, compose};
use crate::governance::evaluator::ChallengeEvaluator;
use crate::governance::history::{ChallengeHistory, ChallengeOutcome, HistoryEntry};
use crate::governance::phase::{Phase, PhaseMachine};
use crate::governance::recovery::RecoveryController;
use crate::governance::roster::{Roster, RosterSnapshot, SampleOutcome};
use crate::governance::scheduler::{ChallengeScheduler, SchedulerPoll};
use crate::governance::zone::ZoneLadder;

/// Something observable that happened inside the engine.
///
/// Drained by the session loop into logs, metrics, and the event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A challenge was materialized.
    ChallengeStarted {
        /// Challenge id
        challenge_id: String,
        /// Policy id
        policy_id: String,
        /// Selection id
        selection_id: String,
        /// Target zone
        zone_id: String,
        /// Creation-time required count
        required_count: usize,
        /// Time allowed, in seconds
        time_allowed_seconds: u64,
    },
    /// A challenge reached a terminal outcome and was archived.
    ChallengeResolved {
        /// Challenge id
        challenge_id: String,
        /// Policy id
        policy_id: String,
        /// Outcome
        outcome: ChallengeOutcome,
        /// Participants in zone
        actual_count: usize,
        /// Live required count
        required_count: usize,
    },
    /// A failed challenge flipped to success.
    ChallengeRecovered {
        /// Challenge id
        challenge_id: String,
        /// Policy id
        policy_id: String,
    },
    /// A due policy was deferred because nobody was present.
    SchedulingSkipped {
        /// Policy id
        policy_id: String,
    },
    /// The phase gate moved.
    PhaseChanged {
        /// Previous phase
        from: Phase,
        /// New phase
        to: Phase,
    },
    /// The lock flag flipped.
    LockChanged {
        /// New lock flag
        locked: bool,
    },
    /// A participant was marked absent after the sample timeout.
    ParticipantTimedOut {
        /// Participant id
        participant_id: String,
    },
}

/// Result of one tick.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    /// Composed state
    pub state: GovernanceState,
    /// State differs from the previous tick's
    pub changed: bool,
    /// Events since the previous tick, in order
    pub events: Vec<EngineEvent>,
}

/// Governance engine for one session.
#[derive(Debug)]
pub struct GovernanceEngine {
    config: Arc<GovernanceConfig>,
    evaluator: ChallengeEvaluator,
    ladder: Arc<ZoneLadder>,
    roster: Roster,
    scheduler: ChallengeScheduler,
    recovery: RecoveryController,
    phase: PhaseMachine,
    history: ChallengeHistory,
    challenge: Option<ActiveChallenge>,
    media_governed: bool,
    paused_at: Option<Instant>,
    started_at: Instant,
    state: GovernanceState,
    pending_events: Vec<EngineEvent>,
}

impl GovernanceEngine {
    /// Configures an engine. Media starts ungoverned, so nothing is
    /// scheduled until [`GovernanceEngine::set_media_governed`] turns it on.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MisconfiguredChallenge` if any selection or the
    /// base requirement references a zone missing from the ladder.
    pub fn new(config: Arc<GovernanceConfig>, now: Instant) -> Result<Self, ConfigError> {
        check_zone_references(&config)?;

        let ladder = Arc::new(ZoneLadder::new(config.zone_ladder.clone()));
        Ok(Self {
            evaluator: ChallengeEvaluator::new(Arc::clone(&ladder)),
            roster: Roster::new(config.exemptions.iter().cloned()),
            scheduler: ChallengeScheduler::new(&config.challenges, config.seed),
            recovery: RecoveryController::new(),
            phase: PhaseMachine::new(Duration::from_secs(config.grace_period_seconds)),
            history: ChallengeHistory::new(config.history_limit),
            challenge: None,
            media_governed: false,
            paused_at: None,
            started_at: now,
            state: GovernanceState::default(),
            pending_events: Vec::new(),
            ladder,
            config,
        })
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Applies a zone sample.
    ///
    /// # Errors
    ///
    /// Returns the roster rejection; the prior zone is kept.
    pub fn ingest_sample(
        &mut self,
        participant_id: &str,
        zone_id: &str,
        timestamp_ms: u64,
        now: Instant,
    ) -> Result<SampleOutcome, RosterError> {
        self.roster
            .ingest_sample(&self.ladder, participant_id, zone_id, timestamp_ms, now)
    }

    /// Sets whether the current media is governed.
    ///
    /// Turning governance off cancels a pending challenge and disarms the
    /// scheduler; turning it on re-arms every policy from `now`.
    /// Returns whether the flag changed.
    pub fn set_media_governed(&mut self, governed: bool, now: Instant) -> bool {
        if governed == self.media_governed {
            return false;
        }
        self.media_governed = governed;

        if governed {
            self.scheduler.arm_all(now);
            info!("media governed, challenge scheduling armed");
        } else {
            if let Some(challenge) = self.challenge.take() {
                if challenge.status == ChallengeStatus::Pending {
                    self.archive(&challenge, ChallengeOutcome::Cancelled, now);
                }
            }
            self.scheduler.disarm_all();
            info!("media ungoverned, challenge scheduling disarmed");
        }
        true
    }

    /// Sets governance from content labels. Governed when any label matches
    /// a configured governed label, case-insensitively.
    pub fn set_media_labels(&mut self, labels: &[String], now: Instant) -> bool {
        let governed = self.config.is_governed_by(labels);
        self.set_media_governed(governed, now)
    }

    /// Replaces the present set and roster exemptions.
    pub fn set_roster(&mut self, participant_ids: &[String], exempt_ids: &[String]) {
        self.roster.set_roster(participant_ids, exempt_ids);
    }

    /// A participant joined (or rejoined). Returns `true` if new.
    pub fn join(&mut self, participant_id: &str, display_name: Option<String>, exempt: bool) -> bool {
        self.roster.join(participant_id, display_name, exempt)
    }

    /// A participant left.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::UnknownParticipant` if they never joined.
    pub fn leave(&mut self, participant_id: &str) -> Result<bool, RosterError> {
        self.roster.leave(participant_id)
    }

    /// A participant's samples stopped arriving.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::UnknownParticipant` if they never joined.
    pub fn mark_absent(&mut self, participant_id: &str) -> Result<bool, RosterError> {
        self.roster.mark_absent(participant_id)
    }

    /// Pauses the session clock. Returns `false` if already paused.
    pub fn pause(&mut self, now: Instant) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.pause(now);
        }
        self.scheduler.pause(now);
        true
    }

    /// Resumes the session clock. Returns `false` if not paused.
    pub fn resume(&mut self, now: Instant) -> bool {
        if self.paused_at.take().is_none() {
            return false;
        }
        if let Some(challenge) = self.challenge.as_mut() {
            challenge.resume(now);
        }
        self.scheduler.resume(now);
        true
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Runs one evaluation pass and composes the new state.
    ///
    /// # Errors
    ///
    /// Returns `GovernanceError::UnknownZone` if evaluation hits a zone the
    /// ladder does not know. The previously published state is kept.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, GovernanceError> {
        self.expire_stale(now);
        let snapshot = self.roster.snapshot();

        self.run_scheduler(&snapshot, now);
        self.run_evaluation(&snapshot, now)?;

        let requirement_met = self.requirement_met(&snapshot)?;
        if let Some(transition) = self.phase.step(self.media_governed, requirement_met, now) {
            debug!(from = %transition.from, to = %transition.to, "phase transition");
            self.pending_events.push(EngineEvent::PhaseChanged {
                from: transition.from,
                to: transition.to,
            });
        }

        let preview = if self.media_governed && !self.challenge_blocks() {
            self.scheduler.preview(&snapshot, now)
        } else {
            None
        };

        let state = compose(ComposeInputs {
            phase: self.phase.phase(),
            media_governed: self.media_governed,
            paused: self.paused_at.is_some(),
            challenge: self.challenge.as_ref(),
            preview: preview.as_ref(),
            now,
        });

        if state.video_locked != self.state.video_locked {
            self.pending_events.push(EngineEvent::LockChanged {
                locked: state.video_locked,
            });
        }

        let changed = state != self.state;
        self.state = state.clone();

        Ok(TickOutcome {
            state,
            changed,
            events: std::mem::take(&mut self.pending_events),
        })
    }

    fn expire_stale(&mut self, now: Instant) {
        let Some(timeout) = self.config.sample_timeout_seconds else {
            return;
        };
        for participant_id in self
            .roster
            .expire_stale(now, self.started_at, Duration::from_secs(timeout))
        {
            debug!(%participant_id, "participant timed out");
            self.pending_events
                .push(EngineEvent::ParticipantTimedOut { participant_id });
        }
    }

    fn run_scheduler(&mut self, snapshot: &RosterSnapshot, now: Instant) {
        let allowed = self.media_governed
            && self.paused_at.is_none()
            && self.phase.phase() == Phase::Unlocked
            && !self.challenge_blocks();
        if !allowed {
            return;
        }

        match self.scheduler.poll(snapshot, now) {
            SchedulerPoll::Idle => {}
            SchedulerPoll::Skipped { policy_id } => {
                self.pending_events
                    .push(EngineEvent::SchedulingSkipped { policy_id });
            }
            SchedulerPoll::Started(challenge) => {
                info!(
                    challenge_id = %challenge.id,
                    policy_id = %challenge.policy_id,
                    zone_id = %challenge.zone_id,
                    rule = %challenge.rule,
                    required = challenge.required_count,
                    "challenge started"
                );
                self.pending_events.push(EngineEvent::ChallengeStarted {
                    challenge_id: challenge.id.clone(),
                    policy_id: challenge.policy_id.clone(),
                    selection_id: challenge.selection_id.clone(),
                    zone_id: challenge.zone_id.clone(),
                    required_count: challenge.required_count,
                    time_allowed_seconds: challenge.time_limit.as_secs(),
                });
                self.challenge = Some(challenge);
            }
        }
    }

    fn run_evaluation(&mut self, snapshot: &RosterSnapshot, now: Instant) -> Result<(), GovernanceError> {
        let Some(mut challenge) = self.challenge.take() else {
            return Ok(());
        };

        let summary = match self.evaluator.evaluate_challenge(&challenge, snapshot) {
            Ok(summary) => summary,
            Err(e) => {
                self.challenge = Some(challenge);
                return Err(e);
            }
        };

        challenge.settle(summary.satisfied, now);
        let recovered = self.recovery.try_recover(&mut challenge, &summary);
        challenge.summary = Some(summary);

        if challenge.status.is_terminal() && !challenge.history_recorded {
            let outcome = if challenge.status == ChallengeStatus::Success {
                ChallengeOutcome::Success
            } else {
                ChallengeOutcome::Failed
            };
            self.archive(&challenge, outcome, now);
            challenge.history_recorded = true;
            self.scheduler.rearm(&challenge.policy_id, now);
        }

        if recovered {
            if !self.history.mark_recovered(&challenge.id) {
                warn!(challenge_id = %challenge.id, "recovered challenge no longer in history");
            }
            self.pending_events.push(EngineEvent::ChallengeRecovered {
                challenge_id: challenge.id.clone(),
                policy_id: challenge.policy_id.clone(),
            });
        }

        self.challenge = Some(challenge);
        Ok(())
    }

    fn requirement_met(&self, snapshot: &RosterSnapshot) -> Result<bool, GovernanceError> {
        if snapshot.active_participants.is_empty() {
            return Ok(false);
        }
        match &self.config.base_requirement {
            Some(base) => Ok(self
                .evaluator
                .evaluate(&base.zone_id, base.rule, snapshot)?
                .satisfied),
            None => Ok(true),
        }
    }

    /// A pending or failed challenge blocks scheduling and previews.
    fn challenge_blocks(&self) -> bool {
        self.challenge
            .as_ref()
            .is_some_and(|c| c.status != ChallengeStatus::Success)
    }

    fn archive(&mut self, challenge: &ActiveChallenge, outcome: ChallengeOutcome, now: Instant) {
        let (actual_count, required_count) = challenge
            .summary
            .as_ref()
            .map_or((0, challenge.required_count), |s| {
                (s.actual_count, s.required_count)
            });
        let elapsed = now.saturating_duration_since(challenge.started_at);

        info!(
            challenge_id = %challenge.id,
            policy_id = %challenge.policy_id,
            outcome = outcome.as_str(),
            actual = actual_count,
            required = required_count,
            "challenge resolved"
        );

        self.history.record(HistoryEntry {
            challenge_id: challenge.id.clone(),
            policy_id: challenge.policy_id.clone(),
            selection_id: challenge.selection_id.clone(),
            zone_id: challenge.zone_id.clone(),
            outcome,
            recovered: false,
            required_count,
            actual_count,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            recorded_at: Utc::now(),
        });
        self.pending_events.push(EngineEvent::ChallengeResolved {
            challenge_id: challenge.id.clone(),
            policy_id: challenge.policy_id.clone(),
            outcome,
            actual_count,
            required_count,
        });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Last composed state.
    #[must_use]
    pub const fn state(&self) -> &GovernanceState {
        &self.state
    }

    /// Current or most recent challenge.
    #[must_use]
    pub const fn active_challenge(&self) -> Option<&ActiveChallenge> {
        self.challenge.as_ref()
    }

    /// Archive of finished challenges.
    #[must_use]
    pub const fn history(&self) -> &ChallengeHistory {
        &self.history
    }

    /// Roster and zone tracker.
    #[must_use]
    pub const fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Zone ladder.
    #[must_use]
    pub fn ladder(&self) -> &ZoneLadder {
        &self.ladder
    }

    /// Session configuration.
    #[must_use]
    pub const fn config(&self) -> &Arc<GovernanceConfig> {
        &self.config
    }

    /// Challenge scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &ChallengeScheduler {
        &self.scheduler
    }

    /// Current media governed flag.
    #[must_use]
    pub const fn media_governed(&self) -> bool {
        self.media_governed
    }

    /// Whether the session clock is paused.
    #[must_use]
    pub const fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }
}
