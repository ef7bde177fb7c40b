//! Session runtime
//!
//! One governance session is one sequential loop on a tokio task. The loop
//! owns the [`GovernanceEngine`] and every deadline; it is driven by a fixed
//! tick interval and by commands arriving on a bounded channel. State is
//! published through a `watch` channel, latest value wins.
//!
//! ```text
//! SessionHandle ──mpsc──▶ loop ──watch──▶ subscribers
//!                          │
//!                          ├─ interval.tick() → engine.tick()
//!                          └─ cancel          → stop
//! ```

pub mod command;
pub mod registry;

pub use command::SessionCommand;
pub use registry::SessionRegistry;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::schema::GovernanceConfig;
use crate::error::{ConfigError, RosterError, SessionError};
use crate::governance::{EngineEvent, GovernanceEngine, GovernanceState, HistoryEntry};
use crate::observability::events::{Event, EventEmitter, StopReason};
use crate::observability::metrics;

/// What a session leaves behind when its loop exits.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    /// Session id
    pub session_id: String,
    /// Ticks executed
    pub ticks: u64,
    /// Why the loop stopped
    pub reason: StopReason,
    /// Archived challenges, oldest first
    pub history: Vec<HistoryEntry>,
    /// Last published state
    pub final_state: GovernanceState,
}

/// A configured session that has not started yet.
#[derive(Debug)]
pub struct Session {
    id: String,
    engine: GovernanceEngine,
    emitter: Arc<EventEmitter>,
    cancel: CancellationToken,
    tick_interval: Duration,
    command_buffer: usize,
    tick_on_sample: bool,
    ticks: u64,
}

impl Session {
    /// Configures a session.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MisconfiguredChallenge` if the configuration
    /// references a zone missing from the ladder.
    pub fn new(
        id: impl Into<String>,
        config: Arc<GovernanceConfig>,
        emitter: Arc<EventEmitter>,
    ) -> Result<Self, ConfigError> {
        let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
        let command_buffer = config.command_buffer.max(1);
        let tick_on_sample = config.tick_on_sample;
        let engine = GovernanceEngine::new(config, Instant::now())?;

        Ok(Self {
            id: id.into(),
            engine,
            emitter,
            cancel: CancellationToken::new(),
            tick_interval,
            command_buffer,
            tick_on_sample,
            ticks: 0,
        })
    }

    /// Uses `cancel` to stop the loop instead of a private token.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Starts the loop on the current runtime.
    pub fn spawn(self) -> (SessionHandle, JoinHandle<SessionSummary>) {
        let (command_tx, command_rx) = mpsc::channel(self.command_buffer);
        let (state_tx, state_rx) = watch::channel(self.engine.state().clone());

        let handle = SessionHandle {
            id: Arc::from(self.id.as_str()),
            commands: command_tx,
            state: state_rx,
            cancel: self.cancel.clone(),
        };

        let span = tracing::info_span!("session", session_id = %self.id);
        let task = tokio::spawn(self.run(command_rx, state_tx).instrument(span));
        (handle, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        state_tx: watch::Sender<GovernanceState>,
    ) -> SessionSummary {
        let config = Arc::clone(self.engine.config());
        self.emitter.emit(&Event::SessionStarted {
            timestamp: Utc::now(),
            session_id: self.id.clone(),
            zones: config.zone_ladder.len(),
            policies: config.challenges.len(),
        });
        info!(
            zones = config.zone_ladder.len(),
            policies = config.challenges.len(),
            tick_ms = u64::try_from(self.tick_interval.as_millis()).unwrap_or(u64::MAX),
            "session started"
        );

        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!("session cancelled");
                    break StopReason::Cancelled;
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        debug!("command channel closed");
                        break StopReason::EndOfInput;
                    };
                    if self.apply(command) {
                        self.tick(&state_tx);
                    }
                }
                _ = interval.tick() => self.tick(&state_tx),
            }
        };

        self.emitter.emit(&Event::SessionStopped {
            timestamp: Utc::now(),
            session_id: self.id.clone(),
            reason,
            ticks: self.ticks,
        });
        info!(ticks = self.ticks, reason = ?reason, "session stopped");

        SessionSummary {
            session_id: self.id,
            ticks: self.ticks,
            reason,
            history: self.engine.history().iter().cloned().collect(),
            final_state: self.engine.state().clone(),
        }
    }

    /// Applies one command. Returns whether an immediate tick is due.
    fn apply(&mut self, command: SessionCommand) -> bool {
        let now = Instant::now();
        debug!(kind = command.kind(), "command");

        match command {
            SessionCommand::IngestSample {
                participant_id,
                zone_id,
                timestamp_ms,
            } => match self
                .engine
                .ingest_sample(&participant_id, &zone_id, timestamp_ms, now)
            {
                Ok(outcome) => match outcome.drop_reason() {
                    None => {
                        metrics::record_sample_accepted();
                        self.tick_on_sample
                    }
                    Some(reason) => {
                        metrics::record_sample_rejected(reason);
                        debug!(%participant_id, timestamp_ms, reason, "sample dropped");
                        false
                    }
                },
                Err(err) => {
                    self.reject_sample(&zone_id, &err);
                    false
                }
            },
            SessionCommand::SetMediaGoverned { governed } => {
                self.engine.set_media_governed(governed, now)
            }
            SessionCommand::SetMediaLabels { labels } => {
                self.engine.set_media_labels(&labels, now)
            }
            SessionCommand::SetRoster {
                participant_ids,
                exempt_ids,
            } => {
                self.engine.set_roster(&participant_ids, &exempt_ids);
                true
            }
            SessionCommand::Join {
                participant_id,
                display_name,
                exempt,
            } => {
                if self.engine.join(&participant_id, display_name, exempt) {
                    info!(%participant_id, exempt, "participant joined");
                }
                true
            }
            SessionCommand::Leave { participant_id } => self
                .engine
                .leave(&participant_id)
                .unwrap_or_else(|err| {
                    warn!(error = %err, "leave ignored");
                    false
                }),
            SessionCommand::MarkAbsent { participant_id } => self
                .engine
                .mark_absent(&participant_id)
                .unwrap_or_else(|err| {
                    warn!(error = %err, "mark_absent ignored");
                    false
                }),
            SessionCommand::PauseSession => self.engine.pause(now),
            SessionCommand::ResumeSession => self.engine.resume(now),
        }
    }

    fn reject_sample(&self, zone_id: &str, err: &RosterError) {
        let participant_id = match err {
            RosterError::InvalidZone { participant_id, .. }
            | RosterError::UnknownParticipant(participant_id) => participant_id.clone(),
        };
        warn!(error = %err, "sample rejected, prior zone kept");
        metrics::record_sample_rejected(err.reason());
        self.emitter.emit(&Event::SampleRejected {
            timestamp: Utc::now(),
            session_id: self.id.clone(),
            participant_id,
            zone_id: zone_id.to_string(),
            reason: err.reason().to_string(),
        });
    }

    /// Runs one engine tick and publishes the result. A failed tick keeps
    /// the previously published state.
    fn tick(&mut self, state_tx: &watch::Sender<GovernanceState>) {
        self.ticks += 1;
        let outcome = match self.engine.tick(Instant::now()) {
            Ok(outcome) => outcome,
            Err(err) => {
                metrics::record_tick_error();
                error!(error = %err, "tick failed, keeping previous state");
                return;
            }
        };

        metrics::record_tick();
        metrics::set_active_participants(self.engine.roster().active_count());
        for event in &outcome.events {
            self.observe(event);
        }

        let state = outcome.state;
        state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn observe(&self, event: &EngineEvent) {
        match event {
            EngineEvent::ChallengeStarted { policy_id, .. } => {
                metrics::record_challenge_started(policy_id);
            }
            EngineEvent::ChallengeResolved { outcome, .. } => {
                metrics::record_challenge_resolved(outcome.as_str());
            }
            EngineEvent::ChallengeRecovered { .. } => metrics::record_challenge_recovered(),
            EngineEvent::PhaseChanged { from, to } => metrics::record_phase_transition(*from, *to),
            EngineEvent::LockChanged { locked } => {
                metrics::set_video_locked(*locked);
                info!(locked, "video lock changed");
            }
            EngineEvent::SchedulingSkipped { policy_id } => {
                debug!(%policy_id, "no participants present, challenge deferred");
            }
            EngineEvent::ParticipantTimedOut { participant_id } => {
                info!(%participant_id, "participant timed out");
            }
        }

        if let Some(stream_event) = Event::from_engine(&self.id, event) {
            self.emitter.emit(&stream_event);
        }
    }
}

/// Cloneable handle to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Arc<str>,
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<GovernanceState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Submits a zone sample without waiting.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Backpressure` if the command buffer is full
    /// (the sample is dropped) or `SessionError::Closed` if the loop stopped.
    pub fn ingest_sample(
        &self,
        participant_id: impl Into<String>,
        zone_id: impl Into<String>,
        timestamp_ms: u64,
    ) -> Result<(), SessionError> {
        self.try_send(SessionCommand::IngestSample {
            participant_id: participant_id.into(),
            zone_id: zone_id.into(),
            timestamp_ms,
        })
    }

    fn try_send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands.try_send(command).map_err(|err| match err {
            mpsc::error::TrySendError::Full(dropped) => {
                warn!(session_id = %self.id, kind = dropped.kind(), "command buffer full, dropping");
                SessionError::Backpressure(self.id.to_string())
            }
            mpsc::error::TrySendError::Closed(_) => SessionError::Closed(self.id.to_string()),
        })
    }

    /// Sends a command, waiting for buffer space.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed(self.id.to_string()))
    }

    /// Routes a command the way its kind requires: samples never wait for
    /// buffer space, everything else does.
    ///
    /// # Errors
    ///
    /// Same as [`SessionHandle::ingest_sample`] and [`SessionHandle::send`].
    pub async fn submit(&self, command: SessionCommand) -> Result<(), SessionError> {
        if command.is_sample() {
            self.try_send(command)
        } else {
            self.send(command).await
        }
    }

    /// Marks the current media governed or not.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn set_media_governed(&self, governed: bool) -> Result<(), SessionError> {
        self.send(SessionCommand::SetMediaGoverned { governed }).await
    }

    /// Derives the governed flag from content labels.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn set_media_labels(&self, labels: Vec<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::SetMediaLabels { labels }).await
    }

    /// Replaces the present roster.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn set_roster(
        &self,
        participant_ids: Vec<String>,
        exempt_ids: Vec<String>,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::SetRoster {
            participant_ids,
            exempt_ids,
        })
        .await
    }

    /// A participant joined.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn join(
        &self,
        participant_id: impl Into<String>,
        display_name: Option<String>,
        exempt: bool,
    ) -> Result<(), SessionError> {
        self.send(SessionCommand::Join {
            participant_id: participant_id.into(),
            display_name,
            exempt,
        })
        .await
    }

    /// A participant left.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn leave(&self, participant_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::Leave {
            participant_id: participant_id.into(),
        })
        .await
    }

    /// A participant's samples stopped.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn mark_absent(&self, participant_id: impl Into<String>) -> Result<(), SessionError> {
        self.send(SessionCommand::MarkAbsent {
            participant_id: participant_id.into(),
        })
        .await
    }

    /// Pauses the session clock.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn pause(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::PauseSession).await
    }

    /// Resumes the session clock.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Closed` if the loop stopped.
    pub async fn resume(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::ResumeSession).await
    }

    /// New receiver for published states.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<GovernanceState> {
        self.state.clone()
    }

    /// Latest published state.
    #[must_use]
    pub fn state(&self) -> GovernanceState {
        self.state.borrow().clone()
    }

    /// Stops the loop.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether the loop has stopped accepting commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{ChallengePolicy, ChallengeSelection, RequiredRule, ZoneDefinition};
    use crate::governance::Phase;

    fn ladder() -> Vec<ZoneDefinition> {
        [("cool", 0), ("warm", 1), ("hot", 2)]
            .into_iter()
            .map(|(id, rank)| ZoneDefinition {
                id: id.to_string(),
                name: id.to_uppercase(),
                rank,
            })
            .collect()
    }

    fn config() -> Arc<GovernanceConfig> {
        let mut config = GovernanceConfig::with_ladder(ladder());
        config.grace_period_seconds = 5;
        config.tick_interval_ms = 100;
        config.seed = Some(7);
        config.challenges = vec![ChallengePolicy {
            id: "main".to_string(),
            selections: vec![ChallengeSelection {
                id: "all-hot".to_string(),
                zone_id: "hot".to_string(),
                rule: RequiredRule::All,
                time_allowed_seconds: 30,
            }],
            interval_range_seconds: [10, 10],
            selection_order: crate::config::schema::SelectionOrder::Sequential,
        }];
        Arc::new(config)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_initial_state_and_stops_on_shutdown() {
        let session = Session::new("s1", config(), Arc::new(EventEmitter::noop())).unwrap();
        let (handle, task) = session.spawn();
        settle().await;

        let state = handle.state();
        assert_eq!(state.phase, Phase::Unlocked);
        assert!(!state.video_locked);
        assert!(!state.media_governed);

        handle.shutdown();
        let summary = task.await.unwrap();
        assert_eq!(summary.reason, StopReason::Cancelled);
        assert!(summary.ticks >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_ends_input() {
        let session = Session::new("s2", config(), Arc::new(EventEmitter::noop())).unwrap();
        let (handle, task) = session.spawn();
        drop(handle);
        let summary = task.await.unwrap();
        assert_eq!(summary.reason, StopReason::EndOfInput);
    }

    #[tokio::test(start_paused = true)]
    async fn commands_update_published_state() {
        let session = Session::new("s3", config(), Arc::new(EventEmitter::noop())).unwrap();
        let (handle, task) = session.spawn();

        handle
            .set_roster(vec!["A".to_string(), "B".to_string()], vec![])
            .await
            .unwrap();
        handle.set_media_governed(true).await.unwrap();
        handle.ingest_sample("A", "hot", 1).unwrap();
        handle.ingest_sample("B", "cool", 1).unwrap();
        settle().await;

        let state = handle.state();
        assert!(state.media_governed);
        assert!(state.next_challenge_preview.is_some());

        handle.pause().await.unwrap();
        settle().await;
        assert!(handle.state().paused);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closed_session_rejects_commands() {
        let session = Session::new("s4", config(), Arc::new(EventEmitter::noop())).unwrap();
        let (handle, task) = session.spawn();
        handle.shutdown();
        task.await.unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.ingest_sample("A", "hot", 1),
            Err(SessionError::Closed(_))
        ));
        assert!(matches!(handle.pause().await, Err(SessionError::Closed(_))));
    }

    #[test]
    fn misconfigured_zone_refused() {
        let mut config = (*config()).clone();
        config.challenges[0].selections[0].zone_id = "hott".to_string();
        let result = Session::new("bad", Arc::new(config), Arc::new(EventEmitter::noop()));
        assert!(matches!(
            result,
            Err(ConfigError::MisconfiguredChallenge { .. })
        ));
    }
}
