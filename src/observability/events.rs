//! Structured event stream.
//!
//! Discrete, typed governance events serialized as JSONL. Every line carries
//! a sequence number that increases across all sessions sharing an emitter.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::governance::{ChallengeOutcome, EngineEvent, Phase};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The command source closed (EOF on stdin, handle dropped).
    EndOfInput,
    /// The session was cancelled (shutdown, registry removal, signal).
    Cancelled,
}

/// A discrete event emitted by a governance session.
///
/// Serialized with a `"type"` tag so consumers can dispatch on the kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A session was configured and its loop started.
    SessionStarted {
        /// When the session started.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Number of zones on the ladder.
        zones: usize,
        /// Number of challenge policies.
        policies: usize,
    },

    /// A session loop exited.
    SessionStopped {
        /// When the session stopped.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Why it stopped.
        reason: StopReason,
        /// Ticks executed over the session lifetime.
        ticks: u64,
    },

    /// The phase gate moved.
    PhaseChanged {
        /// When the transition occurred.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Previous phase.
        from: Phase,
        /// New phase.
        to: Phase,
    },

    /// The playback lock flipped.
    LockChanged {
        /// When the lock changed.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// New lock flag.
        locked: bool,
    },

    /// A challenge started.
    ChallengeStarted {
        /// When the challenge started.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Challenge id.
        challenge_id: String,
        /// Policy id.
        policy_id: String,
        /// Selection id.
        selection_id: String,
        /// Target zone.
        zone_id: String,
        /// Required count at creation.
        required_count: usize,
        /// Seconds allowed.
        time_allowed_seconds: u64,
    },

    /// A challenge was archived with an outcome.
    ChallengeResolved {
        /// When it resolved.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Challenge id.
        challenge_id: String,
        /// Policy id.
        policy_id: String,
        /// Outcome.
        outcome: ChallengeOutcome,
        /// Participants in zone.
        actual_count: usize,
        /// Live required count.
        required_count: usize,
    },

    /// A failed challenge was recovered.
    ChallengeRecovered {
        /// When it recovered.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Challenge id.
        challenge_id: String,
        /// Policy id.
        policy_id: String,
    },

    /// A zone sample was rejected.
    SampleRejected {
        /// When it was rejected.
        timestamp: DateTime<Utc>,
        /// Session id.
        session_id: String,
        /// Participant the sample was for.
        participant_id: String,
        /// Zone the sample carried.
        zone_id: String,
        /// Machine-readable reason (`invalid_zone`, `unknown_participant`).
        reason: String,
    },
}

impl Event {
    /// Maps an engine event to a stream event.
    ///
    /// Returns `None` for engine events that are only logged.
    #[must_use]
    pub fn from_engine(session_id: &str, event: &EngineEvent) -> Option<Self> {
        let timestamp = Utc::now();
        let session_id = session_id.to_string();

        let mapped = match event {
            EngineEvent::ChallengeStarted {
                challenge_id,
                policy_id,
                selection_id,
                zone_id,
                required_count,
                time_allowed_seconds,
            } => Self::ChallengeStarted {
                timestamp,
                session_id,
                challenge_id: challenge_id.clone(),
                policy_id: policy_id.clone(),
                selection_id: selection_id.clone(),
                zone_id: zone_id.clone(),
                required_count: *required_count,
                time_allowed_seconds: *time_allowed_seconds,
            },
            EngineEvent::ChallengeResolved {
                challenge_id,
                policy_id,
                outcome,
                actual_count,
                required_count,
            } => Self::ChallengeResolved {
                timestamp,
                session_id,
                challenge_id: challenge_id.clone(),
                policy_id: policy_id.clone(),
                outcome: *outcome,
                actual_count: *actual_count,
                required_count: *required_count,
            },
            EngineEvent::ChallengeRecovered {
                challenge_id,
                policy_id,
            } => Self::ChallengeRecovered {
                timestamp,
                session_id,
                challenge_id: challenge_id.clone(),
                policy_id: policy_id.clone(),
            },
            EngineEvent::PhaseChanged { from, to } => Self::PhaseChanged {
                timestamp,
                session_id,
                from: *from,
                to: *to,
            },
            EngineEvent::LockChanged { locked } => Self::LockChanged {
                timestamp,
                session_id,
                locked: *locked,
            },
            EngineEvent::SchedulingSkipped { .. } | EngineEvent::ParticipantTimedOut { .. } => {
                return None;
            }
        };
        Some(mapped)
    }
}

/// Adds the sequence number next to the flattened event fields.
#[derive(Debug, Serialize)]
struct Sequenced<'a> {
    sequence: u64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization and I/O failures are dropped: the event stream must never
/// take a governance session down with it.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter over any writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Emitter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Emitter that writes to a new file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Writes one event as a JSON line and flushes.
    pub fn emit(&self, event: &Event) {
        let Ok(mut writer) = self.writer.lock() else {
            return;
        };
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        if let Ok(line) = serde_json::to_string(&Sequenced { sequence, event }) {
            let _ = writeln!(writer, "{line}");
            let _ = writer.flush();
        }
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}
