//! Roster and zone tracker
//!
//! Pure state container: latest zone and presence per participant. Holds no
//! policy; the evaluator and phase machine read it through [`RosterSnapshot`].
//!
//! Participants are never removed mid-session, only marked absent, so a
//! returning participant keeps their identity and exemption.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::time::Instant;

use crate::error::RosterError;
use crate::governance::zone::ZoneLadder;

/// One tracked participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Stable participant id
    pub id: String,
    /// Display name (defaults to the id)
    pub display_name: String,
    /// Latest known zone, `None` until the first accepted sample
    pub zone_id: Option<String>,
    /// Samples are currently arriving
    pub present: bool,
    /// Exempt via roster update (config exemptions are tracked separately)
    pub exempt: bool,
    /// Sensor timestamp of the last applied sample
    pub last_sample_ms: Option<u64>,
    /// Engine instant of the last applied sample
    pub last_seen: Option<Instant>,
}

impl Participant {
    fn new(id: &str, display_name: Option<String>, exempt: bool) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.unwrap_or_else(|| id.to_string()),
            zone_id: None,
            present: true,
            exempt,
            last_sample_ms: None,
            last_seen: None,
        }
    }
}

/// Result of an accepted sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The sample updated the participant's zone.
    Applied,
    /// The sample was older than the last applied one and was dropped.
    Stale,
}

impl SampleOutcome {
    /// Metrics label for a sample that did not update the roster.
    #[must_use]
    pub const fn drop_reason(self) -> Option<&'static str> {
        match self {
            Self::Applied => None,
            Self::Stale => Some("stale"),
        }
    }
}

/// Read-only view of the roster for one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterSnapshot {
    /// Present participants, in roster order
    pub active_participants: Vec<String>,
    /// Latest zone of each present participant that has one
    pub zone_of: HashMap<String, String>,
    /// Exempt participants (roster and config exemptions combined)
    pub exempt: HashSet<String>,
    /// Every participant ever seen this session, present or not
    pub total_count: usize,
}

impl RosterSnapshot {
    /// Returns `true` if `participant_id` is exempt.
    #[must_use]
    pub fn is_exempt(&self, participant_id: &str) -> bool {
        self.exempt.contains(participant_id)
    }

    /// Present, non-exempt participants in roster order.
    pub fn eligible(&self) -> impl Iterator<Item = &str> {
        self.active_participants
            .iter()
            .map(String::as_str)
            .filter(|id| !self.is_exempt(id))
    }

    /// Number of present, non-exempt participants.
    #[must_use]
    pub fn eligible_count(&self) -> usize {
        self.eligible().count()
    }
}

/// Latest zone and presence for every participant in a session.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    participants: IndexMap<String, Participant>,
    config_exemptions: HashSet<String>,
}

impl Roster {
    /// Creates an empty roster with the session's configured exemptions.
    #[must_use]
    pub fn new<I, S>(config_exemptions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            participants: IndexMap::new(),
            config_exemptions: config_exemptions.into_iter().map(Into::into).collect(),
        }
    }

    /// Applies one zone sample.
    ///
    /// Samples older than the last applied one are dropped. Equal timestamps
    /// re-apply, so duplicates are idempotent and the last write wins.
    ///
    /// # Errors
    ///
    /// - `RosterError::InvalidZone` if the zone is not on the ladder
    /// - `RosterError::UnknownParticipant` if the participant never joined
    ///
    /// On error the participant's prior zone is kept.
    pub fn ingest_sample(
        &mut self,
        ladder: &ZoneLadder,
        participant_id: &str,
        zone_id: &str,
        timestamp_ms: u64,
        now: Instant,
    ) -> Result<SampleOutcome, RosterError> {
        if !ladder.contains(zone_id) {
            return Err(RosterError::InvalidZone {
                participant_id: participant_id.to_string(),
                zone_id: zone_id.to_string(),
            });
        }

        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| RosterError::UnknownParticipant(participant_id.to_string()))?;

        if participant
            .last_sample_ms
            .is_some_and(|last| timestamp_ms < last)
        {
            return Ok(SampleOutcome::Stale);
        }

        participant.zone_id = Some(zone_id.to_string());
        participant.last_sample_ms = Some(timestamp_ms);
        participant.last_seen = Some(now);
        participant.present = true;
        Ok(SampleOutcome::Applied)
    }

    /// Marks a participant absent (dropout or timeout).
    ///
    /// Returns whether presence changed.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::UnknownParticipant` if the participant never joined.
    pub fn mark_absent(&mut self, participant_id: &str) -> Result<bool, RosterError> {
        let participant = self
            .participants
            .get_mut(participant_id)
            .ok_or_else(|| RosterError::UnknownParticipant(participant_id.to_string()))?;
        let changed = participant.present;
        participant.present = false;
        Ok(changed)
    }

    /// Replaces the present set.
    ///
    /// Listed participants are added or marked present; everyone else is
    /// marked absent. Exemption flags are reset to `exempt_ids`.
    pub fn set_roster(&mut self, participant_ids: &[String], exempt_ids: &[String]) {
        let listed: HashSet<&str> = participant_ids.iter().map(String::as_str).collect();
        let exempt: HashSet<&str> = exempt_ids.iter().map(String::as_str).collect();

        for participant in self.participants.values_mut() {
            participant.present = listed.contains(participant.id.as_str());
            participant.exempt = exempt.contains(participant.id.as_str());
        }

        for id in participant_ids {
            if !self.participants.contains_key(id) {
                let participant = Participant::new(id, None, exempt.contains(id.as_str()));
                self.participants.insert(id.clone(), participant);
            }
        }
    }

    /// Adds a participant, or marks a known one present again.
    ///
    /// Returns `true` if the participant is new to the session.
    pub fn join(&mut self, participant_id: &str, display_name: Option<String>, exempt: bool) -> bool {
        if let Some(existing) = self.participants.get_mut(participant_id) {
            existing.present = true;
            existing.exempt = exempt;
            if let Some(name) = display_name {
                existing.display_name = name;
            }
            return false;
        }

        self.participants.insert(
            participant_id.to_string(),
            Participant::new(participant_id, display_name, exempt),
        );
        true
    }

    /// A participant left the session. The record is kept, marked absent.
    ///
    /// # Errors
    ///
    /// Returns `RosterError::UnknownParticipant` if the participant never joined.
    pub fn leave(&mut self, participant_id: &str) -> Result<bool, RosterError> {
        self.mark_absent(participant_id)
    }

    /// Marks present participants absent when their last sample is older
    /// than `timeout`. Participants that never sent a sample are measured
    /// from `since`, usually the session start.
    ///
    /// Returns the ids that were marked absent.
    pub fn expire_stale(&mut self, now: Instant, since: Instant, timeout: Duration) -> Vec<String> {
        self.participants
            .values_mut()
            .filter(|p| p.present)
            .filter(|p| now.saturating_duration_since(p.last_seen.unwrap_or(since)) >= timeout)
            .map(|p| {
                p.present = false;
                p.id.clone()
            })
            .collect()
    }

    /// Returns `true` if the participant is exempt by roster flag or config.
    #[must_use]
    pub fn is_exempt(&self, participant_id: &str) -> bool {
        self.config_exemptions.contains(participant_id)
            || self
                .participants
                .get(participant_id)
                .is_some_and(|p| p.exempt)
    }

    /// Looks up a participant.
    #[must_use]
    pub fn get(&self, participant_id: &str) -> Option<&Participant> {
        self.participants.get(participant_id)
    }

    /// Iterates participants in roster order.
    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Number of present participants.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.participants.values().filter(|p| p.present).count()
    }

    /// Takes a read-only snapshot for this tick.
    #[must_use]
    pub fn snapshot(&self) -> RosterSnapshot {
        let mut snapshot = RosterSnapshot {
            total_count: self.participants.len(),
            ..RosterSnapshot::default()
        };

        for participant in self.participants.values() {
            if self.is_exempt(&participant.id) {
                snapshot.exempt.insert(participant.id.clone());
            }
            if !participant.present {
                continue;
            }
            snapshot.active_participants.push(participant.id.clone());
            if let Some(zone) = &participant.zone_id {
                snapshot.zone_of.insert(participant.id.clone(), zone.clone());
            }
        }

        snapshot
    }
}
