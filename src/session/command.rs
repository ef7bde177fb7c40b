//! Inbound session commands.
//!
//! The wire form is one JSON object per command, tagged by `"type"`:
//!
//! ```json
//! {"type":"ingest_sample","participant_id":"A","zone_id":"hot","timestamp_ms":1200}
//! {"type":"set_roster","participant_ids":["A","B","C"],"exempt_ids":["C"]}
//! {"type":"pause_session"}
//! ```

use serde::{Deserialize, Serialize};

/// A command for one governance session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum SessionCommand {
    /// A zone classification for one participant.
    IngestSample {
        /// Participant id
        participant_id: String,
        /// Zone id from the ladder
        zone_id: String,
        /// Sensor timestamp, used for ordering
        timestamp_ms: u64,
    },

    /// Sets whether the current media is governed.
    SetMediaGoverned {
        /// Governed flag
        governed: bool,
    },

    /// Derives the governed flag from content labels.
    SetMediaLabels {
        /// Content labels of the current media
        labels: Vec<String>,
    },

    /// Replaces the present roster.
    SetRoster {
        /// Present participants
        participant_ids: Vec<String>,
        /// Exempt participants
        #[serde(default)]
        exempt_ids: Vec<String>,
    },

    /// A participant joined.
    Join {
        /// Participant id
        participant_id: String,
        /// Display name
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        /// Exempt from requirements
        #[serde(default)]
        exempt: bool,
    },

    /// A participant left; their record is kept.
    Leave {
        /// Participant id
        participant_id: String,
    },

    /// A participant's samples stopped.
    MarkAbsent {
        /// Participant id
        participant_id: String,
    },

    /// Session media paused; challenge clocks freeze.
    PauseSession,

    /// Session media resumed.
    ResumeSession,
}

impl SessionCommand {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::IngestSample { .. } => "ingest_sample",
            Self::SetMediaGoverned { .. } => "set_media_governed",
            Self::SetMediaLabels { .. } => "set_media_labels",
            Self::SetRoster { .. } => "set_roster",
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::MarkAbsent { .. } => "mark_absent",
            Self::PauseSession => "pause_session",
            Self::ResumeSession => "resume_session",
        }
    }

    /// Returns `true` for zone samples.
    #[must_use]
    pub const fn is_sample(&self) -> bool {
        matches!(self, Self::IngestSample { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sample() {
        let cmd: SessionCommand = serde_json::from_str(
            r#"{"type":"ingest_sample","participant_id":"A","zone_id":"hot","timestamp_ms":5}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            SessionCommand::IngestSample {
                participant_id: "A".to_string(),
                zone_id: "hot".to_string(),
                timestamp_ms: 5,
            }
        );
        assert!(cmd.is_sample());
    }

    #[test]
    fn parses_unit_and_defaulted_variants() {
        let pause: SessionCommand = serde_json::from_str(r#"{"type":"pause_session"}"#).unwrap();
        assert_eq!(pause, SessionCommand::PauseSession);
        assert_eq!(pause.kind(), "pause_session");

        let join: SessionCommand =
            serde_json::from_str(r#"{"type":"join","participant_id":"D"}"#).unwrap();
        assert_eq!(
            join,
            SessionCommand::Join {
                participant_id: "D".to_string(),
                display_name: None,
                exempt: false,
            }
        );

        let roster: SessionCommand =
            serde_json::from_str(r#"{"type":"set_roster","participant_ids":["A"]}"#).unwrap();
        assert!(matches!(roster, SessionCommand::SetRoster { ref exempt_ids, .. } if exempt_ids.is_empty()));
    }

    #[test]
    fn rejects_unknown_type_and_fields() {
        assert!(serde_json::from_str::<SessionCommand>(r#"{"type":"explode"}"#).is_err());
        assert!(
            serde_json::from_str::<SessionCommand>(
                r#"{"type":"leave","participant_id":"A","extra":1}"#
            )
            .is_err()
        );
    }

    #[test]
    fn serializes_with_tag() {
        let json = serde_json::to_value(SessionCommand::SetMediaGoverned { governed: true }).unwrap();
        assert_eq!(json["type"], "set_media_governed");
        assert_eq!(json["governed"], true);
    }
}
