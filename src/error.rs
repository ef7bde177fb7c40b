//! Error types for `zonegate`
//!
//! One `thiserror` enum per domain, aggregated by [`ZoneGateError`] which
//! also maps every failure to a process exit code.

use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Exit Codes
// ============================================================================

/// Process exit codes of the `zonegate` binary.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Config could not be loaded or failed validation
    pub const CONFIG_ERROR: i32 = 2;

    /// Reading stdin or writing stdout/events failed
    pub const IO_ERROR: i32 = 3;

    /// Session runtime error (channel closed, task failure)
    pub const SESSION_ERROR: i32 = 4;

    /// Governance engine error (unknown zone during evaluation)
    pub const GOVERNANCE_ERROR: i32 = 5;

    /// Bad command-line arguments
    pub const USAGE_ERROR: i32 = 64;

    /// Second SIGINT while shutting down
    pub const INTERRUPTED: i32 = 130;

    /// Second SIGTERM while shutting down
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `zonegate` operations.
#[derive(Debug, Error)]
pub enum ZoneGateError {
    /// Config rejected
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Roster update rejected
    #[error(transparent)]
    Roster(#[from] RosterError),

    /// Governance evaluation error
    #[error(transparent)]
    Governance(#[from] GovernanceError),

    /// Session runtime error
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Stream I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// State or event serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raw YAML error outside the loader
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ZoneGateError {
    /// Exit code the binary terminates with for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Json(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Session(_) => ExitCode::SESSION_ERROR,
            Self::Governance(_) => ExitCode::GOVERNANCE_ERROR,
            Self::Roster(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Errors raised while loading a governance config.
///
/// All of these are fatal at session configure time: a session never starts
/// with a configuration that failed to load.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Config file
        path: PathBuf,
        /// 1-based line, when the parser reports one
        line: Option<usize>,
        /// Parser message
        message: String,
    },

    /// One or more validation errors
    #[error("validation failed for {path}: {}", summarize_issues(.errors))]
    ValidationError {
        /// Config file, as given on the command line
        path: String,
        /// Every error-severity issue
        errors: Vec<ValidationIssue>,
    },

    /// A challenge selection or requirement references a zone missing from the ladder
    #[error("misconfigured challenge at {location}: unknown zone '{zone_id}'{}", suggestion_suffix(.suggestion.as_deref()))]
    MisconfiguredChallenge {
        /// Location in the configuration (e.g., "challenges[0].selections[1].zone_id")
        location: String,
        /// The unknown zone id
        zone_id: String,
        /// Closest known zone id, if any is near enough
        suggestion: Option<String>,
    },

    /// Config path does not exist
    #[error("file not found: {path}")]
    MissingFile {
        /// Path as given
        path: PathBuf,
    },

    /// A field or CLI override is out of range
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Field or flag name
        field: String,
        /// Rejected value
        value: String,
        /// Accepted range or form
        expected: String,
    },

    /// `${VAR:?message}` reference with `VAR` unset
    #[error("environment variable '{var}' not set (referenced at {location})")]
    EnvVarNotSet {
        /// Variable name
        var: String,
        /// `file:line`, or the custom message
        location: String,
    },
}

fn summarize_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn suggestion_suffix(suggestion: Option<&str>) -> String {
    suggestion.map_or_else(String::new, |s| format!(" (did you mean '{s}'?)"))
}

// ============================================================================
// Validation Types
// ============================================================================

/// One finding from [`crate::config::Validator`].
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "challenges[0].interval_range_seconds")
    pub path: String,
    /// Human-readable finding
    pub message: String,
    /// Error or warning
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {} at {}", self.message, self.path)
    }
}

/// How serious a validation finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The session refuses to start
    Error,
    /// Reported, the config still loads (fails under `--strict`)
    Warning,
}

// ============================================================================
// Roster Errors
// ============================================================================

/// Rejections from the roster and zone tracker.
///
/// Non-fatal: the offending update is dropped, prior state is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    /// Sample references a zone id not present in the ladder
    #[error("invalid zone '{zone_id}' for participant '{participant_id}'")]
    InvalidZone {
        /// Participant the sample was for
        participant_id: String,
        /// Zone id that is not in the ladder
        zone_id: String,
    },

    /// Sample or roster update references a participant that never joined
    #[error("unknown participant '{0}'")]
    UnknownParticipant(String),
}

impl RosterError {
    /// Short machine-readable reason used for metrics labels and events.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidZone { .. } => "invalid_zone",
            Self::UnknownParticipant(_) => "unknown_participant",
        }
    }
}

// ============================================================================
// Governance Errors
// ============================================================================

/// Governance engine evaluation errors.
#[derive(Debug, Error)]
pub enum GovernanceError {
    /// A challenge or requirement references a zone the ladder does not know
    #[error("zone not found in ladder: {0}")]
    UnknownZone(String),
}

// ============================================================================
// Session Errors
// ============================================================================

/// Session runtime errors surfaced through a session handle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The inbound command buffer is full; the command was dropped
    #[error("session '{0}' command buffer full, command dropped")]
    Backpressure(String),

    /// The session loop has stopped
    #[error("session '{0}' is closed")]
    Closed(String),

    /// A session with this id is already registered
    #[error("session '{0}' already exists")]
    AlreadyExists(String),

    /// The session task panicked or was aborted
    #[error("session task failed: {0}")]
    TaskFailed(String),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::SUCCESS, 0);
        assert_eq!(ExitCode::ERROR, 1);
        assert_eq!(ExitCode::CONFIG_ERROR, 2);
        assert_eq!(ExitCode::IO_ERROR, 3);
        assert_eq!(ExitCode::SESSION_ERROR, 4);
        assert_eq!(ExitCode::GOVERNANCE_ERROR, 5);
        assert_eq!(ExitCode::USAGE_ERROR, 64);
        assert_eq!(ExitCode::INTERRUPTED, 130);
        assert_eq!(ExitCode::TERMINATED, 143);
    }

    #[test]
    fn test_config_error_exit_code() {
        let err: ZoneGateError = ConfigError::MissingFile {
            path: PathBuf::from("ride.yaml"),
        }
        .into();
        assert_eq!(err.exit_code(), ExitCode::CONFIG_ERROR);
    }

    #[test]
    fn test_session_error_exit_code() {
        let err: ZoneGateError = SessionError::Closed("s1".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::SESSION_ERROR);
    }

    #[test]
    fn test_governance_error_exit_code() {
        let err: ZoneGateError = GovernanceError::UnknownZone("lava".to_string()).into();
        assert_eq!(err.exit_code(), ExitCode::GOVERNANCE_ERROR);
    }

    #[test]
    fn test_io_error_exit_code() {
        let err: ZoneGateError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
        assert_eq!(err.exit_code(), ExitCode::IO_ERROR);
    }

    #[test]
    fn test_misconfigured_challenge_display_with_suggestion() {
        let err = ConfigError::MisconfiguredChallenge {
            location: "challenges[0].selections[0].zone_id".to_string(),
            zone_id: "hott".to_string(),
            suggestion: Some("hot".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("'hott'"));
        assert!(msg.contains("did you mean 'hot'?"));
    }

    #[test]
    fn test_misconfigured_challenge_display_without_suggestion() {
        let err = ConfigError::MisconfiguredChallenge {
            location: "base_requirement.zone_id".to_string(),
            zone_id: "lava".to_string(),
            suggestion: None,
        };
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_validation_error_lists_issues() {
        let err = ConfigError::ValidationError {
            path: "session.yaml".to_string(),
            errors: vec![ValidationIssue {
                path: "zone_ladder".to_string(),
                message: "Zone ladder cannot be empty".to_string(),
                severity: Severity::Error,
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("session.yaml"));
        assert!(msg.contains("Zone ladder cannot be empty"));
    }

    #[test]
    fn test_validation_issue_display() {
        let issue = ValidationIssue {
            path: "challenges[0]".to_string(),
            message: "no selections".to_string(),
            severity: Severity::Error,
        };
        assert_eq!(issue.to_string(), "error: no selections at challenges[0]");
    }

    #[test]
    fn test_validation_issue_warning_display() {
        let issue = ValidationIssue {
            path: "governed_labels".to_string(),
            message: "empty".to_string(),
            severity: Severity::Warning,
        };
        assert_eq!(issue.to_string(), "warning: empty at governed_labels");
    }

    #[test]
    fn test_roster_error_reason() {
        let invalid = RosterError::InvalidZone {
            participant_id: "a".to_string(),
            zone_id: "lava".to_string(),
        };
        assert_eq!(invalid.reason(), "invalid_zone");
        assert_eq!(
            RosterError::UnknownParticipant("z".to_string()).reason(),
            "unknown_participant"
        );
    }

    #[test]
    fn test_config_error_env_var_display() {
        let err = ConfigError::EnvVarNotSet {
            var: "GRACE".to_string(),
            location: "line 3".to_string(),
        };
        assert!(err.to_string().contains("GRACE"));
        assert!(err.to_string().contains("line 3"));
    }
}
