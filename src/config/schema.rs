//! Configuration schema types
//!
//! Strongly-typed session configuration, deserialized from YAML once at
//! configure time and frozen behind an `Arc` for the session lifetime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Default interval between governance ticks.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Upper bound on the tick interval; lock detection latency is bounded by it.
pub const MAX_TICK_INTERVAL_MS: u64 = 1000;

/// Default capacity of the inbound session command channel.
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Default number of archived challenges kept per session.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

// ============================================================================
// Top-Level Configuration
// ============================================================================

/// Root configuration for one governance session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct GovernanceConfig {
    /// Ordered zone definitions, lowest rank first
    pub zone_ladder: Vec<ZoneDefinition>,

    /// Content labels that mark media as governed
    #[serde(default)]
    pub governed_labels: Vec<String>,

    /// Seconds the phase may stay `pending` before it locks
    #[serde(default)]
    pub grace_period_seconds: u64,

    /// Participant ids exempt from every requirement
    #[serde(default)]
    pub exemptions: Vec<String>,

    /// Challenge policies driving the scheduler
    #[serde(default)]
    pub challenges: Vec<ChallengePolicy>,

    /// Standing zone requirement for the phase machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_requirement: Option<BaseRequirement>,

    /// Mark a participant absent after this many seconds without a sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_timeout_seconds: Option<u64>,

    /// Interval between periodic ticks
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Run a tick immediately after each accepted sample
    #[serde(default = "default_true")]
    pub tick_on_sample: bool,

    /// Capacity of the inbound command channel
    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Maximum number of archived challenges
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Seed for the challenge scheduler RNG (random when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

const fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

const fn default_true() -> bool {
    true
}

const fn default_command_buffer() -> usize {
    DEFAULT_COMMAND_BUFFER
}

const fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

impl GovernanceConfig {
    /// Creates a configuration with the given ladder and defaults elsewhere.
    #[must_use]
    pub fn with_ladder(zone_ladder: Vec<ZoneDefinition>) -> Self {
        Self {
            zone_ladder,
            governed_labels: Vec::new(),
            grace_period_seconds: 0,
            exemptions: Vec::new(),
            challenges: Vec::new(),
            base_requirement: None,
            sample_timeout_seconds: None,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            tick_on_sample: true,
            command_buffer: DEFAULT_COMMAND_BUFFER,
            history_limit: DEFAULT_HISTORY_LIMIT,
            seed: None,
        }
    }

    /// Returns whether any of `labels` marks content as governed.
    ///
    /// Comparison is ASCII case-insensitive.
    #[must_use]
    pub fn is_governed_by(&self, labels: &[String]) -> bool {
        labels.iter().any(|label| {
            self.governed_labels
                .iter()
                .any(|g| g.eq_ignore_ascii_case(label))
        })
    }
}

// ============================================================================
// Zones
// ============================================================================

/// One rung of the zone ladder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneDefinition {
    /// Stable zone id (e.g. `"hot"`)
    pub id: String,

    /// Human-readable label
    pub name: String,

    /// Intensity rank; strictly increasing along the ladder
    pub rank: i64,
}

// ============================================================================
// Challenges
// ============================================================================

/// A scheduling policy: a pool of selections and a randomized cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ChallengePolicy {
    /// Policy id
    pub id: String,

    /// Candidate challenges
    pub selections: Vec<ChallengeSelection>,

    /// Inclusive `[min, max]` delay between challenges, in seconds
    pub interval_range_seconds: [u64; 2],

    /// How the next selection is picked
    #[serde(default)]
    pub selection_order: SelectionOrder,
}

/// One candidate challenge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ChallengeSelection {
    /// Selection id
    pub id: String,

    /// Zone every counted participant must reach
    pub zone_id: String,

    /// How many eligible participants must reach the zone
    pub rule: RequiredRule,

    /// Seconds allowed before the challenge fails
    pub time_allowed_seconds: u64,
}

/// Order in which a policy cycles through its selections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionOrder {
    /// Round-robin in declaration order.
    #[default]
    Sequential,
    /// Uniformly random each time.
    Random,
}

/// Standing zone requirement evaluated by the phase machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct BaseRequirement {
    /// Zone participants must hold
    pub zone_id: String,

    /// How many eligible participants must hold it
    #[serde(default)]
    pub rule: RequiredRule,
}

// ============================================================================
// Required Rule
// ============================================================================

/// Required-count rule.
///
/// Grammar, accepted both as YAML scalars and in JSON:
/// - `all`: every eligible participant
/// - `any`: at least one
/// - a positive integer `k`: `min(k, eligible)`
/// - a fraction `"n/d"` with `0 < n <= d`: `ceil(n * eligible / d)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RequiredRule {
    /// Every eligible participant.
    #[default]
    All,
    /// At least one eligible participant.
    Any,
    /// A fixed count, capped at the eligible count.
    Count(u32),
    /// A fraction of the eligible count, rounded up.
    Fraction {
        /// Numerator
        numerator: u32,
        /// Denominator
        denominator: u32,
    },
}

impl fmt::Display for RequiredRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Fraction {
                numerator,
                denominator,
            } => write!(f, "{numerator}/{denominator}"),
        }
    }
}

/// Error returned when a rule string does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleParseError(pub String);

impl fmt::Display for RuleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid rule '{}': expected 'all', 'any', a positive integer, or 'n/d'",
            self.0
        )
    }
}

impl std::error::Error for RuleParseError {}

impl FromStr for RequiredRule {
    type Err = RuleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || RuleParseError(s.to_string());

        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if trimmed.eq_ignore_ascii_case("any") {
            return Ok(Self::Any);
        }
        if let Some((n, d)) = trimmed.split_once('/') {
            let numerator: u32 = n.trim().parse().map_err(|_| err())?;
            let denominator: u32 = d.trim().parse().map_err(|_| err())?;
            if numerator == 0 || denominator == 0 || numerator > denominator {
                return Err(err());
            }
            return Ok(Self::Fraction {
                numerator,
                denominator,
            });
        }
        match trimmed.parse::<u32>() {
            Ok(0) | Err(_) => Err(err()),
            Ok(n) => Ok(Self::Count(n)),
        }
    }
}

impl Serialize for RequiredRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Count(n) => serializer.serialize_u32(*n),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for RequiredRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Int(n) => u32::try_from(n)
                .ok()
                .filter(|n| *n > 0)
                .map(Self::Count)
                .ok_or_else(|| serde::de::Error::custom(RuleParseError(n.to_string()))),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
