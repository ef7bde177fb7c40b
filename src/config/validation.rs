//! Configuration validation
//!
//! Semantic validation of a deserialized `GovernanceConfig`. Validation
//! collects ALL issues (doesn't stop at first) so a broken session file is
//! reported in one pass.

use crate::config::loader::ConfigLimits;
use crate::config::schema::{
    ChallengePolicy, GovernanceConfig, MAX_TICK_INTERVAL_MS, RequiredRule, ZoneDefinition,
};
use crate::error::{ConfigError, Severity, ValidationIssue};

use std::collections::HashSet;

// ============================================================================
// Public API
// ============================================================================

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Validation errors (prevent loading).
    pub errors: Vec<ValidationIssue>,

    /// Validation warnings (informational).
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Returns `true` if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns `true` if validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Configuration validator.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Validator {
    /// Creates a new validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a configuration and returns every error and warning found.
    pub fn validate(
        &mut self,
        config: &GovernanceConfig,
        limits: &ConfigLimits,
    ) -> ValidationResult {
        self.errors.clear();
        self.warnings.clear();

        self.validate_ladder(&config.zone_ladder);
        let zone_ids: HashSet<&str> = config.zone_ladder.iter().map(|z| z.id.as_str()).collect();

        self.validate_policies(&config.challenges, &zone_ids, &config.zone_ladder);

        if let Some(base) = &config.base_requirement {
            self.validate_zone_ref(
                &base.zone_id,
                "base_requirement.zone_id",
                &zone_ids,
                &config.zone_ladder,
            );
        }

        self.validate_session_settings(config);
        self.validate_limits(config, limits);

        ValidationResult {
            errors: std::mem::take(&mut self.errors),
            warnings: std::mem::take(&mut self.warnings),
        }
    }

    // ========================================================================
    // Zone Ladder
    // ========================================================================

    fn validate_ladder(&mut self, ladder: &[ZoneDefinition]) {
        if ladder.is_empty() {
            self.add_error("zone_ladder", "Zone ladder cannot be empty");
            return;
        }

        let mut seen = HashSet::new();
        for (idx, zone) in ladder.iter().enumerate() {
            let path = format!("zone_ladder[{idx}]");

            if zone.id.trim().is_empty() {
                self.add_error(&format!("{path}.id"), "Zone id is required");
            } else if !seen.insert(zone.id.as_str()) {
                self.add_error(
                    &format!("{path}.id"),
                    &format!("Duplicate zone id '{}'", zone.id),
                );
            }

            if zone.name.trim().is_empty() {
                self.add_warning(&format!("{path}.name"), "Zone name is empty");
            }

            if idx > 0 && zone.rank <= ladder[idx - 1].rank {
                self.add_error(
                    &format!("{path}.rank"),
                    &format!(
                        "Zone ranks must be strictly increasing: '{}' has rank {} after rank {}",
                        zone.id,
                        zone.rank,
                        ladder[idx - 1].rank
                    ),
                );
            }
        }
    }

    // ========================================================================
    // Challenge Policies
    // ========================================================================

    fn validate_policies(
        &mut self,
        policies: &[ChallengePolicy],
        zone_ids: &HashSet<&str>,
        ladder: &[ZoneDefinition],
    ) {
        let mut policy_ids = HashSet::new();

        for (idx, policy) in policies.iter().enumerate() {
            let path = format!("challenges[{idx}]");

            if policy.id.trim().is_empty() {
                self.add_error(&format!("{path}.id"), "Policy id is required");
            } else if !policy_ids.insert(policy.id.as_str()) {
                self.add_error(
                    &format!("{path}.id"),
                    &format!("Duplicate policy id '{}'", policy.id),
                );
            }

            let [min, max] = policy.interval_range_seconds;
            if min > max {
                self.add_error(
                    &format!("{path}.interval_range_seconds"),
                    &format!("Interval minimum {min} exceeds maximum {max}"),
                );
            }
            if max == 0 {
                self.add_error(
                    &format!("{path}.interval_range_seconds"),
                    "Interval range must allow a positive delay",
                );
            }

            if policy.selections.is_empty() {
                self.add_error(
                    &format!("{path}.selections"),
                    "Policy must define at least one selection",
                );
            }

            let mut selection_ids = HashSet::new();
            for (sidx, selection) in policy.selections.iter().enumerate() {
                let spath = format!("{path}.selections[{sidx}]");

                if !selection_ids.insert(selection.id.as_str()) {
                    self.add_error(
                        &format!("{spath}.id"),
                        &format!("Duplicate selection id '{}'", selection.id),
                    );
                }

                self.validate_zone_ref(
                    &selection.zone_id,
                    &format!("{spath}.zone_id"),
                    zone_ids,
                    ladder,
                );

                if selection.time_allowed_seconds == 0 {
                    self.add_error(
                        &format!("{spath}.time_allowed_seconds"),
                        "Time allowed must be greater than zero",
                    );
                }

                if let RequiredRule::Count(n) = selection.rule {
                    if n > 1000 {
                        self.add_warning(
                            &format!("{spath}.rule"),
                            &format!("Fixed count {n} will always be capped at the roster size"),
                        );
                    }
                }
            }
        }
    }

    fn validate_zone_ref(
        &mut self,
        zone_id: &str,
        path: &str,
        zone_ids: &HashSet<&str>,
        ladder: &[ZoneDefinition],
    ) {
        if zone_ids.contains(zone_id) {
            return;
        }
        let message = suggest_zone(zone_id, ladder).map_or_else(
            || format!("Unknown zone '{zone_id}'"),
            |s| format!("Unknown zone '{zone_id}' (did you mean '{s}'?)"),
        );
        self.add_error(path, &message);
    }

    // ========================================================================
    // Session Settings
    // ========================================================================

    fn validate_session_settings(&mut self, config: &GovernanceConfig) {
        if config.governed_labels.is_empty() {
            self.add_warning(
                "governed_labels",
                "No governed labels configured; media is only governed via explicit set_media_governed",
            );
        }

        let mut exemptions = HashSet::new();
        for (idx, id) in config.exemptions.iter().enumerate() {
            if !exemptions.insert(id.as_str()) {
                self.add_warning(
                    &format!("exemptions[{idx}]"),
                    &format!("Duplicate exemption '{id}'"),
                );
            }
        }

        if config.tick_interval_ms == 0 || config.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            self.add_error(
                "tick_interval_ms",
                &format!(
                    "Tick interval must be between 1 and {MAX_TICK_INTERVAL_MS} ms, got {}",
                    config.tick_interval_ms
                ),
            );
        }

        if config.command_buffer == 0 {
            self.add_error("command_buffer", "Command buffer must hold at least one command");
        }

        if config.sample_timeout_seconds == Some(0) {
            self.add_error(
                "sample_timeout_seconds",
                "Sample timeout must be greater than zero when set",
            );
        }
    }

    fn validate_limits(&mut self, config: &GovernanceConfig, limits: &ConfigLimits) {
        if config.challenges.len() > limits.max_policies {
            self.add_error(
                "challenges",
                &format!(
                    "Too many challenge policies: {} (maximum: {}). \
                     Set ZONEGATE_MAX_POLICIES to increase the limit.",
                    config.challenges.len(),
                    limits.max_policies
                ),
            );
        }

        let selection_count: usize = config.challenges.iter().map(|p| p.selections.len()).sum();
        if selection_count > limits.max_selections {
            self.add_error(
                "challenges",
                &format!(
                    "Too many challenge selections: {selection_count} (maximum: {}). \
                     Set ZONEGATE_MAX_SELECTIONS to increase the limit.",
                    limits.max_selections
                ),
            );
        }
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn add_error(&mut self, path: &str, message: &str) {
        self.errors.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Error,
        });
    }

    fn add_warning(&mut self, path: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            path: path.to_string(),
            message: message.to_string(),
            severity: Severity::Warning,
        });
    }
}

// ============================================================================
// Zone Reference Check
// ============================================================================

/// Fails fast on the first zone reference the ladder does not contain.
///
/// Used when a configuration is handed to the engine directly rather than
/// through the loader.
///
/// # Errors
///
/// Returns `ConfigError::MisconfiguredChallenge` naming the offending location.
pub fn check_zone_references(config: &GovernanceConfig) -> Result<(), ConfigError> {
    let known: HashSet<&str> = config.zone_ladder.iter().map(|z| z.id.as_str()).collect();
    let misconfigured = |location: String, zone_id: &str| ConfigError::MisconfiguredChallenge {
        location,
        zone_id: zone_id.to_string(),
        suggestion: suggest_zone(zone_id, &config.zone_ladder),
    };

    for (idx, policy) in config.challenges.iter().enumerate() {
        for (sidx, selection) in policy.selections.iter().enumerate() {
            if !known.contains(selection.zone_id.as_str()) {
                return Err(misconfigured(
                    format!("challenges[{idx}].selections[{sidx}].zone_id"),
                    &selection.zone_id,
                ));
            }
        }
    }

    if let Some(base) = &config.base_requirement {
        if !known.contains(base.zone_id.as_str()) {
            return Err(misconfigured(
                "base_requirement.zone_id".to_string(),
                &base.zone_id,
            ));
        }
    }

    Ok(())
}

/// Suggests the closest zone id for typo correction.
///
/// Returns the closest match if its Damerau-Levenshtein distance is ≤ 3.
#[must_use]
pub fn suggest_zone(input: &str, ladder: &[ZoneDefinition]) -> Option<String> {
    ladder
        .iter()
        .map(|z| (z.id.as_str(), strsim::damerau_levenshtein(input, &z.id)))
        .filter(|(_, dist)| *dist <= 3)
        .min_by_key(|(_, dist)| *dist)
        .map(|(id, _)| id.to_string())
}

// ============================================================================
// Tests
// ============================================================================
