//! Configuration loader
//!
//! Pipeline from a YAML file to a frozen session configuration:
//! 1. Size check against [`ConfigLimits`]
//! 2. Read, strip UTF-8 BOM
//! 3. Environment variable expansion on raw text
//! 4. YAML parsing (empty documents rejected)
//! 5. Deserialization to [`GovernanceConfig`]
//! 6. Validation
//! 7. Freeze with `Arc`

use crate::config::schema::GovernanceConfig;
use crate::config::validation::Validator;
use crate::error::ConfigError;

use serde_yaml::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ============================================================================
// Public API
// ============================================================================

/// Knobs for [`ConfigLoader`].
#[derive(Debug, Clone, Default)]
pub struct LoaderOptions {
    /// Size limits applied before and after parsing.
    pub config_limits: ConfigLimits,
}

/// Upper bounds on config size and policy counts.
///
/// Each limit can be raised through a `ZONEGATE_*` environment variable.
#[derive(Debug, Clone)]
pub struct ConfigLimits {
    /// Maximum number of challenge policies.
    pub max_policies: usize,

    /// Maximum number of selections across all policies.
    pub max_selections: usize,

    /// Largest accepted file, in bytes.
    pub max_config_size: usize,
}

impl Default for ConfigLimits {
    fn default() -> Self {
        Self {
            max_policies: env_or("ZONEGATE_MAX_POLICIES", 64),
            max_selections: env_or("ZONEGATE_MAX_SELECTIONS", 1024),
            max_config_size: env_or("ZONEGATE_MAX_CONFIG_SIZE", 1024 * 1024),
        }
    }
}

/// A loaded config plus any non-fatal findings.
#[derive(Debug)]
pub struct LoadResult {
    /// Validated config, ready to share across sessions.
    pub config: Arc<GovernanceConfig>,

    /// Warnings in discovery order.
    pub warnings: Vec<LoadWarning>,
}

/// Non-fatal finding from expansion or validation.
#[derive(Debug, Clone)]
pub struct LoadWarning {
    /// Warning message.
    pub message: String,

    /// `file:line` or a field path, when known.
    pub location: Option<String>,
}

/// Configuration loader.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: LoaderOptions,
}

impl ConfigLoader {
    /// Loader with explicit options.
    #[must_use]
    pub const fn new(options: LoaderOptions) -> Self {
        Self { options }
    }

    /// Loader with default limits.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(LoaderOptions::default())
    }

    /// Reads, expands, parses and validates a governance config file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file is missing, unreadable, or over the size limit
    /// - A required environment variable is unset
    /// - YAML parsing or deserialization fails
    /// - Validation fails
    pub fn load(&self, path: &Path) -> Result<LoadResult, ConfigError> {
        let max_size = self.options.config_limits.max_config_size;

        let metadata = std::fs::metadata(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        let file_size = usize::try_from(metadata.len()).unwrap_or(usize::MAX);
        if file_size > max_size {
            return Err(ConfigError::InvalidValue {
                field: "file_size".to_string(),
                value: format!("{file_size} bytes"),
                expected: format!("at most {max_size} bytes"),
            });
        }

        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::MissingFile {
            path: path.to_path_buf(),
        })?;

        self.load_str(&raw, path)
    }

    /// Runs the pipeline on already-read YAML text.
    ///
    /// `origin` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigLoader::load`], minus file access failures.
    pub fn load_str(&self, raw: &str, origin: &Path) -> Result<LoadResult, ConfigError> {
        let mut warnings = Vec::new();
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut env_sub = EnvSubstitution::default();
        let expanded = env_sub.expand(raw, origin)?;
        warnings.extend(env_sub.warnings);

        let root: Value = serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
            path: origin.to_path_buf(),
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })?;

        if root.is_null() {
            return Err(ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: None,
                message: "Configuration file is empty".to_string(),
            });
        }

        let config: GovernanceConfig =
            serde_yaml::from_value(root).map_err(|e| ConfigError::ParseError {
                path: origin.to_path_buf(),
                line: e.location().map(|l| l.line()),
                message: format!("Failed to deserialize configuration: {e}"),
            })?;

        let result = Validator::new().validate(&config, &self.options.config_limits);
        if result.has_errors() {
            return Err(ConfigError::ValidationError {
                path: origin.display().to_string(),
                errors: result.errors,
            });
        }

        warnings.extend(result.warnings.into_iter().map(|issue| LoadWarning {
            message: issue.message,
            location: Some(issue.path),
        }));

        Ok(LoadResult {
            config: Arc::new(config),
            warnings,
        })
    }
}

// ============================================================================
// Environment Variable Substitution
// ============================================================================

/// Pre-parse environment variable expansion.
///
/// Runs on raw YAML text so substituted numbers keep their scalar type.
/// Supports `${VAR}`, `${VAR:-default}`, `${VAR:?message}`, and `$$`.
#[derive(Debug, Default)]
struct EnvSubstitution {
    warnings: Vec<LoadWarning>,
}

impl EnvSubstitution {
    fn expand(&mut self, raw: &str, origin: &Path) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(raw.len());

        for (idx, line) in raw.split_inclusive('\n').enumerate() {
            self.expand_line(line, idx + 1, origin, &mut out)?;
        }

        Ok(out)
    }

    fn expand_line(
        &mut self,
        line: &str,
        line_no: usize,
        origin: &Path,
        out: &mut String,
    ) -> Result<(), ConfigError> {
        let mut rest = line;

        while let Some(dollar) = rest.find('$') {
            out.push_str(&rest[..dollar]);
            let after = &rest[dollar + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
            } else if let Some(body) = after.strip_prefix('{') {
                let close = body.find('}').ok_or_else(|| ConfigError::ParseError {
                    path: origin.to_path_buf(),
                    line: Some(line_no),
                    message: "Unclosed environment variable reference".to_string(),
                })?;
                let value = self.resolve(&body[..close], line_no, origin)?;
                out.push_str(&value);
                rest = &body[close + 1..];
            } else {
                out.push('$');
                rest = after;
            }
        }

        out.push_str(rest);
        Ok(())
    }

    fn resolve(&mut self, reference: &str, line_no: usize, origin: &Path) -> Result<String, ConfigError> {
        let (name, fallback) = match reference.split_once(':') {
            Some((name, modifier)) if modifier.starts_with('-') => {
                (name, Fallback::Default(&modifier[1..]))
            }
            Some((name, modifier)) if modifier.starts_with('?') => {
                (name, Fallback::Required(&modifier[1..]))
            }
            _ => (reference, Fallback::Empty),
        };

        if let Ok(value) = std::env::var(name) {
            return Ok(value);
        }

        match fallback {
            Fallback::Default(default) => Ok(default.to_string()),
            Fallback::Required(message) => Err(ConfigError::EnvVarNotSet {
                var: name.to_string(),
                location: if message.is_empty() {
                    format!("{}:{line_no}", origin.display())
                } else {
                    format!("{}:{line_no}: {message}", origin.display())
                },
            }),
            Fallback::Empty => {
                self.warnings.push(LoadWarning {
                    message: format!(
                        "Environment variable '{name}' is not set, using empty string"
                    ),
                    location: Some(format!("{}:{line_no}", origin.display())),
                });
                Ok(String::new())
            }
        }
    }
}

enum Fallback<'a> {
    Default(&'a str),
    Required(&'a str),
    Empty,
}

/// Reads `name` from the environment, falling back to `default` when unset or unparsable.
pub(crate) fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Returns the path with a `.yaml` fallback when the file has no extension.
#[must_use]
pub fn resolve_config_path(path: &Path) -> PathBuf {
    if path.extension().is_none() && !path.exists() {
        let with_ext = path.with_extension("yaml");
        if with_ext.exists() {
            return with_ext;
        }
    }
    path.to_path_buf()
}

// ============================================================================
// Tests
// ============================================================================
