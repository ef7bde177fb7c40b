//! Config command handlers
//!
//! Implements `config validate`.

use std::path::Path;

use serde::Serialize;

use crate::cli::args::{ConfigValidateArgs, OutputFormat};
use crate::config::loader::{ConfigLoader, LoadResult, resolve_config_path};
use crate::error::{ConfigError, Severity, ValidationIssue, ZoneGateError};

#[derive(Debug, Serialize)]
struct FileReport {
    path: String,
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    total: usize,
    valid: usize,
    invalid: usize,
}

#[derive(Debug, Serialize)]
struct Report {
    files: Vec<FileReport>,
    summary: Summary,
}

/// Validate configuration files without running a session.
///
/// Every file is checked and reported; the first failure is returned.
///
/// # Errors
///
/// Returns the first file's load or validation error. With `--strict`,
/// warnings fail validation too.
pub fn validate(args: &ConfigValidateArgs) -> Result<(), ZoneGateError> {
    let loader = ConfigLoader::with_defaults();
    let mut reports = Vec::with_capacity(args.files.len());
    let mut first_error: Option<ConfigError> = None;

    for file in &args.files {
        let path = resolve_config_path(file);
        tracing::info!(file = %path.display(), "validating configuration");

        let outcome = loader
            .load(&path)
            .and_then(|result| strict_check(&path, result, args.strict));

        let report = match outcome {
            Ok(warnings) => {
                for warning in &warnings {
                    tracing::warn!(file = %path.display(), "{warning}");
                }
                FileReport {
                    path: path.display().to_string(),
                    valid: true,
                    errors: Vec::new(),
                    warnings,
                }
            }
            Err(err) => {
                let report = FileReport {
                    path: path.display().to_string(),
                    valid: false,
                    errors: error_lines(&err),
                    warnings: Vec::new(),
                };
                first_error.get_or_insert(err);
                report
            }
        };
        reports.push(report);
    }

    let valid = reports.iter().filter(|r| r.valid).count();
    let report = Report {
        summary: Summary {
            total: reports.len(),
            valid,
            invalid: reports.len() - valid,
        },
        files: reports,
    };

    match args.format {
        OutputFormat::Human => print_human(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    first_error.map_or(Ok(()), |err| Err(err.into()))
}

/// Returns the warning lines, or fails when strict mode forbids them.
fn strict_check(
    path: &Path,
    result: LoadResult,
    strict: bool,
) -> Result<Vec<String>, ConfigError> {
    let lines: Vec<String> = result
        .warnings
        .iter()
        .map(|w| match &w.location {
            Some(location) => format!("{} at {location}", w.message),
            None => w.message.clone(),
        })
        .collect();

    if strict && !result.warnings.is_empty() {
        return Err(ConfigError::ValidationError {
            path: path.display().to_string(),
            errors: result
                .warnings
                .into_iter()
                .map(|w| ValidationIssue {
                    path: w.location.unwrap_or_default(),
                    message: w.message,
                    severity: Severity::Error,
                })
                .collect(),
        });
    }
    Ok(lines)
}

fn error_lines(err: &ConfigError) -> Vec<String> {
    match err {
        ConfigError::ValidationError { errors, .. } => {
            errors.iter().map(ToString::to_string).collect()
        }
        other => vec![other.to_string()],
    }
}

fn print_human(report: &Report) {
    for file in &report.files {
        if file.valid {
            println!("ok    {}", file.path);
            for warning in &file.warnings {
                println!("      warning: {warning}");
            }
        } else {
            println!("FAIL  {}", file.path);
            for error in &file.errors {
                println!("      {error}");
            }
        }
    }
    println!(
        "{} file(s): {} valid, {} invalid",
        report.summary.total, report.summary.valid, report.summary.invalid
    );
}
