//! CLI argument definitions
//!
//! All Clap derive structs for `zonegate` command-line parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::observability::LogFormat;

// ============================================================================
// Root CLI
// ============================================================================

/// Multi-participant zone governance for gated media playback.
#[derive(Parser, Debug)]
#[command(name = "zonegate", author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all non-error output.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output control.
    #[arg(long, default_value = "auto", global = true, env = "ZONEGATE_COLOR")]
    pub color: ColorChoice,

    /// Log line format.
    #[arg(long, default_value = "human", global = true, env = "ZONEGATE_LOG_FORMAT")]
    pub log_format: LogFormat,
}

// ============================================================================
// Top-Level Commands
// ============================================================================

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a governance session.
    Session(SessionCommandArgs),

    /// Work with configuration files.
    Config(ConfigCommand),

    /// Display version information.
    Version(VersionArgs),
}

// ============================================================================
// Session Command
// ============================================================================

/// Session commands.
#[derive(Args, Debug)]
pub struct SessionCommandArgs {
    /// Session subcommand.
    #[command(subcommand)]
    pub subcommand: SessionSubcommand,
}

/// Session subcommands.
#[derive(Subcommand, Debug)]
pub enum SessionSubcommand {
    /// Run one session over stdio (commands in, states out).
    Run(SessionRunArgs),
}

/// Arguments for `session run`.
#[derive(Args, Debug)]
pub struct SessionRunArgs {
    /// Path to YAML configuration file.
    #[arg(short, long, env = "ZONEGATE_CONFIG")]
    pub config: PathBuf,

    /// Override the tick interval (e.g. `500ms`, at most `1s`).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub tick_interval: Option<Duration>,

    /// Write the JSONL event stream to this file instead of stderr.
    #[arg(long, env = "ZONEGATE_EVENTS_FILE")]
    pub events_file: Option<PathBuf>,

    /// Serve Prometheus metrics on `127.0.0.1:<port>`.
    #[arg(long, env = "ZONEGATE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Seed the challenge scheduler for reproducible runs.
    #[arg(long, env = "ZONEGATE_SEED")]
    pub seed: Option<u64>,

    /// Session id (random when absent).
    #[arg(long)]
    pub session_id: Option<String>,
}

// ============================================================================
// Config Command
// ============================================================================

/// Configuration commands.
#[derive(Args, Debug)]
pub struct ConfigCommand {
    /// Config subcommand.
    #[command(subcommand)]
    pub subcommand: ConfigSubcommand,
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Validate configuration files without running a session.
    Validate(ConfigValidateArgs),
}

/// Arguments for `config validate`.
#[derive(Args, Debug)]
pub struct ConfigValidateArgs {
    /// Configuration files to validate.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Enable strict validation (warnings become errors).
    #[arg(long)]
    pub strict: bool,
}

// ============================================================================
// Version
// ============================================================================

/// Arguments for version display.
#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Output format.
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,
}

// ============================================================================
// CLI-Local Enums
// ============================================================================

/// Color output choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ColorChoice {
    /// Auto-detect terminal support.
    #[default]
    Auto,
    /// Always use color.
    Always,
    /// Never use color.
    Never,
}

/// Output format for structured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output.
    #[default]
    Human,
    /// JSON output.
    Json,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_run_with_config() {
        let cli = Cli::try_parse_from(["zonegate", "session", "run", "--config", "ride.yaml"]);
        assert!(cli.is_ok(), "Failed to parse: {cli:?}");
    }

    #[test]
    fn test_session_run_requires_config() {
        let cli = Cli::try_parse_from(["zonegate", "session", "run"]);
        if std::env::var_os("ZONEGATE_CONFIG").is_none() {
            assert!(cli.is_err());
        }
    }

    #[test]
    fn test_tick_interval_humantime() {
        let cli = Cli::try_parse_from([
            "zonegate",
            "session",
            "run",
            "--config",
            "ride.yaml",
            "--tick-interval",
            "250ms",
            "--seed",
            "9",
        ])
        .unwrap();

        let Commands::Session(cmd) = cli.command else {
            panic!("Expected session command");
        };
        let SessionSubcommand::Run(args) = cmd.subcommand;
        assert_eq!(args.tick_interval, Some(Duration::from_millis(250)));
        assert_eq!(args.seed, Some(9));
    }

    #[test]
    fn test_bad_tick_interval_rejected() {
        let cli = Cli::try_parse_from([
            "zonegate",
            "session",
            "run",
            "--config",
            "ride.yaml",
            "--tick-interval",
            "soon",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_validate_requires_files() {
        let cli = Cli::try_parse_from(["zonegate", "config", "validate"]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "zonegate",
            "-vv",
            "--log-format",
            "json",
            "--color",
            "never",
            "version",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.color, ColorChoice::Never);
    }

    #[test]
    fn test_help_output() {
        let err = Cli::try_parse_from(["zonegate", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_version_output() {
        let err = Cli::try_parse_from(["zonegate", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
