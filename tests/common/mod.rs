//! Shared integration-test helpers: fixtures, config builders, and a
//! wrapper for running the `zonegate` binary.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::Arc;

use zonegate::config::{
    ChallengePolicy, ChallengeSelection, GovernanceConfig, RequiredRule, SelectionOrder,
    ZoneDefinition,
};

/// Absolute path to a file under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Owned id list from string literals.
pub fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// `cool < active < warm < hot < fire`.
pub fn ladder() -> Vec<ZoneDefinition> {
    ["cool", "active", "warm", "hot", "fire"]
        .iter()
        .zip(0..)
        .map(|(id, rank)| ZoneDefinition {
            id: (*id).to_string(),
            name: id.to_uppercase(),
            rank,
        })
        .collect()
}

/// A governed-by-`kids` config with one single-selection policy.
pub fn single_policy_config(
    zone_id: &str,
    rule: RequiredRule,
    interval_seconds: u64,
    time_allowed_seconds: u64,
    grace_period_seconds: u64,
) -> GovernanceConfig {
    let mut config = GovernanceConfig::with_ladder(ladder());
    config.governed_labels = ids(&["kids"]);
    config.grace_period_seconds = grace_period_seconds;
    config.seed = Some(1);
    config.challenges = vec![ChallengePolicy {
        id: "main".to_string(),
        selections: vec![ChallengeSelection {
            id: format!("{rule}-{zone_id}"),
            zone_id: zone_id.to_string(),
            rule,
            time_allowed_seconds,
        }],
        interval_range_seconds: [interval_seconds, interval_seconds],
        selection_order: SelectionOrder::Sequential,
    }];
    config
}

/// Same as [`single_policy_config`], frozen.
pub fn shared(config: GovernanceConfig) -> Arc<GovernanceConfig> {
    Arc::new(config)
}

/// Helpers for running the `zonegate` binary.
pub struct ZoneGateProcess;

impl ZoneGateProcess {
    /// Runs a command to completion with no stdin.
    pub fn spawn_command(args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_zonegate"))
            .args(args)
            .env_remove("ZONEGATE_LOG_LEVEL")
            .stdin(Stdio::null())
            .output()
            .expect("failed to run zonegate")
    }

    /// Runs a command, feeds `input` on stdin, closes it, and waits.
    pub fn run_with_input(args: &[&str], input: &str) -> Output {
        let mut child = Command::new(env!("CARGO_BIN_EXE_zonegate"))
            .args(args)
            .env_remove("ZONEGATE_LOG_LEVEL")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to spawn zonegate");

        {
            let mut stdin = child.stdin.take().expect("stdin not captured");
            stdin
                .write_all(input.as_bytes())
                .expect("failed to write stdin");
        }

        child.wait_with_output().expect("failed to wait for zonegate")
    }

    /// Parses every stdout line as JSON.
    pub fn json_lines(output: &Output) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                serde_json::from_str(l).unwrap_or_else(|e| panic!("invalid JSON line {l:?}: {e}"))
            })
            .collect()
    }
}
