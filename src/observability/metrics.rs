//! Metrics collection.
//!
//! Prometheus-compatible metrics for governance sessions. Config-supplied
//! identifiers (policy ids) are sanitized before use as labels.

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::ZoneGateError;
use crate::governance::Phase;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initializes the global metrics recorder.
///
/// With `Some(port)` a Prometheus HTTP listener is bound on
/// `127.0.0.1:<port>`; otherwise metrics are recorded in-process only.
///
/// # Errors
///
/// Returns `ZoneGateError::Io` if the recorder or listener cannot be
/// installed (e.g. port in use).
pub fn init_metrics(port: Option<u16>) -> Result<(), ZoneGateError> {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::debug!("metrics already initialized, skipping");
        return Ok(());
    }
    port.map_or_else(
        || PrometheusBuilder::new().install_recorder().map(|_| ()),
        |p| {
            PrometheusBuilder::new()
                .with_http_listener(([127, 0, 0, 1], p))
                .install()
        },
    )
    .map_err(|e| ZoneGateError::Io(std::io::Error::other(e.to_string())))?;

    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    describe_counter!("zonegate_ticks_total", "Governance ticks executed");
    describe_counter!(
        "zonegate_tick_errors_total",
        "Ticks that failed and kept the previous state"
    );
    describe_counter!("zonegate_samples_accepted_total", "Zone samples applied");
    describe_counter!(
        "zonegate_samples_rejected_total",
        "Zone samples rejected, by reason"
    );
    describe_counter!(
        "zonegate_challenges_started_total",
        "Challenges started, by policy"
    );
    describe_counter!(
        "zonegate_challenges_resolved_total",
        "Challenges archived, by outcome"
    );
    describe_counter!(
        "zonegate_challenges_recovered_total",
        "Failed challenges flipped to success"
    );
    describe_counter!(
        "zonegate_phase_transitions_total",
        "Phase transitions, by from/to"
    );
    describe_gauge!(
        "zonegate_phase",
        "Current phase (0 = unlocked, 1 = pending, 2 = locked)"
    );
    describe_gauge!("zonegate_video_locked", "Playback lock flag (1 = locked)");
    describe_gauge!(
        "zonegate_active_participants",
        "Participants currently sending samples"
    );
}

/// Records one completed tick.
pub fn record_tick() {
    counter!("zonegate_ticks_total").increment(1);
}

/// Records a failed tick.
pub fn record_tick_error() {
    counter!("zonegate_tick_errors_total").increment(1);
}

/// Records a sample that updated the roster.
pub fn record_sample_accepted() {
    counter!("zonegate_samples_accepted_total").increment(1);
}

/// Records a rejected or dropped sample. `reason` is a fixed machine-readable
/// string such as `invalid_zone` or `stale`.
pub fn record_sample_rejected(reason: &'static str) {
    counter!("zonegate_samples_rejected_total", "reason" => reason).increment(1);
}

/// Records a started challenge.
pub fn record_challenge_started(policy_id: &str) {
    counter!("zonegate_challenges_started_total", "policy" => sanitize_label(policy_id))
        .increment(1);
}

/// Records an archived challenge.
pub fn record_challenge_resolved(outcome: &'static str) {
    counter!("zonegate_challenges_resolved_total", "outcome" => outcome).increment(1);
}

/// Records a recovery.
pub fn record_challenge_recovered() {
    counter!("zonegate_challenges_recovered_total").increment(1);
}

/// Records a phase transition and updates the phase gauge.
pub fn record_phase_transition(from: Phase, to: Phase) {
    counter!(
        "zonegate_phase_transitions_total",
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    gauge!("zonegate_phase").set(to.gauge_value());
}

/// Sets the lock gauge.
pub fn set_video_locked(locked: bool) {
    gauge!("zonegate_video_locked").set(if locked { 1.0 } else { 0.0 });
}

/// Sets the active participants gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_participants(count: usize) {
    gauge!("zonegate_active_participants").set(count as f64);
}

const MAX_LABEL_LEN: usize = 64;

/// Truncates and replaces characters invalid in Prometheus label values.
fn sanitize_label(value: &str) -> String {
    value
        .chars()
        .take(MAX_LABEL_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
