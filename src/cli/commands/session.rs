//! Session command handlers
//!
//! Implements `session run`: one governance session fed over stdio.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cli::args::SessionRunArgs;
use crate::config::loader::{ConfigLoader, resolve_config_path};
use crate::config::schema::{GovernanceConfig, MAX_TICK_INTERVAL_MS};
use crate::error::{ConfigError, SessionError, ZoneGateError};
use crate::observability::events::EventEmitter;
use crate::session::SessionRegistry;
use crate::transport::{CommandReader, StateWriter, forward_commands, publish_states};

/// Run one session over stdio until EOF or cancellation.
///
/// # Errors
///
/// Returns a configuration error if the file fails to load or the
/// session cannot be configured, or an I/O error from stdio.
pub async fn run(args: &SessionRunArgs, cancel: CancellationToken) -> Result<(), ZoneGateError> {
    if let Some(port) = args.metrics_port {
        crate::observability::init_metrics(Some(port))?;
        tracing::info!(port, "Prometheus metrics endpoint started");
    }

    let config = load_config(&args.config, args.tick_interval, args.seed)?;

    let emitter = Arc::new(match args.events_file {
        Some(ref path) => EventEmitter::from_file(path)?,
        None => EventEmitter::stderr(),
    });

    let session_id = args
        .session_id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let registry = SessionRegistry::with_cancel(cancel.child_token());
    let handle = registry.create(&session_id, config, emitter)?;

    let mut writer = StateWriter::stdout();
    let states = handle.subscribe();
    let publisher = tokio::spawn(async move {
        publish_states(&mut writer, states).await?;
        Ok::<u64, ZoneGateError>(writer.written())
    });

    let mut reader = CommandReader::stdin();
    let forwarded = forward_commands(&mut reader, &handle, &cancel).await;
    drop(handle);

    let summary = registry
        .finish(&session_id)
        .await
        .ok_or_else(|| SessionError::Closed(session_id.clone()))??;
    let written = publisher
        .await
        .map_err(|e| SessionError::TaskFailed(e.to_string()))??;

    tracing::info!(
        session_id = %summary.session_id,
        reason = ?summary.reason,
        ticks = summary.ticks,
        challenges = summary.history.len(),
        commands = forwarded.as_ref().copied().unwrap_or_default(),
        skipped = reader.skipped(),
        states = written,
        "session finished"
    );

    forwarded.map(|_| ())
}

/// Loads the configuration and applies CLI overrides.
fn load_config(
    path: &Path,
    tick_interval: Option<Duration>,
    seed: Option<u64>,
) -> Result<Arc<GovernanceConfig>, ConfigError> {
    let path = resolve_config_path(path);
    tracing::info!(config = %path.display(), "loading configuration");
    let result = ConfigLoader::with_defaults().load(&path)?;

    for warning in &result.warnings {
        tracing::warn!(
            location = warning.location.as_deref().unwrap_or("<unknown>"),
            "{}",
            warning.message
        );
    }

    if tick_interval.is_none() && seed.is_none() {
        return Ok(result.config);
    }

    let mut config = (*result.config).clone();
    if let Some(interval) = tick_interval {
        config.tick_interval_ms = tick_interval_ms(interval)?;
    }
    if seed.is_some() {
        config.seed = seed;
    }
    Ok(Arc::new(config))
}

fn tick_interval_ms(interval: Duration) -> Result<u64, ConfigError> {
    let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
    if ms == 0 || ms > MAX_TICK_INTERVAL_MS {
        return Err(ConfigError::InvalidValue {
            field: "--tick-interval".to_string(),
            value: humantime::format_duration(interval).to_string(),
            expected: format!("between 1ms and {MAX_TICK_INTERVAL_MS}ms"),
        });
    }
    Ok(ms)
}
