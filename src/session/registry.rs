//! Registry of concurrently running sessions.
//!
//! Sessions share nothing mutable; the registry only maps ids to handles and
//! tasks. Every session token is a child of the registry token so one
//! cancellation tears all of them down. `session run` registers its single
//! session here; embedders hosting several sessions use the same API.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::schema::GovernanceConfig;
use crate::error::{SessionError, ZoneGateError};
use crate::observability::events::EventEmitter;
use crate::session::{Session, SessionHandle, SessionSummary};

#[derive(Debug)]
struct RegisteredSession {
    handle: SessionHandle,
    task: JoinHandle<SessionSummary>,
}

/// Id-keyed set of running sessions.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, RegisteredSession>,
    cancel: CancellationToken,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry whose sessions stop when `cancel` fires.
    #[must_use]
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            sessions: DashMap::new(),
            cancel,
        }
    }

    /// Configures and starts a session under `id`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyExists` if `id` is taken, or a
    /// configuration error if the session cannot be configured.
    pub fn create(
        &self,
        id: &str,
        config: Arc<GovernanceConfig>,
        emitter: Arc<EventEmitter>,
    ) -> Result<SessionHandle, ZoneGateError> {
        match self.sessions.entry(id.to_string()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyExists(id.to_string()).into()),
            Entry::Vacant(slot) => {
                let session =
                    Session::new(id, config, emitter)?.with_cancel(self.cancel.child_token());
                let (handle, task) = session.spawn();
                slot.insert(RegisteredSession {
                    handle: handle.clone(),
                    task,
                });
                info!(session_id = id, "session registered");
                Ok(handle)
            }
        }
    }

    /// Handle for a running session.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.get(id).map(|entry| entry.handle.clone())
    }

    /// Stops the session under `id` and waits for it.
    ///
    /// Returns `None` if no such session is registered.
    pub async fn remove(&self, id: &str) -> Option<Result<SessionSummary, SessionError>> {
        self.sessions.get(id)?.handle.shutdown();
        self.finish(id).await
    }

    /// Unregisters the session under `id` without cancelling it and waits
    /// for it to end.
    ///
    /// The registry's handle is dropped, so once every caller handle is
    /// gone the session drains its queue and stops with `EndOfInput`.
    /// Returns `None` if no such session is registered.
    pub async fn finish(&self, id: &str) -> Option<Result<SessionSummary, SessionError>> {
        let (_, RegisteredSession { handle, task }) = self.sessions.remove(id)?;
        drop(handle);
        let result = task
            .await
            .map_err(|err| SessionError::TaskFailed(err.to_string()));
        if let Err(err) = &result {
            warn!(session_id = id, error = %err, "session task failed");
        }
        Some(result)
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Registered ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Stops every session and collects the summaries of those that
    /// finished cleanly.
    pub async fn shutdown_all(&self) -> Vec<SessionSummary> {
        self.cancel.cancel();
        let mut summaries = Vec::new();
        for id in self.ids() {
            if let Some(Ok(summary)) = self.remove(&id).await {
                summaries.push(summary);
            }
        }
        summaries
    }
}
