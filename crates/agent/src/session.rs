//! Streaming session registry.
//!
//! Tracks in-flight streaming runs by an opaque session id. Each session
//! carries a monotonic cancellation flag that the producing task polls
//! before every emission; callers flip it through [`SessionManager::cancel`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use stepwise_core::error::SessionError;
use tracing::{debug, info};

struct SessionEntry {
    conversation_id: String,
    message: String,
    cancelled: AtomicBool,
    created_at: DateTime<Utc>,
    started: Instant,
}

/// A point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub conversation_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Concurrent registry of streaming sessions.
///
/// The map lock is held only for lookups and inserts; cancellation flips a
/// per-session atomic, so no operation ever spans more than one session.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session with its cancellation flag cleared.
    pub fn create(
        &self,
        session_id: &str,
        conversation_id: &str,
        message: &str,
    ) -> Result<(), SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::InvalidId);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }
        sessions.insert(
            session_id.to_string(),
            Arc::new(SessionEntry {
                conversation_id: conversation_id.to_string(),
                message: message.to_string(),
                cancelled: AtomicBool::new(false),
                created_at: Utc::now(),
                started: Instant::now(),
            }),
        );
        info!(session_id, conversation_id, "Streaming session created");
        Ok(())
    }

    /// False if the session is unknown or cancelled.
    pub fn should_continue(&self, session_id: &str) -> bool {
        self.entry(session_id)
            .is_some_and(|e| !e.cancelled.load(Ordering::Acquire))
    }

    /// Set the cancellation flag. Returns whether there was a live session
    /// to stop; a second cancel reports `false`.
    pub fn cancel(&self, session_id: &str) -> bool {
        let Some(entry) = self.entry(session_id) else {
            debug!(session_id, "Cancel requested for unknown session");
            return false;
        };
        let stopped = !entry.cancelled.swap(true, Ordering::AcqRel);
        if stopped {
            info!(session_id, "Streaming session cancelled");
        }
        stopped
    }

    /// Remove the session. Safe to call more than once.
    pub fn cleanup(&self, session_id: &str) {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
        if removed.is_some() {
            debug!(session_id, "Streaming session cleaned up");
        }
    }

    /// Cancel every tracked session and clear the registry.
    ///
    /// Returns the number of sessions that were tracked.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (_, entry) in &drained {
            entry.cancelled.store(true, Ordering::Release);
        }
        info!(count = drained.len(), "All streaming sessions cancelled");
        drained.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn status(&self, session_id: &str) -> Result<SessionStatus, SessionError> {
        let entry = self
            .entry(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(SessionStatus {
            session_id: session_id.to_string(),
            conversation_id: entry.conversation_id.clone(),
            message: entry.message.clone(),
            created_at: entry.created_at,
            cancelled: entry.cancelled.load(Ordering::Acquire),
            duration_ms: entry.started.elapsed().as_millis() as u64,
        })
    }

    pub fn conversation_id(&self, session_id: &str) -> Option<String> {
        self.entry(session_id).map(|e| e.conversation_id.clone())
    }

    fn entry(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned()
    }
}
