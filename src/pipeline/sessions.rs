// src/pipeline/sessions.rs
//! Session registry: one orchestrator per caller session, evicted when idle.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::orchestrator::{Collaborators, Orchestrator, PipelineSettings};
use crate::error::PipelineError;

lazy_static! {
    static ref SESSION_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,128}$").unwrap();
}

struct SessionEntry {
    orchestrator: Orchestrator,
    last_seen: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    collaborators: Collaborators,
    settings: PipelineSettings,
}

pub type SharedSessionRegistry = Arc<SessionRegistry>;

impl SessionRegistry {
    pub fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            collaborators,
            settings,
        }
    }

    pub fn validate_id(session_id: &str) -> Result<(), PipelineError> {
        if SESSION_ID.is_match(session_id) {
            Ok(())
        } else {
            Err(PipelineError::Validation(
                "Session id must be 1-128 characters of letters, digits, '-' or '_'".to_string(),
            ))
        }
    }

    /// Existing orchestrator for the session, or a new idle one.
    pub async fn get_or_create(&self, session_id: &str) -> Result<Orchestrator, PipelineError> {
        Self::validate_id(session_id)?;
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!("🆕 New session {}", session_id);
            SessionEntry {
                orchestrator: Orchestrator::new(self.collaborators.clone(), self.settings.clone()),
                last_seen: Utc::now(),
            }
        });
        entry.last_seen = Utc::now();
        Ok(entry.orchestrator.clone())
    }

    pub async fn get(&self, session_id: &str) -> Result<Orchestrator, PipelineError> {
        Self::validate_id(session_id)?;
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| PipelineError::NotFound(format!("Session '{}' not found", session_id)))?;
        entry.last_seen = Utc::now();
        Ok(entry.orchestrator.clone())
    }

    /// Forgets a session. Work already in flight finishes against the dropped run.
    pub async fn remove(&self, session_id: &str) -> Result<(), PipelineError> {
        Self::validate_id(session_id)?;
        match self.sessions.write().await.remove(session_id) {
            Some(_) => {
                tracing::info!("🗑️ Session {} closed", session_id);
                Ok(())
            }
            None => Err(PipelineError::NotFound(format!("Session '{}' not found", session_id))),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops sessions not touched for `max_age_hours`. Returns how many were removed.
    pub async fn cleanup_idle(&self, max_age_hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(max_age_hours);
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen >= cutoff);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!("🧹 Evicted {} idle sessions", removed);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_rules() {
        assert!(SessionRegistry::validate_id("browser-tab_01").is_ok());
        assert!(SessionRegistry::validate_id("").is_err());
        assert!(SessionRegistry::validate_id("../etc").is_err());
        assert!(SessionRegistry::validate_id(&"a".repeat(129)).is_err());
    }
}
