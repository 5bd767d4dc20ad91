//! Session persistence layer
//!
//! Each session keeps the ordered events of its conversation so the root
//! agent sees earlier turns. Currently in-memory only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::ServiceError;
use crate::models::{AgentEvent, Content};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub events: Vec<AgentEvent>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            events: Vec::new(),
            created_at: now,
            last_update: now,
        }
    }

    /// Conversation contents in order, ready to replay to the model.
    pub fn history(&self) -> Vec<Content> {
        self.events
            .iter()
            .filter_map(|e| e.content.clone())
            .collect()
    }
}

/// Trait for session persistence
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// `Ok(None)` means the session does not exist; `Err` means the store failed.
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>>;
    async fn create_session(&self, key: &SessionKey) -> Result<Session>;
    async fn append_event(&self, key: &SessionKey, event: AgentEvent) -> Result<()>;
    /// Drop the session and its history. Deleting an absent session is not an error.
    async fn delete_session(&self, key: &SessionKey) -> Result<()>;
}

/// In-memory session store
pub struct InMemorySessionService {
    sessions: Arc<RwLock<HashMap<SessionKey, Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SessionService for InMemorySessionService {
    async fn get_session(&self, key: &SessionKey) -> Result<Option<Session>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(key).cloned())
    }

    async fn create_session(&self, key: &SessionKey) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(key) {
            return Err(ServiceError::Session(format!(
                "session {} already exists",
                key
            )));
        }

        let session = Session::new(key.clone());
        sessions.insert(key.clone(), session.clone());
        Ok(session)
    }

    async fn append_event(&self, key: &SessionKey, event: AgentEvent) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(key)
            .ok_or_else(|| ServiceError::Session(format!("session {} not found", key)))?;

        session.last_update = event.timestamp;
        session.events.push(event);
        Ok(())
    }

    async fn delete_session(&self, key: &SessionKey) -> Result<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }
}
