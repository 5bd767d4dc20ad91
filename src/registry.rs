//! Session/runner registry
//!
//! Maps a session id to its long-lived runner. Entries are dropped after an
//! idle TTL and the least recently used entry goes first when the registry is
//! full. An evicted entry takes its stored session history with it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::agents::{build_agent_graph, Agent};
use crate::config::ServiceConfig;
use crate::gemini::{GeminiClient, ModelBackend};
use crate::knowledge::KnowledgeBase;
use crate::runner::{Runner, DEFAULT_MAX_TOOL_ROUNDS};
use crate::session::{InMemorySessionService, SessionKey, SessionService};
use crate::Result;

pub const APP_NAME: &str = "SmartAudit";

struct RegistryEntry {
    /// Store keys created under this session id, one per user id seen.
    keys: Vec<SessionKey>,
    runner: Arc<Runner>,
    last_used: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryLimits {
    pub idle_ttl: Duration,
    pub max_entries: usize,
    pub max_tool_rounds: u32,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(3600),
            max_entries: 1024,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

impl RegistryLimits {
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self {
            idle_ttl: config.session_idle_ttl,
            max_entries: config.max_active_sessions,
            max_tool_rounds: config.max_tool_rounds,
        }
    }
}

pub struct RunnerRegistry {
    root: Arc<Agent>,
    sessions: Arc<dyn SessionService>,
    backend: Arc<dyn ModelBackend>,
    limits: RegistryLimits,
    runners: Mutex<HashMap<String, RegistryEntry>>,
}

impl RunnerRegistry {
    pub fn new(
        root: Arc<Agent>,
        sessions: Arc<dyn SessionService>,
        backend: Arc<dyn ModelBackend>,
        limits: RegistryLimits,
    ) -> Self {
        Self {
            root,
            sessions,
            backend,
            limits,
            runners: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: knowledge file, agent graph, Gemini, in-memory sessions.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let knowledge = KnowledgeBase::load(&config.knowledge_path)?;
        let root = build_agent_graph(&knowledge, config)?;
        let backend = GeminiClient::new(config.gemini_api_key.clone())
            .with_base_url(config.gemini_base_url.clone());

        Ok(Self::new(
            root,
            Arc::new(InMemorySessionService::new()),
            Arc::new(backend),
            RegistryLimits::from_config(config),
        ))
    }

    /// Ensure the session exists and return the runner bound to `session_id`.
    ///
    /// A session store failure is returned to the caller; only a confirmed
    /// absence leads to creating the session.
    pub async fn resolve(&self, session_id: &str, user_id: &str) -> Result<Arc<Runner>> {
        // Held across the whole check-then-create so concurrent first
        // requests for one id share a runner.
        let mut runners = self.runners.lock().await;

        let now = Instant::now();
        self.evict_idle(&mut runners, now).await?;

        let key = SessionKey::new(APP_NAME, user_id, session_id);
        if self.sessions.get_session(&key).await?.is_none() {
            self.sessions.create_session(&key).await?;
            info!(session = %key, "Session created");
        }

        if let Some(entry) = runners.get_mut(session_id) {
            entry.last_used = now;
            if !entry.keys.contains(&key) {
                entry.keys.push(key);
            }
            return Ok(Arc::clone(&entry.runner));
        }

        let runner = Arc::new(
            Runner::new(
                APP_NAME,
                Arc::clone(&self.root),
                Arc::clone(&self.sessions),
                Arc::clone(&self.backend),
            )
            .with_max_tool_rounds(self.limits.max_tool_rounds),
        );
        runners.insert(
            session_id.to_string(),
            RegistryEntry {
                keys: vec![key],
                runner: Arc::clone(&runner),
                last_used: now,
            },
        );
        info!(session_id, active = runners.len(), "Runner created");

        self.evict_overflow(&mut runners, session_id).await?;
        Ok(runner)
    }

    pub async fn active_runners(&self) -> usize {
        self.runners.lock().await.len()
    }

    async fn evict_idle(
        &self,
        runners: &mut HashMap<String, RegistryEntry>,
        now: Instant,
    ) -> Result<()> {
        let ttl = self.limits.idle_ttl;
        let expired: Vec<String> = runners
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.last_used) >= ttl)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in expired {
            debug!(session_id = %session_id, "Evicting idle session");
            self.evict(runners, &session_id).await?;
        }
        Ok(())
    }

    /// Trim to capacity, never evicting `keep`.
    async fn evict_overflow(
        &self,
        runners: &mut HashMap<String, RegistryEntry>,
        keep: &str,
    ) -> Result<()> {
        while runners.len() > self.limits.max_entries {
            let Some(oldest) = runners
                .iter()
                .filter(|(id, _)| id.as_str() != keep)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!(session_id = %oldest, "Evicting least recently used session");
            self.evict(runners, &oldest).await?;
        }
        Ok(())
    }

    async fn evict(&self, runners: &mut HashMap<String, RegistryEntry>, session_id: &str) -> Result<()> {
        if let Some(entry) = runners.remove(session_id) {
            for key in &entry.keys {
                self.sessions.delete_session(key).await?;
            }
        }
        Ok(())
    }
}
