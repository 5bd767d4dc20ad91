//! Service configuration
//!
//! Everything is read from the process environment (after `.env` has been
//! loaded by the binary). Unset values fall back to the defaults below.

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::error::ServiceError;
use crate::Result;

pub const DEFAULT_PORT: u16 = 8001;
pub const DEFAULT_KNOWLEDGE_PATH: &str = "knowledge.json";
pub const DEFAULT_ORCHESTRATOR_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_WORKER_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    pub host: String,
    pub port: u16,
    pub knowledge_path: PathBuf,
    pub orchestrator_model: String,
    pub worker_model: String,
    /// Delay after every emitted stream frame
    pub stream_pacing: Duration,
    pub session_idle_ttl: Duration,
    pub max_active_sessions: usize,
    /// Hard ceiling on tool-calling model turns per user message
    pub max_tool_rounds: u32,
    pub enable_memory_agent: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            knowledge_path: PathBuf::from(DEFAULT_KNOWLEDGE_PATH),
            orchestrator_model: DEFAULT_ORCHESTRATOR_MODEL.to_string(),
            worker_model: DEFAULT_WORKER_MODEL.to_string(),
            stream_pacing: Duration::from_millis(80),
            session_idle_ttl: Duration::from_secs(3600),
            max_active_sessions: 1024,
            max_tool_rounds: 4,
            enable_memory_agent: false,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let gemini_api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("GOOGLE_API_KEY"))
            .unwrap_or_default();
        if gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; model calls will be rejected");
        }

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => parse_value("PORT", &raw)?,
            None => defaults.port,
        };

        let stream_pacing = match lookup("STREAM_PACING_MS") {
            Some(raw) => Duration::from_millis(parse_value("STREAM_PACING_MS", &raw)?),
            None => defaults.stream_pacing,
        };

        let session_idle_ttl = match lookup("SESSION_IDLE_TTL_SECS") {
            Some(raw) => Duration::from_secs(parse_value("SESSION_IDLE_TTL_SECS", &raw)?),
            None => defaults.session_idle_ttl,
        };

        let max_active_sessions = match lookup("MAX_ACTIVE_SESSIONS") {
            Some(raw) => parse_value("MAX_ACTIVE_SESSIONS", &raw)?,
            None => defaults.max_active_sessions,
        };
        if max_active_sessions == 0 {
            return Err(ServiceError::Config(
                "MAX_ACTIVE_SESSIONS must be at least 1".to_string(),
            ));
        }

        let max_tool_rounds = match lookup("MAX_TOOL_ROUNDS") {
            Some(raw) => parse_value("MAX_TOOL_ROUNDS", &raw)?,
            None => defaults.max_tool_rounds,
        };

        let enable_memory_agent = match lookup("ENABLE_MEMORY_AGENT") {
            Some(raw) => parse_flag("ENABLE_MEMORY_AGENT", &raw)?,
            None => defaults.enable_memory_agent,
        };

        Ok(Self {
            gemini_api_key,
            gemini_base_url: lookup("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            host: lookup("HOST").unwrap_or(defaults.host),
            port,
            knowledge_path: lookup("KNOWLEDGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.knowledge_path),
            orchestrator_model: lookup("ORCHESTRATOR_MODEL")
                .unwrap_or(defaults.orchestrator_model),
            worker_model: lookup("WORKER_MODEL").unwrap_or(defaults.worker_model),
            stream_pacing,
            session_idle_ttl,
            max_active_sessions,
            max_tool_rounds,
            enable_memory_agent,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::Config(format!("{} has invalid value '{}'", key, raw)))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ServiceError::Config(format!(
            "{} has invalid value '{}'",
            key, raw
        ))),
    }
}
