//! Smart Audit
//!
//! A chat backend that answers financial-analysis questions through a small
//! pipeline of Gemini-backed agents:
//! - MemoryAgent resolves references across turns (optional)
//! - MatchingAgent looks facts up in a static knowledge base
//! - ConversationAgent writes the narrative answer
//! - FinanceOrchestrator drives the others as function-call tools
//!
//! PIPELINE:
//! REQUEST → REGISTRY → RUNNER → (SUB-AGENT CALLS)* → FINAL ANSWER → SSE FRAMES

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod frames;
pub mod gemini;
pub mod knowledge;
pub mod models;
pub mod registry;
pub mod runner;
pub mod session;
pub mod trace;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, ServiceError};

// Re-export common types
pub use models::*;
pub use registry::RunnerRegistry;
pub use runner::Runner;
