//! Trace side channel for streamed turns
//!
//! Turns sub-agent calls and responses into short display strings and keeps a
//! cumulative [`TraceData`] snapshot fed by the memory and matching agents.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::agents::{MATCHING_AGENT, MEMORY_AGENT};
use crate::models::{AgentEvent, AuditEnvelope, FinancialAudit, TraceData};

const INTENT_EXCERPT_CHARS: usize = 60;
const MEMORY_FALLBACK: &str = "Analyzing current intent...";

#[derive(Debug, Error)]
pub enum TraceParseError {
    #[error("sub-agent result is not text")]
    MissingResult,

    #[error("malformed audit payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("confidence {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Parse MatchingAgent's free-text result into a typed audit.
///
/// `primary_metric`, `value`, `confidence` and a known `status` label are
/// required; `context` may be omitted. Anything else is rejected and the
/// caller keeps its previous snapshot.
pub fn parse_financial_audit(raw: &str) -> Result<FinancialAudit, TraceParseError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let envelope: AuditEnvelope = serde_json::from_str(cleaned.trim())?;
    let audit = envelope.financial_audit;

    if !(0.0..=1.0).contains(&audit.confidence) {
        return Err(TraceParseError::ConfidenceOutOfRange(audit.confidence));
    }
    Ok(audit)
}

#[derive(Debug, Default)]
pub struct TraceExtractor {
    data: TraceData,
}

impl TraceExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &TraceData {
        &self.data
    }

    /// Update the snapshot from `event` and return its display line, if any.
    /// When an event carries several parts the last one wins.
    pub fn observe(&mut self, event: &AgentEvent) -> Option<String> {
        let parts = event.content.as_ref().map(|c| c.parts.as_slice()).unwrap_or(&[]);
        let mut display = None;

        for part in parts {
            if let Some(call) = &part.function_call {
                let intent = call
                    .args
                    .get("request")
                    .and_then(Value::as_str)
                    .unwrap_or("Internal");
                display = Some(format!(
                    "EXEC_OP: {} -> TARGET_INTENT: '{}...'",
                    call.name,
                    excerpt(intent, INTENT_EXCERPT_CHARS)
                ));
            } else if let Some(response) = &part.function_response {
                display = Some(format!(
                    "DATA_RETURN: {} -> Status: SUCCESS_VALIDATED",
                    response.name
                ));

                if response.name.contains(MEMORY_AGENT) {
                    self.data.memory_context = response
                        .response
                        .get("result")
                        .and_then(Value::as_str)
                        .unwrap_or(MEMORY_FALLBACK)
                        .to_string();
                }

                if response.name.contains(MATCHING_AGENT) {
                    self.apply_audit(&response.response);
                }
            }
        }

        display
    }

    fn apply_audit(&mut self, response: &Value) {
        let parsed = response
            .get("result")
            .and_then(Value::as_str)
            .ok_or(TraceParseError::MissingResult)
            .and_then(parse_financial_audit);

        match parsed {
            Ok(audit) => {
                self.data.domain = audit.primary_metric;
                self.data.score = audit.confidence;
                self.data.actual_value = Some(audit.value);
            }
            Err(e) => debug!(error = %e, "Keeping previous trace; audit payload rejected"),
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
