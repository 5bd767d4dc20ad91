//! Core data models for the audit pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

//
// ================= Message Content =================
//

/// A message in Gemini's wire shape: a role plus ordered parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part::text(text)],
        }
    }

    /// Concatenation of every text part, no separator.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| !p.thought.unwrap_or(false))
            .filter_map(|p| p.text.as_deref())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
    /// Opaque signature the model expects back when its turn is replayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<FunctionResponse>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
            ..Default::default()
        }
    }

    pub fn function_response(name: impl Into<String>, response: Value) -> Self {
        Self {
            function_response: Some(FunctionResponse {
                name: name.into(),
                response,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(default)]
    pub response: Value,
}

//
// ================= Agent Events =================
//

/// One step of a runner turn, as yielded to callers and stored in the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_id: Uuid,
    pub author: String,
    pub content: Option<Content>,
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(author: impl Into<String>, content: Option<Content>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            author: author.into(),
            content,
            timestamp: Utc::now(),
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts().filter_map(|p| p.function_call.as_ref()).collect()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts()
            .filter_map(|p| p.function_response.as_ref())
            .collect()
    }

    /// An event is final when it neither requests nor answers a tool call and
    /// is not a thought-only packet.
    pub fn is_final_response(&self) -> bool {
        let has_tool_part = self
            .parts()
            .any(|p| p.function_call.is_some() || p.function_response.is_some());
        let thought_only =
            self.parts().next().is_some() && self.parts().all(|p| p.thought.unwrap_or(false));

        !has_tool_part && !thought_only
    }

    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::text).unwrap_or_default()
    }

    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.content.iter().flat_map(|c| c.parts.iter())
    }
}

//
// ================= Financial Audit =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditStatus {
    #[serde(rename = "Peer Match")]
    PeerMatch,
    #[serde(rename = "Above Target")]
    AboveTarget,
    #[serde(rename = "Below Target")]
    BelowTarget,
    Missing,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuditStatus::PeerMatch => "Peer Match",
            AuditStatus::AboveTarget => "Above Target",
            AuditStatus::BelowTarget => "Below Target",
            AuditStatus::Missing => "Missing",
        };
        f.write_str(label)
    }
}

/// The object MatchingAgent is instructed to emit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinancialAudit {
    pub primary_metric: String,
    pub value: f64,
    pub status: AuditStatus,
    #[serde(default)]
    pub context: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEnvelope {
    pub financial_audit: FinancialAudit,
}

//
// ================= Trace Side Channel =================
//

/// Cumulative trace snapshot sent with every stream frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceData {
    pub memory_context: String,
    pub domain: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<f64>,
}

impl Default for TraceData {
    fn default() -> Self {
        Self {
            memory_context: "N/A".to_string(),
            domain: "N/A".to_string(),
            score: 0.0,
            actual_value: None,
        }
    }
}
