//! Scripted model backend shared by unit tests

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ServiceError;
use crate::gemini::{GenerateRequest, GenerateResponse, ModelBackend};
use crate::Result;

/// Replays queued replies in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<GenerateResponse>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, response: GenerateResponse) -> Self {
        self.replies.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn fail(self, error: ServiceError) -> Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    /// `(model, serialized request)` per call, oldest first.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<GenerateResponse> {
        let body = serde_json::to_value(request)?;
        self.calls.lock().unwrap().push((model.to_string(), body));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Llm("script exhausted".into())))
    }
}

pub fn response_from(value: Value) -> GenerateResponse {
    serde_json::from_value(value).unwrap()
}

pub fn text_response(text: &str) -> GenerateResponse {
    response_from(json!({
        "candidates": [{"content": {"role": "model", "parts": [{"text": text}]}, "finishReason": "STOP"}]
    }))
}

pub fn call_response(agent: &str, request: &str) -> GenerateResponse {
    response_from(json!({
        "candidates": [{"content": {"role": "model", "parts": [
            {"functionCall": {"name": agent, "args": {"request": request}}}
        ]}}]
    }))
}
