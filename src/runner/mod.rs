//! Agent runner - drives one agent graph against one session
//!
//! USER MESSAGE → ROOT MODEL → (SUB-AGENT CALLS → ROOT MODEL)* → FINAL ANSWER
//!
//! Every step is yielded as an [`AgentEvent`] as it happens; the session only
//! records a turn once it reaches a final response.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::agents::Agent;
use crate::error::ServiceError;
use crate::gemini::{GenerateRequest, ModelBackend};
use crate::models::{AgentEvent, Content, FunctionCall, Part};
use crate::session::{SessionKey, SessionService};
use crate::Result;

pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 4;

pub type EventStream = BoxStream<'static, Result<AgentEvent>>;

pub struct Runner {
    app_name: String,
    root: Arc<Agent>,
    sessions: Arc<dyn SessionService>,
    backend: Arc<dyn ModelBackend>,
    max_tool_rounds: u32,
}

impl Runner {
    pub fn new(
        app_name: impl Into<String>,
        root: Arc<Agent>,
        sessions: Arc<dyn SessionService>,
        backend: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            root,
            sessions,
            backend,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_max_tool_rounds(mut self, max_tool_rounds: u32) -> Self {
        self.max_tool_rounds = max_tool_rounds;
        self
    }

    /// Run one user turn. The stream ends after the final response or the
    /// first error.
    pub fn run(&self, user_id: &str, session_id: &str, message: Content) -> EventStream {
        let key = SessionKey::new(&self.app_name, user_id, session_id);
        let root = Arc::clone(&self.root);
        let sessions = Arc::clone(&self.sessions);
        let backend = Arc::clone(&self.backend);
        let max_tool_rounds = self.max_tool_rounds;

        async_stream::try_stream! {
            let session = sessions
                .get_session(&key)
                .await?
                .ok_or_else(|| ServiceError::Session(format!("session {} not found", key)))?;

            let mut history = session.history();
            // Saved only when the turn reaches a final response.
            let mut pending = vec![AgentEvent::new("user", Some(message))];
            history.extend(pending[0].content.clone());

            info!(session = %key, agent = %root.name, "Turn started");

            let mut tool_rounds = 0u32;
            loop {
                let mut request = GenerateRequest::new(&root.instruction, history.clone())
                    .with_functions(root.tool_declarations());
                if let Some(config) = &root.generation_config {
                    request = request.with_generation_config(config.clone());
                }

                let content = backend
                    .generate(&root.model, &request)
                    .await?
                    .into_content()
                    .map(|mut c| {
                        c.role = Some("model".to_string());
                        c
                    });

                let event = AgentEvent::new(&root.name, content);
                let calls: Vec<FunctionCall> =
                    event.function_calls().into_iter().cloned().collect();

                history.extend(event.content.clone());
                pending.push(event.clone());

                if calls.is_empty() {
                    for buffered in pending.drain(..) {
                        sessions.append_event(&key, buffered).await?;
                    }
                    debug!(session = %key, tool_rounds, "Turn finished");
                    yield event;
                    break;
                }
                yield event;

                tool_rounds += 1;
                if tool_rounds > max_tool_rounds {
                    warn!(session = %key, max_tool_rounds, "Tool round ceiling hit");
                    Err::<(), ServiceError>(ServiceError::ToolRoundLimit(max_tool_rounds))?;
                }

                let mut parts = Vec::with_capacity(calls.len());
                for call in &calls {
                    let response = call_agent_tool(&root, backend.as_ref(), call).await?;
                    parts.push(Part::function_response(call.name.clone(), response));
                }

                let response_event = AgentEvent::new(
                    &root.name,
                    Some(Content {
                        role: Some("user".to_string()),
                        parts,
                    }),
                );
                history.extend(response_event.content.clone());
                pending.push(response_event.clone());
                yield response_event;
            }
        }
        .boxed()
    }
}

/// Run a sub-agent for one function call; its text becomes `{"result": ...}`.
async fn call_agent_tool(
    parent: &Agent,
    backend: &dyn ModelBackend,
    call: &FunctionCall,
) -> Result<Value> {
    let agent = parent
        .find_tool(&call.name)
        .ok_or_else(|| ServiceError::ToolNotFound(call.name.clone()))?;

    let request_text = call
        .args
        .get("request")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| call.args.to_string());

    let mut request = GenerateRequest::new(&agent.instruction, vec![Content::user_text(request_text)]);
    if let Some(config) = &agent.generation_config {
        request = request.with_generation_config(config.clone());
    }

    let text = backend
        .generate(&agent.model, &request)
        .await?
        .into_content()
        .map(|c| c.text())
        .unwrap_or_default();

    info!(agent = %agent.name, chars = text.len(), "Sub-agent responded");

    Ok(json!({ "result": text }))
}
