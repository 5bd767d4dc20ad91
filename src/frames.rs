//! Turning runner events into client-facing output
//!
//! The streaming endpoint gets one [`StreamFrame`] per visible event; the
//! plain endpoint only needs the final text.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

use crate::error::ServiceError;
use crate::models::TraceData;
use crate::runner::EventStream;
use crate::trace::TraceExtractor;
use crate::Result;

const DEFAULT_AGENT_LABEL: &str = "Orchestrator";
const NO_RESPONSE: &str = "n/a";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    Trace,
    Final,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamFrame {
    pub agent: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    pub trace_data: TraceData,
}

impl StreamFrame {
    pub fn error(err: &ServiceError, trace_data: TraceData) -> Self {
        Self {
            agent: "System".to_string(),
            content: format!("Error: {}", err),
            kind: FrameKind::Error,
            trace_data,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

pub type FrameStream = BoxStream<'static, StreamFrame>;

/// Annotate and filter a turn's events. An error ends the stream after a
/// single error frame.
pub fn frame_stream(events: EventStream, pacing: Duration) -> FrameStream {
    Box::pin(async_stream::stream! {
        let mut events = events;
        let mut extractor = TraceExtractor::new();

        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "Turn failed mid-stream");
                    yield StreamFrame::error(&e, extractor.snapshot().clone());
                    pace(pacing).await;
                    break;
                }
            };

            let display = extractor.observe(&event);
            let is_final = event.is_final_response();

            let content = if is_final {
                event.text()
            } else {
                match display {
                    Some(display) => display,
                    None => continue,
                }
            };

            let agent = if event.author.is_empty() {
                DEFAULT_AGENT_LABEL.to_string()
            } else {
                event.author.clone()
            };

            yield StreamFrame {
                agent,
                content,
                kind: if is_final { FrameKind::Final } else { FrameKind::Trace },
                trace_data: extractor.snapshot().clone(),
            };
            pace(pacing).await;
        }
    })
}

/// A stream holding only the error frame, for failures before the turn starts.
pub fn error_frames(err: ServiceError) -> FrameStream {
    error!(error = %err, "Turn could not start");
    futures::stream::iter(vec![StreamFrame::error(&err, TraceData::default())]).boxed()
}

/// Drain a turn and return the text of its last final response.
pub async fn final_text(events: EventStream) -> Result<String> {
    let mut events = events;
    let mut response = NO_RESPONSE.to_string();

    while let Some(event) = events.next().await {
        let event = event?;
        if event.is_final_response() && event.content.is_some() {
            response = event.text();
        }
    }

    info!(chars = response.len(), "Turn completed");
    Ok(response)
}

async fn pace(pacing: Duration) {
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
}
