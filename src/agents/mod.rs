//! Agent declarations
//!
//! Four agents make up the audit pipeline. The root agent sees the others as
//! callable functions; each sub-agent takes a single `request` string.

pub mod prompts;

use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::ServiceConfig;
use crate::gemini::{FunctionDeclaration, GenerationConfig};
use crate::knowledge::KnowledgeBase;
use crate::Result;

pub const MATCHING_AGENT: &str = "MatchingAgent";
pub const MEMORY_AGENT: &str = "MemoryAgent";
pub const CONVERSATION_AGENT: &str = "ConversationAgent";
pub const ORCHESTRATOR_AGENT: &str = "FinanceOrchestrator";

#[derive(Debug, Clone)]
pub struct Agent {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instruction: String,
    pub generation_config: Option<GenerationConfig>,
    pub tools: Vec<Arc<Agent>>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            model: model.into(),
            instruction: instruction.into(),
            generation_config: None,
            tools: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = Some(config);
        self
    }

    pub fn with_tool(mut self, tool: Arc<Agent>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<Agent>> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// How this agent is advertised to a parent model.
    pub fn function_declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "request": {"type": "STRING"}
                },
                "required": ["request"]
            }),
        }
    }

    pub fn tool_declarations(&self) -> Vec<FunctionDeclaration> {
        self.tools.iter().map(|t| t.function_declaration()).collect()
    }
}

pub fn matching_agent(model: &str, knowledge_block: &str) -> Agent {
    Agent::new(MATCHING_AGENT, model, prompts::matching_instruction(knowledge_block))
        .with_description(
            "Looks a financial fact up in the knowledge base and returns a financial_audit JSON object.",
        )
        .with_generation_config(GenerationConfig {
            temperature: Some(0.0),
            response_mime_type: None,
        })
}

pub fn memory_agent(model: &str) -> Agent {
    Agent::new(MEMORY_AGENT, model, prompts::MEMORY_INSTRUCTION).with_description(
        "Summarises the user's current intent in one sentence to resolve references across turns.",
    )
}

pub fn conversation_agent(model: &str) -> Agent {
    Agent::new(CONVERSATION_AGENT, model, prompts::CONVERSATION_INSTRUCTION).with_description(
        "Turns a financial_audit JSON object into a narrative answer for the user.",
    )
}

/// Build the root agent with its sub-agents attached as tools.
pub fn build_agent_graph(knowledge: &KnowledgeBase, config: &ServiceConfig) -> Result<Arc<Agent>> {
    let knowledge_block = knowledge.to_instruction_block()?;

    let mut root = Agent::new(
        ORCHESTRATOR_AGENT,
        &config.orchestrator_model,
        prompts::orchestrator_instruction(&knowledge_block),
    );

    // MemoryAgent is declared either way; it is only wired in on request.
    let memory = memory_agent(&config.worker_model);
    if config.enable_memory_agent {
        root = root.with_tool(Arc::new(memory));
    }

    let root = root
        .with_tool(Arc::new(matching_agent(&config.worker_model, &knowledge_block)))
        .with_tool(Arc::new(conversation_agent(&config.worker_model)));

    info!(
        root = %root.name,
        tools = ?root.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
        "Agent graph built"
    );

    Ok(Arc::new(root))
}
