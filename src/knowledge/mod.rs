//! Static knowledge base consulted by the matching and orchestrator agents
//!
//! Built offline by [`builder`], loaded whole at startup and inlined into
//! agent instructions.

pub mod builder;
pub mod dataset;

pub use builder::{build_knowledge_base, write_knowledge_base, KnowledgeBuilder, MAX_PEER_EXAMPLES};
pub use dataset::{DatasetRecord, DatasetSource, HuggingFaceRows};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::error::ServiceError;
use crate::Result;

/// sector → metric → target value
pub type IndustryBenchmarks = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerExample {
    pub company: String,
    pub context: String,
    pub fact: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub industry_benchmarks: IndustryBenchmarks,
    pub peer_examples: Vec<PeerExample>,
}

impl KnowledgeBase {
    /// Load the knowledge file. A missing or malformed file is fatal to startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::Knowledge(format!("cannot read {}: {}", path.display(), e))
        })?;
        let knowledge: KnowledgeBase = serde_json::from_str(&raw).map_err(|e| {
            ServiceError::Knowledge(format!("cannot parse {}: {}", path.display(), e))
        })?;

        info!(
            path = %path.display(),
            sectors = knowledge.industry_benchmarks.len(),
            peer_examples = knowledge.peer_examples.len(),
            "Knowledge base loaded"
        );
        Ok(knowledge)
    }

    /// Pretty-printed JSON for inlining into an instruction.
    pub fn to_instruction_block(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The two hand-maintained benchmark tables shipped with every knowledge file.
pub fn default_benchmarks() -> IndustryBenchmarks {
    let mut benchmarks = IndustryBenchmarks::new();
    benchmarks.insert(
        "SaaS".to_string(),
        BTreeMap::from([
            ("target_gross_margin".to_string(), 0.75),
            ("target_rule_of_40".to_string(), 0.40),
        ]),
    );
    benchmarks.insert(
        "Retail".to_string(),
        BTreeMap::from([
            ("target_inventory_turnover".to_string(), 6.0),
            ("target_operating_margin".to_string(), 0.10),
        ]),
    );
    benchmarks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_round_trips_written_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "industry_benchmarks": {{"SaaS": {{"target_gross_margin": 0.75}}}},
                "peer_examples": [{{"company": "3M", "context": "FY2018 capex?", "fact": "$1577.00"}}]
            }}"#
        )
        .unwrap();

        let knowledge = KnowledgeBase::load(file.path()).unwrap();
        assert_eq!(knowledge.peer_examples.len(), 1);
        assert_eq!(knowledge.peer_examples[0].company, "3M");
        assert_eq!(knowledge.industry_benchmarks["SaaS"]["target_gross_margin"], 0.75);
    }

    #[test]
    fn test_missing_file_is_knowledge_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = KnowledgeBase::load(dir.path().join("knowledge.json")).unwrap_err();
        assert!(matches!(err, ServiceError::Knowledge(_)));
    }

    #[test]
    fn test_default_benchmarks() {
        let benchmarks = default_benchmarks();
        assert_eq!(benchmarks.len(), 2);
        assert_eq!(benchmarks["Retail"]["target_inventory_turnover"], 6.0);
        assert_eq!(benchmarks["SaaS"]["target_rule_of_40"], 0.40);
    }

    #[test]
    fn test_instruction_block_is_json() {
        let knowledge = KnowledgeBase {
            industry_benchmarks: default_benchmarks(),
            peer_examples: vec![],
        };
        let block = knowledge.to_instruction_block().unwrap();
        let parsed: KnowledgeBase = serde_json::from_str(&block).unwrap();
        assert_eq!(parsed, knowledge);
    }
}
