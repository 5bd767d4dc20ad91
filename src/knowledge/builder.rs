//! Offline knowledge base builder

use serde_json::Value;
use std::path::Path;
use tracing::info;

use super::dataset::{DatasetRecord, DatasetSource};
use super::{default_benchmarks, KnowledgeBase, PeerExample};
use crate::Result;

/// Upper bound on peer examples kept from the dataset
pub const MAX_PEER_EXAMPLES: usize = 1000;

pub struct KnowledgeBuilder {
    limit: usize,
}

impl KnowledgeBuilder {
    pub fn new() -> Self {
        Self {
            limit: MAX_PEER_EXAMPLES,
        }
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { limit }
    }

    /// Pull pages from `source` until `limit` examples are collected or the
    /// dataset runs out.
    pub async fn build(&self, source: &mut dyn DatasetSource) -> Result<KnowledgeBase> {
        let mut records: Vec<DatasetRecord> = Vec::with_capacity(self.limit);

        while records.len() < self.limit {
            let Some(batch) = source.next_batch().await? else {
                break;
            };
            let room = self.limit - records.len();
            records.extend(batch.into_iter().take(room));
        }

        Ok(self.build_from_records(records))
    }

    pub fn build_from_records<I>(&self, records: I) -> KnowledgeBase
    where
        I: IntoIterator<Item = DatasetRecord>,
    {
        let peer_examples = records
            .into_iter()
            .take(self.limit)
            .map(|record| PeerExample {
                company: field_text(&record, "company", "N/A"),
                context: field_text(&record, "question", ""),
                fact: field_text(&record, "answer", ""),
            })
            .collect();

        KnowledgeBase {
            industry_benchmarks: default_benchmarks(),
            peer_examples,
        }
    }
}

impl Default for KnowledgeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build with the default limit from an in-memory record sequence.
pub fn build_knowledge_base<I>(records: I) -> KnowledgeBase
where
    I: IntoIterator<Item = DatasetRecord>,
{
    KnowledgeBuilder::new().build_from_records(records)
}

pub fn write_knowledge_base(knowledge: &KnowledgeBase, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(knowledge)?;
    std::fs::write(path, json)?;

    info!(
        path = %path.display(),
        peer_examples = knowledge.peer_examples.len(),
        "Knowledge base written"
    );
    Ok(())
}

fn field_text(record: &DatasetRecord, key: &str, default: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}
