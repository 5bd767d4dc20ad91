use smart_audit::{
    config::DEFAULT_KNOWLEDGE_PATH,
    knowledge::{write_knowledge_base, HuggingFaceRows, KnowledgeBuilder},
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let output_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_KNOWLEDGE_PATH.to_string());

    info!("Fetching financial data from FinanceBench");

    let mut source = HuggingFaceRows::financebench();
    let knowledge = KnowledgeBuilder::new().build(&mut source).await?;

    write_knowledge_base(&knowledge, &output_path)?;

    println!(
        "{} created with {} peer examples and {} benchmark tables",
        output_path,
        knowledge.peer_examples.len(),
        knowledge.industry_benchmarks.len()
    );

    Ok(())
}
