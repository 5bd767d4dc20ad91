use futures::StreamExt;
use smart_audit::{
    config::ServiceConfig,
    frames::{frame_stream, FrameKind},
    models::Content,
    registry::RunnerRegistry,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const CLI_USER: &str = "cli_user";
const CLI_SESSION: &str = "cli_session";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        eprintln!("usage: orchestrator <question>");
        std::process::exit(2);
    }

    let config = ServiceConfig::from_env()?;
    let registry = RunnerRegistry::from_config(&config)?;
    let runner = registry.resolve(CLI_SESSION, CLI_USER).await?;

    info!(query = %query, "Running single turn");

    let events = runner.run(CLI_USER, CLI_SESSION, Content::user_text(query));
    let mut frames = frame_stream(events, std::time::Duration::ZERO);

    let mut failed = false;
    while let Some(frame) = frames.next().await {
        match frame.kind {
            FrameKind::Trace => println!("[{}] {}", frame.agent, frame.content),
            FrameKind::Final => {
                println!("\n=== ANSWER ===\n{}", frame.content);
                println!(
                    "\nTrace: domain={} score={:.2} value={}",
                    frame.trace_data.domain,
                    frame.trace_data.score,
                    frame
                        .trace_data
                        .actual_value
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "n/a".to_string())
                );
            }
            FrameKind::Error => {
                eprintln!("{}", frame.content);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}
