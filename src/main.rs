use std::sync::Arc;

use anyhow::Context;
use tracing::instrument::WithSubscriber;

use inbox_sweep::config::FilterConfig;
use inbox_sweep::gmail::GmailClient;
use inbox_sweep::llm::OllamaProvider;
use inbox_sweep::logging::Logging;
use inbox_sweep::pipeline::{EmailAnalyzer, InboxFilter, RunOptions, RunReport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = FilterConfig::from_env().context("Failed to load configuration")?;
    let logging = Logging::init(&config.logging).context("Failed to initialize logging")?;

    eprintln!("📬 inbox-sweep v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {} ({})", config.ollama.model, config.ollama.api_url);
    eprintln!("   Label: {}", config.label_name);
    eprintln!("   Max emails: {}", config.max_emails);
    if let Some(file) = &config.logging.file {
        eprintln!("   Log file: {}", file.display());
    }
    eprintln!();

    let label_name = config.label_name.clone();
    let dispatch = logging.dispatch().clone();

    let report = async {
        let result = run(config).await;
        if let Err(e) = &result {
            tracing::error!(error = %format!("{e:#}"), "Run aborted");
        }
        result
    }
    .with_subscriber(dispatch)
    .await?;

    eprintln!();
    if let Some(path) = &report.results_file {
        eprintln!("   Results saved to {}", path.display());
    }
    eprintln!("   Total emails processed: {}", report.processed.len());
    eprintln!(
        "   Unnecessary emails moved to '{}': {}",
        label_name,
        report.unnecessary.len()
    );
    eprintln!("   Review that label in Gmail to confirm they are indeed unnecessary.");

    drop(logging);
    Ok(())
}

async fn run(config: FilterConfig) -> anyhow::Result<RunReport> {
    let ollama = OllamaProvider::new(&config.ollama).context("Failed to set up Ollama client")?;
    let analyzer = EmailAnalyzer::new(Arc::new(ollama), config.body_preview_length);

    let gmail = GmailClient::from_token_file(&config.token_file, config.retry)
        .context("Error connecting to Gmail")?;

    let filter = InboxFilter::new(Arc::new(gmail), analyzer, RunOptions::from(&config));
    let report = filter.run().await.context("Filter run failed")?;
    Ok(report)
}
