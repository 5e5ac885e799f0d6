use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use forward_assist::channels::{ImapMailSource, SmtpReplySender};
use forward_assist::config::{AssistConfig, EmailConfig, LlmConfig};
use forward_assist::llm::create_generator;
use forward_assist::pipeline::{
    InMemoryProcessedSet, IngestSettings, IngestionLoop, spawn_ingestion_loop,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let assist = AssistConfig::from_env().context("Invalid forward-assist configuration")?;
    let email = EmailConfig::from_env().context("Invalid email configuration")?;
    let llm = LlmConfig::from_env().context("Invalid LLM configuration")?;

    let markers = assist
        .load_markers()
        .context("Failed to load forward marker table")?;

    if assist.allowed_senders.is_empty() {
        warn!("FORWARD_ASSIST_ALLOWED_SENDERS is empty, every message will be skipped");
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        imap = %email.imap_host,
        smtp = %email.smtp_host,
        mailbox = %email.mailbox,
        model = %llm.model,
        poll_secs = assist.poll_interval.as_secs(),
        "Forward Assist starting"
    );

    // ── Collaborators ────────────────────────────────────────────────────
    let generator = create_generator(&llm).context("Failed to create generation backend")?;
    let settings = IngestSettings::from_config(&assist, &email.mailbox);

    let ingestion = Arc::new(IngestionLoop::new(
        Arc::new(ImapMailSource::new(email.clone())),
        generator,
        Arc::new(SmtpReplySender::new(email)),
        Arc::new(InMemoryProcessedSet::new()),
        Arc::new(markers),
        settings,
    ));

    let handle = spawn_ingestion_loop(Arc::clone(&ingestion), assist.poll_interval);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received, finishing current message");

    ingestion.shutdown();
    handle.await.context("Ingestion loop task failed")?;

    info!("Forward Assist stopped");
    Ok(())
}
