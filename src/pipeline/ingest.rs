//! Ingestion loop: poll the mailbox, route each forwarded email through
//! parse → classify → generate → format → deliver, then commit.
//!
//! Per message:
//! 1. Skip identifiers already in the processed store
//! 2. Unauthorized senders are marked read and skipped
//! 3. Generation failure is replaced by a placeholder text, delivery still runs
//! 4. Delivery failure leaves the message unread and uncommitted for the next cycle
//! 5. On success the identifier is recorded first, then the message is marked read
//!
//! Cycles are single-flight: a cycle that finds another one running returns
//! immediately without touching the mailbox.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::AssistConfig;
use crate::parsing::{CompiledMarkers, ParsedForward, parse_forward};
use crate::pipeline::processed::ProcessedStore;
use crate::pipeline::types::{
    CycleReport, MailQuery, MailSource, RawEmail, ReplySender, TextGenerator,
};
use crate::tasks::{ResponseFormatter, TaskClassifier, TaskKind, assemble};

/// Reply text used when generation fails.
pub const GENERATION_FAILED_TEXT: &str = "Error generating response. Please try again.";

/// Max chars of message text shown in logs.
const LOG_PREVIEW_CHARS: usize = 100;

// ── Settings ────────────────────────────────────────────────────────

/// Loop parameters that do not belong to any collaborator.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub query: MailQuery,
    pub batch_size: usize,
    /// Substrings matched case-insensitively against `From`. `*` allows all.
    pub allowed_senders: Vec<String>,
    /// Fixed reply recipient. `None` replies to the forwarding sender.
    pub reply_to: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl IngestSettings {
    pub fn from_config(config: &AssistConfig, mailbox: &str) -> Self {
        Self {
            query: MailQuery {
                unread_only: true,
                mailbox: mailbox.to_string(),
            },
            batch_size: config.batch_size,
            allowed_senders: config.allowed_senders.clone(),
            reply_to: config.reply_to.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            query: MailQuery::unread_inbox(),
            batch_size: 10,
            allowed_senders: Vec::new(),
            reply_to: None,
            max_tokens: 500,
            temperature: 0.7,
        }
    }
}

/// Case-insensitive substring match of `from` against the allowlist.
///
/// An empty list denies everyone; a `*` entry allows everyone.
pub fn is_sender_allowed(from: &str, allowed: &[String]) -> bool {
    let from = from.to_lowercase();
    allowed.iter().any(|entry| {
        let entry = entry.trim();
        entry == "*" || (!entry.is_empty() && from.contains(&entry.to_lowercase()))
    })
}

// ── Loop ────────────────────────────────────────────────────────────

/// Result of handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Duplicate,
    Unauthorized,
    Delivered { task: TaskKind, message_id: String },
    /// Left unread for the next cycle.
    Failed,
}

/// Drives forwarded emails from the mail source to the reply sender.
pub struct IngestionLoop {
    source: Arc<dyn MailSource>,
    generator: Arc<dyn TextGenerator>,
    sender: Arc<dyn ReplySender>,
    processed: Arc<dyn ProcessedStore>,
    markers: Arc<CompiledMarkers>,
    classifier: TaskClassifier,
    formatter: ResponseFormatter,
    settings: IngestSettings,
    cycle_lock: Mutex<()>,
    shutdown: watch::Sender<bool>,
}

impl IngestionLoop {
    pub fn new(
        source: Arc<dyn MailSource>,
        generator: Arc<dyn TextGenerator>,
        sender: Arc<dyn ReplySender>,
        processed: Arc<dyn ProcessedStore>,
        markers: Arc<CompiledMarkers>,
        settings: IngestSettings,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            source,
            generator,
            sender,
            processed,
            markers,
            classifier: TaskClassifier::default(),
            formatter: ResponseFormatter::new(),
            settings,
            cycle_lock: Mutex::new(()),
            shutdown,
        }
    }

    /// Ask the loop to stop. The running cycle finishes its current message.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Run one poll cycle.
    ///
    /// Returns `None` without doing anything if another cycle is in flight.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("Previous cycle still running, skipping");
            return None;
        };

        let started = Instant::now();
        let mut report = CycleReport::default();

        let refs = match self
            .source
            .list_unread(&self.settings.query, self.settings.batch_size)
            .await
        {
            Ok(refs) => refs,
            Err(e) => {
                error!(error = %e, "Failed to list unread messages");
                report.elapsed = started.elapsed();
                return Some(report);
            }
        };

        report.fetched = refs.len();
        if !refs.is_empty() {
            info!(count = refs.len(), "Processing unread message(s)");
        }

        for message in refs.iter().take(self.settings.batch_size) {
            if self.is_shutting_down() {
                info!("Shutdown requested, leaving remaining messages for later");
                report.interrupted = true;
                break;
            }

            match self.process_message(&message.id).await {
                MessageOutcome::Duplicate => report.skipped_duplicates += 1,
                MessageOutcome::Unauthorized => report.unauthorized += 1,
                MessageOutcome::Delivered { .. } => report.delivered += 1,
                MessageOutcome::Failed => report.failed += 1,
            }
        }

        report.elapsed = started.elapsed();
        if report.fetched > 0 {
            info!(
                fetched = report.fetched,
                delivered = report.delivered,
                unauthorized = report.unauthorized,
                duplicates = report.skipped_duplicates,
                failed = report.failed,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Cycle finished"
            );
        }
        Some(report)
    }

    /// Run the full per-message pipeline for `id`.
    pub async fn process_message(&self, id: &str) -> MessageOutcome {
        if self.processed.contains(id).await {
            debug!(id = %id, "Already processed, skipping");
            return MessageOutcome::Duplicate;
        }

        let email = match self.source.get_full(id).await {
            Ok(email) => email,
            Err(e) => {
                error!(id = %id, error = %e, "Failed to fetch message");
                return MessageOutcome::Failed;
            }
        };

        if !is_sender_allowed(&email.from, &self.settings.allowed_senders) {
            warn!(id = %id, from = %email.from, "Skipping message from unauthorized sender");
            if let Err(e) = self.source.mark_read(id).await {
                warn!(id = %id, error = %e, "Failed to mark unauthorized message read");
            }
            return MessageOutcome::Unauthorized;
        }

        let parsed = parse_forward(&email.body_text, &self.markers);
        log_parse_anomalies(id, &parsed);

        let task = self.classifier.classify(&parsed.instructions);
        debug!(
            id = %id,
            task = task.label(),
            instructions = %preview(&parsed.instructions),
            "Classified message"
        );

        let generated = self.generate(id, task, &parsed).await;
        let to = self.reply_recipient(&email);
        let envelope = self
            .formatter
            .format(task, &generated, &parsed.original_subject, &to);

        let message_id = match self.sender.send(&envelope).await {
            Ok(message_id) => message_id,
            Err(e) => {
                error!(id = %id, to = %to, error = %e, "Failed to deliver reply, will retry");
                return MessageOutcome::Failed;
            }
        };

        self.processed.insert(id).await;
        if let Err(e) = self.source.mark_read(id).await {
            warn!(id = %id, error = %e, "Failed to mark message read");
        }

        info!(
            id = %id,
            task = task.label(),
            to = %to,
            message_id = %message_id,
            subject = %preview(&envelope.subject),
            "Reply delivered"
        );
        MessageOutcome::Delivered { task, message_id }
    }

    async fn generate(&self, id: &str, task: TaskKind, parsed: &ParsedForward) -> String {
        let prompt = match assemble(task, parsed) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(id = %id, task = task.label(), error = %e, "Prompt assembly failed");
                return GENERATION_FAILED_TEXT.to_string();
            }
        };

        match self
            .generator
            .complete(
                &prompt.system_role,
                &prompt.user_prompt,
                self.settings.max_tokens,
                self.settings.temperature,
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                error!(
                    id = %id,
                    backend = self.generator.name(),
                    error = %e,
                    "Generation failed, sending placeholder"
                );
                GENERATION_FAILED_TEXT.to_string()
            }
        }
    }

    fn reply_recipient(&self, email: &RawEmail) -> String {
        self.settings
            .reply_to
            .clone()
            .unwrap_or_else(|| email.from_address().to_string())
    }
}

fn log_parse_anomalies(id: &str, parsed: &ParsedForward) {
    if parsed.original_sender.is_empty() && parsed.original_subject.is_empty() {
        debug!(id = %id, "No forwarded headers found, using full body as content");
    }
    if parsed.instructions.is_empty() {
        debug!(id = %id, "No instructions found");
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(LOG_PREVIEW_CHARS).collect();
    if text.chars().count() > LOG_PREVIEW_CHARS {
        out.push('…');
    }
    out
}

// ── Scheduling ──────────────────────────────────────────────────────

/// Spawn the periodic loop. The first cycle runs immediately.
///
/// Stop it with [`IngestionLoop::shutdown`] and await the handle.
pub fn spawn_ingestion_loop(ingestion: Arc<IngestionLoop>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(period_secs = period.as_secs(), "Ingestion loop started");

        let mut shutdown = ingestion.subscribe_shutdown();
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.changed() => {}
            }

            if ingestion.is_shutting_down() {
                info!("Ingestion loop shutting down");
                return;
            }

            ingestion.run_cycle().await;
        }
    })
}
