//! Shared types and collaborator traits for the ingestion pipeline.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DeliveryError, GenerationError, MailError};
use crate::tasks::ReplyEnvelope;

// ── Inbound message ─────────────────────────────────────────────────

/// A fetched message. Identity is `id`, unique per source mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEmail {
    /// Mail-store identifier (IMAP UID for the IMAP source).
    pub id: String,
    /// `From` header as rendered by the source, e.g. `Jane <jane@x.com>`.
    pub from: String,
    pub subject: String,
    /// Decoded plain-text body.
    pub body_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

impl RawEmail {
    /// The bare address inside `from`: the bracketed part if present, else the
    /// whole trimmed header.
    pub fn from_address(&self) -> &str {
        bare_address(&self.from)
    }
}

/// Extract the address from `Name <addr>`, or return the trimmed input.
pub fn bare_address(from: &str) -> &str {
    match (from.rfind('<'), from.rfind('>')) {
        (Some(open), Some(close)) if open < close => from[open + 1..close].trim(),
        _ => from.trim(),
    }
}

/// Identifier returned by `MailSource::list_unread`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Selection criteria for `list_unread`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailQuery {
    pub unread_only: bool,
    pub mailbox: String,
}

impl MailQuery {
    /// Unread messages in the inbox.
    pub fn unread_inbox() -> Self {
        Self {
            unread_only: true,
            mailbox: "INBOX".to_string(),
        }
    }
}

// ── Collaborator traits ─────────────────────────────────────────────

/// Mail store access. Pure I/O, no business logic.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Identifiers of at most `max_results` messages matching `query`.
    async fn list_unread(
        &self,
        query: &MailQuery,
        max_results: usize,
    ) -> Result<Vec<MessageRef>, MailError>;

    /// Fetch one full message without changing its read state.
    async fn get_full(&self, id: &str) -> Result<RawEmail, MailError>;

    /// Mark a message as read.
    async fn mark_read(&self, id: &str) -> Result<(), MailError>;
}

/// Text generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    async fn complete(
        &self,
        system_role: &str,
        user_prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, GenerationError>;
}

/// Reply delivery backend. Returns the message id of the sent reply.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send(&self, envelope: &ReplyEnvelope) -> Result<String, DeliveryError>;
}

// ── Cycle report ────────────────────────────────────────────────────

/// Outcome counts for one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub skipped_duplicates: usize,
    pub unauthorized: usize,
    pub delivered: usize,
    /// Messages left unread for retry (fetch or delivery failure).
    pub failed: usize,
    /// Set when shutdown interrupted the batch.
    pub interrupted: bool,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleReport {
    /// Messages the cycle looked at.
    pub fn handled(&self) -> usize {
        self.skipped_duplicates + self.unauthorized + self.delivered + self.failed
    }
}
