//! Error types for forward-assist.
//!
//! Parse anomalies and classification defaults are not errors: the parser
//! and classifier always fall back to a value. Everything here is raised by
//! configuration, the mail store, the generation backend, delivery, or a
//! broken prompt template.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid pattern {pattern:?} in marker table: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail store errors. At the cycle boundary these are the "cycle errors".
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Failed to connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("IMAP command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Message {id} not found")]
    NotFound { id: String },

    #[error("Message {id} could not be parsed")]
    Unparseable { id: String },

    #[error("Mail task aborted: {0}")]
    TaskAborted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Generation backend errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Outbound delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build reply: {0}")]
    Build(String),

    #[error("Transport failed: {0}")]
    Transport(String),
}

/// Template defects detected while rendering a prompt.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Template placeholder {{{name}}} has no value")]
    UnresolvedPlaceholder { name: String },

    #[error("Value for {{{name}}} is not used by the template")]
    UnusedValue { name: String },

    #[error("Template placeholder {{{name}}} appears more than once")]
    DuplicatePlaceholder { name: String },
}
