//! Forward-processing pipeline.
//!
//! Every fetched message flows through:
//! 1. `MailSource::list_unread()` / `get_full()`: mailbox I/O
//! 2. Allowlist and processed-store checks
//! 3. `parse_forward()` and `TaskClassifier::classify()`: pure, no I/O
//! 4. `TextGenerator::complete()` with the assembled prompt
//! 5. `ReplySender::send()` with the formatted envelope, then commit

pub mod ingest;
pub mod processed;
pub mod types;

pub use ingest::{
    GENERATION_FAILED_TEXT, IngestSettings, IngestionLoop, MessageOutcome, is_sender_allowed,
    spawn_ingestion_loop,
};
pub use processed::{InMemoryProcessedSet, ProcessedStore};
pub use types::{
    CycleReport, MailQuery, MailSource, MessageRef, RawEmail, ReplySender, TextGenerator,
};
