//! Task routing: classification, prompt assembly and reply formatting.

pub mod classifier;
pub mod prompts;
pub mod response;

pub use classifier::{TaskClassifier, TaskKind, classify};
pub use prompts::{AssembledPrompt, PromptRequest, assemble};
pub use response::{ReplyEnvelope, ResponseFormatter};
