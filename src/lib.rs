//! Forward Assist: turns forwarded emails into AI-generated replies.
//!
//! A forwarded email carries optional instructions above the forward marker.
//! The instructions pick a task (summarize, todos, analyze, translate, write,
//! respond); the forwarded part supplies sender, subject and content.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod parsing;
pub mod pipeline;
pub mod tasks;
