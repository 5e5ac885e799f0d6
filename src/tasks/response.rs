//! Reply formatting: subject prefix, title and HTML body per task kind.

use serde::{Deserialize, Serialize};

use crate::tasks::classifier::TaskKind;

/// Everything the delivery backend needs to send one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub to: String,
    pub subject_prefix: String,
    pub title: String,
    pub subject: String,
    pub body_html: String,
    pub task: TaskKind,
}

/// `(subject prefix, display title)` per task kind.
pub fn reply_labels(task: TaskKind) -> (&'static str, &'static str) {
    match task {
        TaskKind::Summarize => ("Summary:", "AI Generated Summary"),
        TaskKind::Todos => ("Todos:", "AI Generated To-Do List"),
        TaskKind::Analyze => ("Analysis:", "AI Generated Analysis"),
        TaskKind::Translate => ("Translation:", "AI Generated Translation"),
        TaskKind::Write => ("Draft:", "AI Generated Draft"),
        TaskKind::Respond => ("Re:", "AI Generated Response"),
    }
}

/// Builds reply envelopes from generated text.
#[derive(Debug, Clone, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Wrap `generated` into a reply addressed to `to`.
    pub fn format(
        &self,
        task: TaskKind,
        generated: &str,
        original_subject: &str,
        to: &str,
    ) -> ReplyEnvelope {
        let (prefix, title) = reply_labels(task);
        let subject = format!("{prefix} {}", original_subject.trim())
            .trim_end()
            .to_string();

        let body_html = format!(
            "<p><strong>{title}:</strong></p>\n\
             <div style=\"margin: 15px 0;\">\n{}\n</div>\n\
             <hr>\n\
             <p><em>This {} was automatically generated. Please review before use.</em></p>\n",
            text_to_html(generated),
            task_noun(task),
        );

        ReplyEnvelope {
            to: to.to_string(),
            subject_prefix: prefix.to_string(),
            title: title.to_string(),
            subject,
            body_html,
            task,
        }
    }
}

fn task_noun(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Summarize => "summary",
        TaskKind::Todos => "to-do list",
        TaskKind::Analyze => "analysis",
        TaskKind::Translate => "translation",
        TaskKind::Write => "draft",
        TaskKind::Respond => "response",
    }
}

/// Escape HTML and turn line breaks into `<br>`.
pub fn text_to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.replace("\r\n", "\n").chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("<br>\n"),
            _ => out.push(ch),
        }
    }
    out
}
