//! Prompt templates and assembly.
//!
//! One template per task kind. Templates are rendered in a single pass over
//! a declared placeholder set, so substituted email text is never scanned
//! again and a template edit that adds or drops a placeholder is caught.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::PromptError;
use crate::parsing::ParsedForward;
use crate::tasks::classifier::{TaskKind, strip_directives};

/// Placeholders every template uses exactly once.
pub const PLACEHOLDERS: [&str; 4] = ["sender", "subject", "content", "additional_instructions"];

/// Inputs for one generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRequest {
    pub task: TaskKind,
    pub sender: String,
    pub subject: String,
    pub content: String,
    pub additional_instructions: String,
}

impl PromptRequest {
    /// Build a request from parsed forward content.
    pub fn from_parsed(task: TaskKind, parsed: &ParsedForward) -> Self {
        Self {
            task,
            sender: parsed.original_sender.clone(),
            subject: parsed.original_subject.clone(),
            content: parsed.original_content.clone(),
            additional_instructions: additional_instructions(&parsed.instructions),
        }
    }

    /// Render the system role and user prompt for this request.
    pub fn assemble(&self) -> Result<AssembledPrompt, PromptError> {
        let block = instructions_block(&self.additional_instructions);
        let user_prompt = render(
            template(self.task),
            &[
                ("sender", self.sender.as_str()),
                ("subject", self.subject.as_str()),
                ("content", self.content.as_str()),
                ("additional_instructions", block.as_str()),
            ],
        )?;

        Ok(AssembledPrompt {
            system_role: system_role(self.task).to_string(),
            user_prompt,
        })
    }
}

/// Final prompt text handed to the generation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub system_role: String,
    pub user_prompt: String,
}

/// Assemble the prompt for `task` from parsed forward content.
pub fn assemble(task: TaskKind, parsed: &ParsedForward) -> Result<AssembledPrompt, PromptError> {
    PromptRequest::from_parsed(task, parsed).assemble()
}

static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("blank run regex compiles"));

/// Instruction text without the directive tag, blank-line runs collapsed.
pub fn additional_instructions(instructions: &str) -> String {
    let stripped = strip_directives(instructions);
    BLANK_RUN
        .replace_all(&stripped, "\n\n")
        .trim()
        .to_string()
}

/// Labeled block for non-empty instructions, empty otherwise.
fn instructions_block(additional: &str) -> String {
    if additional.is_empty() {
        String::new()
    } else {
        format!("Additional instructions:\n{additional}\n\n")
    }
}

/// Short role description for the system message.
pub fn system_role(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Summarize => {
            "You are a professional business assistant who summarizes business emails accurately and concisely."
        }
        TaskKind::Todos => {
            "You are a professional business assistant who extracts clear, actionable task lists from business emails."
        }
        TaskKind::Analyze => {
            "You are a professional business analyst who analyzes business emails for intent, risks and open questions."
        }
        TaskKind::Translate => {
            "You are a professional business translator who translates business emails faithfully, keeping tone and formatting."
        }
        TaskKind::Write => {
            "You are a professional business writer who drafts business texts based on a given email."
        }
        TaskKind::Respond => {
            "You are a professional business assistant helping to draft email responses. Generate appropriate, professional responses to business emails."
        }
    }
}

/// The template bound to `task`.
pub fn template(task: TaskKind) -> &'static str {
    match task {
        TaskKind::Summarize => SUMMARIZE_TEMPLATE,
        TaskKind::Todos => TODOS_TEMPLATE,
        TaskKind::Analyze => ANALYZE_TEMPLATE,
        TaskKind::Translate => TRANSLATE_TEMPLATE,
        TaskKind::Write => WRITE_TEMPLATE,
        TaskKind::Respond => RESPOND_TEMPLATE,
    }
}

const SUMMARIZE_TEMPLATE: &str = "Summarize the following business email.

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

The summary should:
1. State the purpose of the email in one sentence
2. List the key points, decisions and deadlines
3. Name who is expected to do what
4. Be written in the language of the email

Summary:";

const TODOS_TEMPLATE: &str = "Extract a to-do list from the following business email.

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

For each task give:
- what has to be done
- who is responsible, if stated
- the deadline, if stated

Order tasks by urgency. If the email contains no tasks, say so.

To-do list:";

const ANALYZE_TEMPLATE: &str = "Analyze the following business email.

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

Cover:
1. The sender's intent and what they expect from me
2. Tone and urgency
3. Risks, open questions and anything unusual
4. A recommended next step

Analysis:";

const TRANSLATE_TEMPLATE: &str = "Translate the following business email.

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

Unless the instructions above name a target language, translate German text into English and any other language into German. Keep names, numbers and formatting unchanged. Return only the translation.

Translation:";

const WRITE_TEMPLATE: &str = "Write a business text based on the following email.

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

Follow the instructions above on what to write. Without instructions, write a short professional follow-up email about the same topic. Use the language of the email.

Text:";

const RESPOND_TEMPLATE: &str = "I received the following business email and need to generate a professional response:

From: {sender}
Subject: {subject}

{additional_instructions}Email content:
{content}

Please generate a professional, helpful response that:
1. Addresses the sender's request appropriately
2. Maintains a friendly and professional tone
3. Is concise but complete
4. Includes appropriate greetings and closing
5. Answers in the same language as the request
6. Follows any additional instructions given above

Response:";

/// Replace `{name}` placeholders in one pass.
///
/// Every placeholder in the template must have a value, every value must be
/// used, and no placeholder may appear twice. Braces around anything that is
/// not a lower-case identifier are copied through.
pub fn render(template: &str, values: &[(&str, &str)]) -> Result<String, PromptError> {
    let lookup: HashMap<&str, &str> = values.iter().copied().collect();
    let mut used: HashMap<&str, usize> = HashMap::new();
    let mut out = String::with_capacity(template.len() + values.iter().map(|(_, v)| v.len()).sum::<usize>());

    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let name = after
            .find('}')
            .map(|close| &after[..close])
            .filter(|name| is_placeholder_name(name));

        match name {
            Some(name) => {
                let value = lookup
                    .get(name)
                    .ok_or_else(|| PromptError::UnresolvedPlaceholder {
                        name: name.to_string(),
                    })?;
                let count = used.entry(name).or_insert(0);
                *count += 1;
                if *count > 1 {
                    return Err(PromptError::DuplicatePlaceholder {
                        name: name.to_string(),
                    });
                }
                out.push_str(value);
                rest = &after[name.len() + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    if let Some((name, _)) = values.iter().find(|(name, _)| !used.contains_key(*name)) {
        return Err(PromptError::UnusedValue {
            name: name.to_string(),
        });
    }

    Ok(out)
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
