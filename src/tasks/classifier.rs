//! Task classification from the instruction text.
//!
//! An explicit `<t>word</t>` directive wins. Without one, keyword lists are
//! checked in a fixed priority order. Anything unrecognized is `Respond`.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The kind of artifact requested for a forwarded email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summarize,
    Todos,
    Analyze,
    Translate,
    Write,
    #[default]
    Respond,
}

impl TaskKind {
    /// All kinds, in keyword-matching priority order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Summarize,
        TaskKind::Todos,
        TaskKind::Analyze,
        TaskKind::Translate,
        TaskKind::Write,
        TaskKind::Respond,
    ];

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Todos => "todos",
            Self::Analyze => "analyze",
            Self::Translate => "translate",
            Self::Write => "write",
            Self::Respond => "respond",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

static DIRECTIVE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<t>(.*?)</t>").expect("directive tag regex compiles"));

/// Content of the first directive tag, if any.
pub fn find_directive(instructions: &str) -> Option<&str> {
    DIRECTIVE_TAG
        .captures(instructions)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Remove every directive tag from `instructions`.
pub fn strip_directives(instructions: &str) -> String {
    DIRECTIVE_TAG.replace_all(instructions, "").into_owned()
}

/// Tag words per kind: operating language first, German second.
const TAG_SYNONYMS: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::Summarize,
        &["summarize", "summarise", "summary", "zusammenfassen", "zusammenfassung"],
    ),
    (
        TaskKind::Todos,
        &["todo", "todos", "to-do", "to-dos", "tasks", "aufgabe", "aufgaben"],
    ),
    (
        TaskKind::Analyze,
        &["analyze", "analyse", "analysis", "analysieren"],
    ),
    (
        TaskKind::Translate,
        &["translate", "translation", "übersetzen", "übersetzung"],
    ),
    (
        TaskKind::Write,
        &["write", "draft", "compose", "schreibe", "schreiben", "verfassen"],
    ),
    (
        TaskKind::Respond,
        &["respond", "reply", "answer", "antworten", "antwort"],
    ),
];

/// Free-text keywords per kind, checked as lower-case substrings in this order.
const KEYWORDS: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::Summarize,
        &["summarize", "summarise", "summary", "tl;dr", "zusammenfass"],
    ),
    (
        TaskKind::Todos,
        &["todo", "to-do", "to do list", "action items", "aufgabe"],
    ),
    (
        TaskKind::Analyze,
        &["analyze", "analyse", "analysis", "analysier", "auswerten"],
    ),
    (
        TaskKind::Translate,
        &["translate", "translation", "übersetz"],
    ),
    (
        TaskKind::Write,
        &["write", "draft", "compose", "schreib", "verfass", "entwurf"],
    ),
];

/// Keyword and synonym tables for classification.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    synonyms: Vec<(TaskKind, Vec<String>)>,
    keywords: Vec<(TaskKind, Vec<String>)>,
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self {
            synonyms: owned_table(TAG_SYNONYMS),
            keywords: owned_table(KEYWORDS),
        }
    }
}

fn owned_table(table: &[(TaskKind, &[&str])]) -> Vec<(TaskKind, Vec<String>)> {
    table
        .iter()
        .map(|(kind, words)| (*kind, words.iter().map(|w| w.to_string()).collect()))
        .collect()
}

impl TaskClassifier {
    /// Classify instruction text. Total: every input maps to exactly one kind.
    pub fn classify(&self, instructions: &str) -> TaskKind {
        if let Some(word) = find_directive(instructions) {
            let kind = self.kind_for_tag(word);
            debug!(tag = %word.trim(), task = kind.label(), "Classified by directive tag");
            return kind;
        }

        let kind = self.kind_for_keywords(instructions);
        debug!(task = kind.label(), "Classified by keywords");
        kind
    }

    /// Map a tag word through the synonym table. Unknown words are `Respond`.
    pub fn kind_for_tag(&self, word: &str) -> TaskKind {
        let normalized = normalize_word(word);
        self.synonyms
            .iter()
            .find(|(_, words)| words.iter().any(|w| *w == normalized))
            .map_or(TaskKind::Respond, |(kind, _)| *kind)
    }

    /// First kind, in priority order, whose keyword occurs in the text.
    pub fn kind_for_keywords(&self, text: &str) -> TaskKind {
        let lower = text.to_lowercase();
        self.keywords
            .iter()
            .find(|(_, words)| words.iter().any(|w| lower.contains(w.as_str())))
            .map_or(TaskKind::Respond, |(kind, _)| *kind)
    }
}

static DEFAULT_CLASSIFIER: LazyLock<TaskClassifier> = LazyLock::new(TaskClassifier::default);

/// Classify with the built-in tables.
pub fn classify(instructions: &str) -> TaskKind {
    DEFAULT_CLASSIFIER.classify(instructions)
}

/// Lower-case, trimmed, without surrounding punctuation.
fn normalize_word(word: &str) -> String {
    word.trim()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Directive tag ───────────────────────────────────────────────

    #[test]
    fn tag_maps_english_words() {
        assert_eq!(classify("<t>summarize</t>"), TaskKind::Summarize);
        assert_eq!(classify("<t>todos</t>"), TaskKind::Todos);
        assert_eq!(classify("<t>analyze</t>"), TaskKind::Analyze);
        assert_eq!(classify("<t>translate</t>"), TaskKind::Translate);
        assert_eq!(classify("<t>write</t>"), TaskKind::Write);
        assert_eq!(classify("<t>respond</t>"), TaskKind::Respond);
    }

    #[test]
    fn tag_maps_german_words() {
        assert_eq!(classify("<t>zusammenfassen</t>"), TaskKind::Summarize);
        assert_eq!(classify("<t>aufgabe</t>"), TaskKind::Todos);
        assert_eq!(classify("<t>analyse</t>"), TaskKind::Analyze);
        assert_eq!(classify("<t>Übersetzung</t>"), TaskKind::Translate);
        assert_eq!(classify("<t>schreibe</t>"), TaskKind::Write);
        assert_eq!(classify("<t>antworten</t>"), TaskKind::Respond);
    }

    #[test]
    fn tag_is_case_and_punctuation_insensitive() {
        assert_eq!(classify("<T> Summarize! </T>"), TaskKind::Summarize);
        assert_eq!(classify("please <t>TODO:</t> now"), TaskKind::Todos);
    }

    #[test]
    fn tag_beats_keywords() {
        assert_eq!(
            classify("<t>translate</t> please summarize this"),
            TaskKind::Translate
        );
    }

    #[test]
    fn unknown_tag_defaults_to_respond() {
        assert_eq!(classify("<t>frobnicate</t>"), TaskKind::Respond);
        assert_eq!(classify("<t></t> summarize"), TaskKind::Respond);
    }

    #[test]
    fn first_tag_wins() {
        assert_eq!(classify("<t>write</t> <t>summarize</t>"), TaskKind::Write);
    }

    #[test]
    fn find_and_strip_directive() {
        assert_eq!(find_directive("x <t>todos</t> y"), Some("todos"));
        assert_eq!(strip_directives("<t>todos</t> finish by Friday"), " finish by Friday");
        assert_eq!(find_directive("no tag"), None);
    }

    // ── Keyword fallback ────────────────────────────────────────────

    #[test]
    fn keywords_in_priority_order() {
        // summarize outranks translate
        assert_eq!(classify("Translate and summarize this"), TaskKind::Summarize);
        assert_eq!(classify("make a todo list and analyze"), TaskKind::Todos);
        assert_eq!(classify("Bitte übersetzen"), TaskKind::Translate);
        assert_eq!(classify("Kannst du das auswerten?"), TaskKind::Analyze);
        assert_eq!(classify("Draft something nice"), TaskKind::Write);
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(classify("SUMMARY please"), TaskKind::Summarize);
        assert_eq!(classify("Bitte ZUSAMMENFASSEN."), TaskKind::Summarize);
    }

    #[test]
    fn no_keyword_defaults_to_respond() {
        assert_eq!(classify("Please respond quickly"), TaskKind::Respond);
        assert_eq!(classify(""), TaskKind::Respond);
        assert_eq!(classify("   \n\t"), TaskKind::Respond);
    }

    #[test]
    fn classify_is_total_over_odd_input() {
        for input in ["<t>", "</t>", "<t>unclosed", "🙂", "<t>\n</t>", "<<t>>summarize<</t>>"] {
            let kind = classify(input);
            assert!(TaskKind::ALL.contains(&kind));
        }
    }

    // ── TaskKind ────────────────────────────────────────────────────

    #[test]
    fn task_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TaskKind::Todos).unwrap(), "\"todos\"");
        assert_eq!(TaskKind::default(), TaskKind::Respond);
        assert_eq!(TaskKind::Analyze.to_string(), "analyze");
    }
}
