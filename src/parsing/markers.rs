//! Locale tables for forwarded-mail conventions.
//!
//! A `MarkerSet` is plain data (deserializable from JSON) so a deployment can
//! swap in its own mail client conventions. `CompiledMarkers` holds the
//! regexes built from it and answers the positional questions the segmenter
//! and header extractor ask.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Outlook-style separator line, also used as a forward start.
const SEPARATOR_LINE: &str = r"(?m)^_{10,}[ \t]*$";

/// Replaceable table of forward markers and header labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerSet {
    /// Regexes marking the start of forwarded content, in priority order.
    pub forward_markers: Vec<String>,
    /// Labels of the original-sender header line ("Von", "From").
    pub sender_labels: Vec<String>,
    /// Labels of the original-subject header line ("Betreff", "Subject").
    pub subject_labels: Vec<String>,
    /// Every label that makes a line look like a header ("An", "Cc", "Date", ...).
    pub header_labels: Vec<String>,
    /// Regexes marking the start of a signature or trailing block.
    pub signature_markers: Vec<String>,
}

impl Default for MarkerSet {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        Self {
            forward_markers: strings(&[
                r"(?i)-{2,}\s*Weitergeleitete Nachricht\s*-{2,}",
                r"(?i)-{2,}\s*Forwarded message\s*-{2,}",
                r"(?i)-{3,}\s*Ursprüngliche Nachricht\s*-{3,}",
                r"(?i)-{3,}\s*Original Message\s*-{3,}",
                r"(?i)Anfang der weitergeleiteten Nachricht:",
                r"(?i)Begin forwarded message:",
                r"(?i)Gesendet von Outlook für iOS",
                r"(?i)Sent from Outlook for iOS",
                SEPARATOR_LINE,
                r"(?s)Von:.*?Gesendet:.*?Betreff:",
                r"(?s)From:.*?Sent:.*?Subject:",
            ]),
            sender_labels: strings(&["Von", "From"]),
            subject_labels: strings(&["Betreff", "Subject"]),
            header_labels: strings(&[
                "Von", "From", "Gesendet", "Sent", "Datum", "Date", "An", "To", "Cc", "Bcc",
                "Betreff", "Subject", "Antwort an", "Reply-To",
            ]),
            signature_markers: strings(&[
                r"(?m)^-- ?$",
                SEPARATOR_LINE,
                r"(?mi)^(?:Gesendet von meinem|Sent from my) ",
                r"(?mi)^(?:Gesendet von Outlook für|Sent from Outlook for) ",
                r"(?m)^Microsoft Teams",
                r"(?m)^-{2,}\s*(?:Weitergeleitete Nachricht|Forwarded message|Ursprüngliche Nachricht|Original Message)",
            ]),
        }
    }
}

impl MarkerSet {
    /// Parse a marker table from JSON. Missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(format!("marker table: {e}")))
    }

    /// Load a marker table from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Build the regexes for this table.
    pub fn compile(&self) -> Result<CompiledMarkers, ConfigError> {
        if self.sender_labels.is_empty() || self.subject_labels.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "marker table".into(),
                message: "sender_labels and subject_labels must not be empty".into(),
            });
        }

        let forward = compile_all(&self.forward_markers)?;
        let signatures = compile_all(&self.signature_markers)?;

        let sender_alt = label_alternation(&self.sender_labels);
        let subject_alt = label_alternation(&self.subject_labels);

        let sender_line_starts = self
            .sender_labels
            .iter()
            .map(|label| compile(&format!(r"(?mi)^{LINE_PREFIX}{}{LABEL_COLON}", regex::escape(label))))
            .collect::<Result<Vec<_>, _>>()?;

        let sender_header = compile(&format!(
            r"(?mi)^{LINE_PREFIX}(?:{sender_alt}){LABEL_COLON}[ \t*]*([^\n<]*)(?:<([^>\n]*)>)?"
        ))?;
        let subject_header = compile(&format!(
            r"(?mi)^{LINE_PREFIX}(?:{subject_alt}){LABEL_COLON}[ \t*]*([^\n]*)"
        ))?;

        let header_prefixes = self
            .header_labels
            .iter()
            .chain(&self.sender_labels)
            .chain(&self.subject_labels)
            .map(|label| format!("{}:", label.to_lowercase()))
            .collect();

        Ok(CompiledMarkers {
            forward,
            sender_line_starts,
            sender_header,
            subject_header,
            header_prefixes,
            signatures,
        })
    }
}

/// Leading decoration allowed before a header label (indent, quoting, bold).
const LINE_PREFIX: &str = r"[ \t>*]*";
/// Label terminator, tolerating bold markers around the colon.
const LABEL_COLON: &str = r"[ \t*]*:";

fn label_alternation(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| regex::escape(l))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns.iter().map(|p| compile(p)).collect()
}

static BUILTIN: LazyLock<CompiledMarkers> = LazyLock::new(|| {
    MarkerSet::default()
        .compile()
        .expect("built-in marker table compiles")
});

/// Compiled marker table.
#[derive(Debug, Clone)]
pub struct CompiledMarkers {
    forward: Vec<Regex>,
    sender_line_starts: Vec<Regex>,
    sender_header: Regex,
    subject_header: Regex,
    header_prefixes: Vec<String>,
    signatures: Vec<Regex>,
}

impl CompiledMarkers {
    /// The built-in German/English table.
    pub fn builtin() -> &'static CompiledMarkers {
        &BUILTIN
    }

    /// Earliest position of any forward marker (minimum index over all markers).
    pub fn earliest_forward_marker(&self, text: &str) -> Option<usize> {
        self.forward
            .iter()
            .filter_map(|re| re.find(text).map(|m| m.start()))
            .min()
    }

    /// Start of forwarded content: the first pattern in priority order
    /// (forward markers, then bare sender lines) matching at a positive offset.
    pub fn forward_start(&self, text: &str) -> Option<usize> {
        self.forward
            .iter()
            .chain(&self.sender_line_starts)
            .filter_map(|re| re.find(text).map(|m| m.start()))
            .find(|&idx| idx > 0)
    }

    /// Earliest bare sender-header line ("Von:", "From:").
    pub fn first_sender_line(&self, text: &str) -> Option<usize> {
        self.sender_line_starts
            .iter()
            .filter_map(|re| re.find(text).map(|m| m.start()))
            .min()
    }

    /// Whether a line starts with a known header label (case-insensitive).
    pub fn is_header_line(&self, line: &str) -> bool {
        let normalized = line
            .trim_start_matches(|c: char| c.is_whitespace() || c == '>' || c == '*')
            .to_lowercase()
            .replace('*', "");
        self.header_prefixes
            .iter()
            .any(|prefix| normalized.starts_with(prefix.as_str()))
    }

    /// Sender header line: group 1 is the display part, group 2 a bracketed address.
    pub fn sender_header(&self) -> &Regex {
        &self.sender_header
    }

    /// Subject header line: group 1 is the subject text.
    pub fn subject_header(&self) -> &Regex {
        &self.subject_header
    }

    /// Earliest signature-block start in `text`.
    pub fn signature_start(&self, text: &str) -> Option<usize> {
        self.signatures
            .iter()
            .filter_map(|re| re.find(text).map(|m| m.start()))
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Table loading ───────────────────────────────────────────────

    #[test]
    fn default_table_compiles() {
        assert!(MarkerSet::default().compile().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let set = MarkerSet::from_json_str(r#"{"sender_labels": ["Od"]}"#).unwrap();
        assert_eq!(set.sender_labels, vec!["Od".to_string()]);
        assert_eq!(set.subject_labels, MarkerSet::default().subject_labels);
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let set = MarkerSet {
            forward_markers: vec!["(unclosed".into()],
            ..MarkerSet::default()
        };
        assert!(matches!(
            set.compile(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn empty_sender_labels_rejected() {
        let set = MarkerSet {
            sender_labels: vec![],
            ..MarkerSet::default()
        };
        assert!(matches!(set.compile(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"{"forward_markers": ["=== FWD ==="], "subject_labels": ["Temat"]}"#,
        )
        .unwrap();

        let set = MarkerSet::from_json_file(file.path()).unwrap();
        let markers = set.compile().unwrap();
        assert_eq!(markers.earliest_forward_marker("hi\n=== FWD ===\n"), Some(3));
        assert!(markers.subject_header().is_match("Temat: Faktura"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = MarkerSet::from_json_file(Path::new("/nonexistent/markers.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    // ── Positional queries ──────────────────────────────────────────

    #[test]
    fn earliest_marker_uses_minimum_index() {
        let markers = CompiledMarkers::builtin();
        // "Original Message" comes later in priority but earlier in the text
        let body = "Hi\n-----Original Message-----\nx\n---------- Forwarded message ----------\n";
        assert_eq!(markers.earliest_forward_marker(body), Some(3));
    }

    #[test]
    fn forward_start_uses_priority_order() {
        let markers = CompiledMarkers::builtin();
        let body = "Hi\n-----Original Message-----\nx\n---------- Forwarded message ----------\n";
        let start = markers.forward_start(body).unwrap();
        assert!(body[start..].starts_with("----------"));
    }

    #[test]
    fn forward_markers_ignore_case() {
        let markers = CompiledMarkers::builtin();
        let body = "Please summarize\n\n-------- Forwarded Message --------\nSubject: x\n";
        assert_eq!(markers.earliest_forward_marker(body), Some(18));
        assert_eq!(markers.forward_start(body), Some(18));
    }

    #[test]
    fn forward_start_ignores_match_at_zero() {
        let markers = CompiledMarkers::builtin();
        let body = "-----Original Message-----\nFrom: A\nSubject: B\n\nbody";
        let start = markers.forward_start(body).unwrap();
        assert!(body[start..].starts_with("From:"));
    }

    #[test]
    fn header_line_detection_is_case_insensitive() {
        let markers = CompiledMarkers::builtin();
        assert!(markers.is_header_line("VON: Jane"));
        assert!(markers.is_header_line("  subject: x"));
        assert!(markers.is_header_line("**From:** Jane"));
        assert!(markers.is_header_line("> An: team@x.com"));
        assert!(!markers.is_header_line("Antwort bitte bis Freitag"));
        assert!(!markers.is_header_line("Please respond quickly"));
    }

    #[test]
    fn sender_header_captures_name_and_address() {
        let markers = CompiledMarkers::builtin();
        let caps = markers
            .sender_header()
            .captures("Von: Jane Doe <jane@x.com>\n")
            .unwrap();
        assert_eq!(caps[1].trim(), "Jane Doe");
        assert_eq!(&caps[2], "jane@x.com");
    }

    #[test]
    fn signature_start_finds_earliest_block() {
        let markers = CompiledMarkers::builtin();
        let text = "Body\n\nSent from my iPhone\n-- \nSig";
        assert_eq!(markers.signature_start(text), Some(6));
    }
}
