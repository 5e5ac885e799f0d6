//! Forwarded-email parsing.
//!
//! Pure pipeline: `segment()` splits the body, `extract_headers()` reads the
//! forwarded part. Nothing here allocates state between calls, so every stage
//! can be tested on bare strings.

pub mod headers;
pub mod markers;
pub mod segmenter;

use serde::{Deserialize, Serialize};

pub use headers::{ForwardHeaders, extract_headers};
pub use markers::{CompiledMarkers, MarkerSet};
pub use segmenter::{Segments, segment};

/// Everything recovered from one forwarded email body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedForward {
    pub original_sender: String,
    pub original_subject: String,
    pub original_content: String,
    pub instructions: String,
    pub full_body: String,
}

/// Parse a forwarded email body.
pub fn parse_forward(body: &str, markers: &CompiledMarkers) -> ParsedForward {
    let segments = segment(body, markers);
    let headers = extract_headers(&segments.forwarded_content, markers);

    ParsedForward {
        original_sender: headers.sender,
        original_subject: headers.subject,
        original_content: headers.content,
        instructions: segments.instructions,
        full_body: body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_german_forward_end_to_end() {
        let body = "Please respond quickly\n\n-----Ursprüngliche Nachricht-----\nVon: Jane Doe <jane@x.com>\nBetreff: Budget Q3\n\nCan we meet?\n";
        let parsed = parse_forward(body, CompiledMarkers::builtin());

        assert_eq!(parsed.instructions, "Please respond quickly");
        assert_eq!(parsed.original_sender, "Jane Doe");
        assert_eq!(parsed.original_subject, "Budget Q3");
        assert_eq!(parsed.original_content, "Can we meet?");
        assert_eq!(parsed.full_body, body);
    }

    #[test]
    fn parses_outlook_ios_forward() {
        let body = "<t>zusammenfassen</t>\n\nGesendet von Outlook für iOS<https://aka.ms/o0ukef>\n________________________________\nVon: Max Muster <max@firma.de>\nGesendet: Dienstag, 4. März 2025 10:12\nAn: Team <team@firma.de>\nBetreff: Quartalszahlen\n\nHallo zusammen,\nanbei die Zahlen.\n\nViele Grüße\nMax";
        let parsed = parse_forward(body, CompiledMarkers::builtin());

        assert_eq!(parsed.instructions, "<t>zusammenfassen</t>");
        assert_eq!(parsed.original_sender, "Max Muster");
        assert_eq!(parsed.original_subject, "Quartalszahlen");
        assert!(parsed.original_content.starts_with("Hallo zusammen,"));
        assert!(parsed.original_content.ends_with("Max"));
    }

    #[test]
    fn parses_thunderbird_forward() {
        let body = "Please summarize\n\n-------- Forwarded Message --------\nSubject: Launch plan\nDate: Mon, 3 Mar 2025 09:00:00 +0100\nFrom: Bob <bob@x.com>\nTo: me@x.com\n\nHere is the plan.";
        let parsed = parse_forward(body, CompiledMarkers::builtin());

        assert_eq!(parsed.instructions, "Please summarize");
        assert_eq!(parsed.original_sender, "Bob");
        assert_eq!(parsed.original_subject, "Launch plan");
        assert_eq!(parsed.original_content, "Here is the plan.");
    }

    #[test]
    fn empty_body() {
        let parsed = parse_forward("", CompiledMarkers::builtin());
        assert_eq!(parsed, ParsedForward::default());
    }
}
