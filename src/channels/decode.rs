//! Payload decoding: raw RFC 822 bytes to a `RawEmail`.
//!
//! Prefers the text/plain body. HTML-only messages are converted to text
//! with their line structure kept, since the forward markers and header
//! labels are matched line by line.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use mail_parser::{Address, MessageParser, MimeHeaders, PartType};
use regex::Regex;

use crate::error::MailError;
use crate::pipeline::RawEmail;

/// Parse a full message into a `RawEmail` with identifier `id`.
pub fn parse_message(id: &str, raw: &[u8]) -> Result<RawEmail, MailError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Unparseable { id: id.to_string() })?;

    Ok(RawEmail {
        id: id.to_string(),
        from: render_from(parsed.from()),
        subject: parsed.subject().unwrap_or_default().to_string(),
        body_text: extract_text(&parsed),
        received_at: parsed
            .date()
            .and_then(|d| DateTime::<Utc>::from_timestamp(d.to_timestamp(), 0)),
    })
}

/// `Name <addr>`, or whichever half is present.
fn render_from(from: Option<&Address>) -> String {
    let Some(addr) = from.and_then(|a| a.first()) else {
        return String::new();
    };
    match (addr.name(), addr.address()) {
        (Some(name), Some(address)) if !name.trim().is_empty() => {
            format!("{} <{address}>", name.trim())
        }
        (_, Some(address)) => address.to_string(),
        (Some(name), None) => name.trim().to_string(),
        (None, None) => String::new(),
    }
}

/// Readable body text with `\n` line endings.
///
/// mail-parser lists an HTML-only part as the text body too and converts it
/// itself, joining adjacent block elements. Only a real text/plain part is
/// taken as-is.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(PartType::Text(text)) = parsed.text_part(0).map(|part| &part.body) {
        return normalize_newlines(text);
    }
    if let Some(html) = parsed.body_html(0) {
        return html_to_text(&html);
    }
    for part in parsed.attachments() {
        let part: &mail_parser::MessagePart = part;
        if let Some(ct) = MimeHeaders::content_type(part)
            && ct.ctype() == "text"
            && let Ok(text) = std::str::from_utf8(part.contents())
        {
            return normalize_newlines(text);
        }
    }
    String::new()
}

/// Convert CRLF and lone CR to LF.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

static SCRIPT_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:script|style|head)\b.*?</(?:script|style|head)\s*>")
        .expect("script/style regex compiles")
});
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|blockquote|table)\s*>")
        .expect("line break regex compiles")
});
static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex compiles"));
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank run regex compiles"));

/// Strip HTML to text, turning line-break and block-end tags into newlines.
pub fn html_to_text(html: &str) -> String {
    let html = normalize_newlines(html);
    // Source newlines inside HTML are layout, not content.
    let html = html.replace('\n', " ");
    let html = SCRIPT_STYLE.replace_all(&html, "");
    let html = LINE_BREAK.replace_all(&html, "\n");
    let text = decode_entities(&TAG.replace_all(&html, ""));

    let lines: Vec<&str> = text.lines().map(|l| l.trim()).collect();
    BLANK_RUN
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Decode the handful of entities mail clients actually emit.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
