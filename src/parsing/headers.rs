//! Extracts the original sender, subject and body from forwarded content.

use tracing::debug;

use crate::parsing::markers::CompiledMarkers;

/// Header fields and body recovered from forwarded content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardHeaders {
    pub sender: String,
    pub subject: String,
    pub content: String,
}

/// Extract sender, subject and body from `forwarded`.
///
/// Without a subject line the content is the whole input, untruncated.
pub fn extract_headers(forwarded: &str, markers: &CompiledMarkers) -> ForwardHeaders {
    let sender = extract_sender(forwarded, markers);

    let Some(caps) = markers.subject_header().captures(forwarded) else {
        debug!("No subject header in forwarded content, keeping it whole");
        return ForwardHeaders {
            sender,
            subject: String::new(),
            content: forwarded.to_string(),
        };
    };

    let subject = caps
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    let line_end = caps.get(0).map_or(forwarded.len(), |m| m.end());
    let content = body_after_headers(&forwarded[line_end..], markers);

    ForwardHeaders {
        sender,
        subject,
        content,
    }
}

/// Display name of the first sender line, or its bracketed address when the
/// name is empty.
fn extract_sender(forwarded: &str, markers: &CompiledMarkers) -> String {
    let Some(caps) = markers.sender_header().captures(forwarded) else {
        debug!("No sender header in forwarded content");
        return String::new();
    };

    let name = caps.get(1).map_or("", |m| m.as_str()).trim();
    if !name.is_empty() {
        return name.to_string();
    }
    caps.get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Body following the subject line. Header lines directly below the subject
/// (Gmail puts `To:` there) are skipped; a signature block truncates the rest.
fn body_after_headers(rest: &str, markers: &CompiledMarkers) -> String {
    let mut lines = rest.split_inclusive('\n');
    // remainder of the subject line itself
    let mut offset = lines.next().map_or(0, str::len);

    for line in lines {
        if line.trim().is_empty() || !markers.is_header_line(line) {
            break;
        }
        offset += line.len();
    }

    let body = rest[offset..].trim();
    match markers.signature_start(body) {
        Some(cut) if cut > 0 => body[..cut].trim_end().to_string(),
        _ => body.to_string(),
    }
}
