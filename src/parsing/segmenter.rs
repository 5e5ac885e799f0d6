//! Splits a forwarded email body into the user's instructions and the
//! forwarded content.

use tracing::debug;

use crate::parsing::markers::CompiledMarkers;

/// Instruction text and forwarded content of one body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segments {
    pub instructions: String,
    pub forwarded_content: String,
}

/// Segment `body` into instructions and forwarded content.
///
/// Instructions end at the earliest forward marker (minimum index across all
/// markers). Forwarded content starts at the first pattern, in priority
/// order, that matches at a positive offset; with none it is the whole body.
pub fn segment(body: &str, markers: &CompiledMarkers) -> Segments {
    if body.is_empty() {
        return Segments::default();
    }

    let instructions = match markers.earliest_forward_marker(body) {
        Some(end) => strip_header_lines(body[..end].trim(), markers),
        None => {
            debug!("No forward marker found, deriving instructions from sender line");
            instructions_before_sender_line(body, markers)
        }
    };

    let forwarded_content = match markers.forward_start(body) {
        Some(start) => body[start..].to_string(),
        None => body.to_string(),
    };

    Segments {
        instructions,
        forwarded_content,
    }
}

/// Drop header-looking lines that ended up above the forward marker.
fn strip_header_lines(text: &str, markers: &CompiledMarkers) -> String {
    text.lines()
        .filter(|line| !markers.is_header_line(line))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Non-empty, non-header lines before the first bare sender line, joined
/// with single spaces. Empty when the body has no sender line at all.
fn instructions_before_sender_line(body: &str, markers: &CompiledMarkers) -> String {
    let Some(end) = markers.first_sender_line(body) else {
        return String::new();
    };

    body[..end]
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !markers.is_header_line(line))
        .collect::<Vec<_>>()
        .join(" ")
}
