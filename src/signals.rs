//! Keyword-signal scan over OCR text.
//!
//! Pure functions, no async — easily testable. Normalizes the raw text,
//! runs a fixed set of containment checks, and returns a small report with
//! a truncated sample. The structured ladder output stays empty until the
//! row extractor exists.

use serde::{Deserialize, Serialize};

/// Maximum number of characters kept in [`SignalReport::raw_sample`].
pub const RAW_SAMPLE_CHARS: usize = 500;

/// Fixed set of keyword-presence flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signals {
    pub mentions_over: bool,
    pub mentions_under: bool,
    pub mentions_total: bool,
    pub mentions_1st_half: bool,
}

/// Report returned by the parse endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReport {
    pub signals: Signals,
    /// Prefix of the newline-collapsed text, original casing.
    pub raw_sample: String,
    /// Structured over/under ladder rows. Always null for now.
    pub ladder: Option<serde_json::Value>,
}

/// Scan raw extracted text for the known signals.
///
/// Newlines collapse to single spaces and the result is trimmed before
/// matching; matching itself is case-insensitive. Total over any input,
/// including the empty string.
pub fn scan_text(text: &str) -> SignalReport {
    let normalized = text.replace('\n', " ").trim().to_string();
    let haystack = normalized.to_lowercase();

    let signals = Signals {
        mentions_over: haystack.contains("over"),
        mentions_under: haystack.contains("under"),
        mentions_total: haystack.contains("total") || haystack.contains("totals"),
        mentions_1st_half: haystack.contains("1st")
            || haystack.contains("1 half")
            || haystack.contains("first half"),
    };

    SignalReport {
        signals,
        raw_sample: truncate_chars(&normalized, RAW_SAMPLE_CHARS),
        ladder: None,
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
