//! Classification of translated text as usable or corrupt.
//!
//! Translation calls resolve to a `String` before anything here sees them, so
//! the marker checks are a backstop: they catch stringified unresolved-handle
//! reprs that leaked from an earlier pipeline or a misbehaving backend.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// Translated text may be at most this many times longer than the source.
pub const MAX_LENGTH_RATIO: usize = 15;

/// Repr patterns of unresolved computations, most specific first.
///
/// Every pattern stays on one line so a match can never reach into the next
/// cue's index or timing line.
///
/// The repair tool applies them in this order, so a fully qualified repr is
/// replaced as a whole before the looser patterns run.
pub(crate) static MARKER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)<coroutine object [^>\s]+\.translate at 0x[0-9a-f]+>",
        r"(?i)<(?:async_generator|generator|coroutine)[ \t]+object[ \t]+[^>\n]+>",
        r"(?i)<[^<>\n]*\b(?:coroutine|generator)\b[^<>\n]*>",
        r"(?i)\b(?:coroutine|generator) object [^\s<>]+(?: at 0x[0-9a-f]+)?",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid marker regex"))
    .collect()
});

const ERROR_TAGS: &[&str] = &["error:", "exception:", "traceback", "timeout", "failed"];

/// Why a translation result was rejected. Variants are listed in check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotText,
    Empty,
    CorruptionMarker,
    ErrorTag(&'static str),
    LengthRatio { length: usize, original: usize },
    ControlCharacter(char),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotText => f.write_str("result is not text"),
            Rejection::Empty => f.write_str("result is empty"),
            Rejection::CorruptionMarker => f.write_str("result contains an unresolved-call marker"),
            Rejection::ErrorTag(tag) => write!(f, "result contains error tag {tag:?}"),
            Rejection::LengthRatio { length, original } => write!(
                f,
                "result is {length} chars for a {original}-char original (limit {MAX_LENGTH_RATIO}x)"
            ),
            Rejection::ControlCharacter(c) => write!(f, "result contains control character {c:?}"),
        }
    }
}

/// Whether `text` contains a stringified unresolved computation.
pub fn contains_corruption_marker(text: &str) -> bool {
    MARKER_PATTERNS.iter().any(|re| re.is_match(text))
}

fn find_error_tag(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    ERROR_TAGS.iter().copied().find(|tag| lower.contains(tag))
}

/// Check a resolved translation against its source text.
pub fn check_text(result: &str, original: &str) -> Result<(), Rejection> {
    let trimmed = result.trim();
    if trimmed.is_empty() {
        return Err(Rejection::Empty);
    }
    if contains_corruption_marker(trimmed) {
        return Err(Rejection::CorruptionMarker);
    }
    if let Some(tag) = find_error_tag(trimmed) {
        return Err(Rejection::ErrorTag(tag));
    }

    let length = trimmed.chars().count();
    let original = original.trim().chars().count();
    if length > original.max(1) * MAX_LENGTH_RATIO {
        return Err(Rejection::LengthRatio { length, original });
    }

    if let Some(c) = trimmed
        .chars()
        .find(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
    {
        return Err(Rejection::ControlCharacter(c));
    }
    Ok(())
}

/// Check an arbitrary value, as returned by a backend's JSON payload.
pub fn check_value(result: &Value, original: &str) -> Result<(), Rejection> {
    match result {
        Value::String(s) => check_text(s, original),
        _ => Err(Rejection::NotText),
    }
}

/// Whether `result` is a usable translation of `original`.
pub fn is_valid(result: &Value, original: &str) -> bool {
    check_value(result, original).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COROUTINE: &str = "<coroutine object Translator.translate at 0x1234>";

    #[test]
    fn test_accepts_plain_translation() {
        assert!(is_valid(&json!("こんにちは"), "hello"));
        assert!(is_valid(&json!("line one\nline two\t!"), "line one line two"));
    }

    #[test]
    fn test_rejects_coroutine_repr() {
        assert!(!is_valid(&json!(COROUTINE), "hi"));
        assert_eq!(check_text(COROUTINE, "hi"), Err(Rejection::CorruptionMarker));
    }

    #[test]
    fn test_rejects_non_string() {
        for v in [json!(null), json!(42), json!({"text": "hi"}), json!(["hi"])] {
            assert_eq!(check_value(&v, "hi"), Err(Rejection::NotText));
        }
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(check_text("   \n", "hi"), Err(Rejection::Empty));
    }

    #[test]
    fn test_detects_marker_variants() {
        for s in [
            "<coroutine object foo at 0xdeadbeef>",
            "prefix <Coroutine Object Bar.baz at 0x1> suffix",
            "<generator object gen at 0x7f>",
            "<async_generator object agen at 0x7f>",
            "<built-in coroutine wrapper>",
            "coroutine object Translator.translate",
        ] {
            assert!(contains_corruption_marker(s), "missed {s:?}");
        }
        for s in [
            "a <b> tag",
            "generators are fun",
            "コルーチン",
            "x < y > z",
            "<generator  object\n\n2\n00:00:03,000 --> 00:00:06,000",
        ] {
            assert!(!contains_corruption_marker(s), "false positive {s:?}");
        }
    }

    #[test]
    fn test_rejects_error_tags() {
        assert_eq!(
            check_text("Error: quota exceeded", "hello"),
            Err(Rejection::ErrorTag("error:"))
        );
        assert_eq!(
            check_text("Traceback (most recent call last)", "hello there friend"),
            Err(Rejection::ErrorTag("traceback"))
        );
        assert!(matches!(check_text("request TIMEOUT", "hello"), Err(Rejection::ErrorTag(_))));
    }

    #[test]
    fn test_marker_checked_before_error_tag() {
        let s = "error: <coroutine object x at 0x1>";
        assert_eq!(check_text(s, "hello"), Err(Rejection::CorruptionMarker));
    }

    #[test]
    fn test_length_ratio() {
        let ok = "a".repeat(75);
        assert!(check_text(&ok, "hello").is_ok());

        let long = "a".repeat(76);
        assert_eq!(
            check_text(&long, "hello"),
            Err(Rejection::LengthRatio { length: 76, original: 5 })
        );
    }

    #[test]
    fn test_length_ratio_counts_chars_not_bytes() {
        let ja = "あ".repeat(15);
        assert!(check_text(&ja, "a").is_ok());
    }

    #[test]
    fn test_rejects_control_characters() {
        assert_eq!(
            check_text("bad\u{0007}bell", "bad bell"),
            Err(Rejection::ControlCharacter('\u{0007}'))
        );
        assert!(check_text("ok\r\nfine", "ok fine").is_ok());
    }

    #[test]
    fn test_rejection_display() {
        assert!(Rejection::ErrorTag("failed").to_string().contains("failed"));
        assert!(Rejection::LengthRatio { length: 90, original: 2 }
            .to_string()
            .contains("15x"));
    }
}
