//! Raw speech-recognition output → canonical [`Transcript`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{Segment, Transcript};

/// One recognized span as the recognizer reported it.
///
/// Fields stay untyped: recognizers and hand-edited transcript files report
/// times as numbers, numeric strings, or not at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSegment {
    #[serde(default)]
    pub start: Value,
    #[serde(default)]
    pub end: Value,
    #[serde(default)]
    pub text: Value,
}

impl RawSegment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start: Value::from(start),
            end: Value::from(end),
            text: Value::String(text.into()),
        }
    }
}

/// Output of one recognizer invocation (whole file or one chunk).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawRecognition {
    #[serde(default, alias = "detected_language")]
    pub language: Option<String>,
    #[serde(default, alias = "full_text")]
    pub text: Option<String>,
    #[serde(default)]
    pub segments: Vec<RawSegment>,
}

/// A recognition result together with the chunk it came from.
#[derive(Debug, Clone)]
pub struct RawChunk {
    pub index: usize,
    pub recognition: RawRecognition,
}

/// Why a raw segment was dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// `start` or `end` could not be read as a number.
    BadTime { field: &'static str, value: String },
    /// Text missing or blank.
    EmptyText,
}

/// A dropped raw segment, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Skip {
    pub chunk: usize,
    pub segment: usize,
    pub reason: SkipReason,
}

/// Normalized transcript plus the segments that did not survive.
#[derive(Debug, Clone)]
pub struct NormalizeReport {
    pub transcript: Transcript,
    pub skipped: Vec<Skip>,
}

/// Read a time field as seconds. Accepts numbers and numeric strings.
pub fn coerce_seconds(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    seconds.is_finite().then_some(seconds)
}

fn coerce_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn normalize_segment(raw: &RawSegment, offset: f64) -> std::result::Result<Segment, SkipReason> {
    let start = coerce_seconds(&raw.start).ok_or_else(|| SkipReason::BadTime {
        field: "start",
        value: raw.start.to_string(),
    })?;
    let end = coerce_seconds(&raw.end).ok_or_else(|| SkipReason::BadTime {
        field: "end",
        value: raw.end.to_string(),
    })?;
    let text = coerce_text(&raw.text).ok_or(SkipReason::EmptyText)?;
    Ok(Segment::new(start + offset, end + offset, text))
}

/// Normalize a single whole-file recognition result.
pub fn normalize(recognition: RawRecognition) -> Result<NormalizeReport> {
    normalize_chunks(
        vec![RawChunk {
            index: 0,
            recognition,
        }],
        0.0,
    )
}

/// Normalize chunked recognition results into one transcript.
///
/// Chunk `i` is shifted by `i * chunk_length_secs`. Segments keep recognition
/// order; chunks are taken in the order given.
pub fn normalize_chunks(chunks: Vec<RawChunk>, chunk_length_secs: f64) -> Result<NormalizeReport> {
    let mut segments = Vec::new();
    let mut skipped = Vec::new();
    let mut language: Option<String> = None;
    let mut texts = Vec::new();

    for chunk in &chunks {
        let offset = chunk.index as f64 * chunk_length_secs;
        let recognition = &chunk.recognition;

        if language.is_none() {
            language = recognition
                .language
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string);
        }
        if let Some(text) = recognition.text.as_deref().map(str::trim) {
            if !text.is_empty() {
                texts.push(text.to_string());
            }
        }

        for (i, raw) in recognition.segments.iter().enumerate() {
            match normalize_segment(raw, offset) {
                Ok(segment) => segments.push(segment),
                Err(reason) => {
                    match &reason {
                        SkipReason::BadTime { field, value } => {
                            warn!(chunk = chunk.index, segment = i, field, %value, "skipping segment with unreadable time")
                        }
                        SkipReason::EmptyText => {
                            debug!(chunk = chunk.index, segment = i, "skipping empty segment")
                        }
                    }
                    skipped.push(Skip {
                        chunk: chunk.index,
                        segment: i,
                        reason,
                    });
                }
            }
        }
    }

    if segments.is_empty() {
        warn!(
            chunks = chunks.len(),
            skipped = skipped.len(),
            "no segments survived normalization"
        );
        return Err(Error::EmptyTranscript);
    }

    let full_text = if texts.is_empty() {
        crate::types::join_texts(&segments)
    } else {
        texts.join(" ")
    };

    info!(
        segments = segments.len(),
        skipped = skipped.len(),
        chunks = chunks.len(),
        "transcript normalized"
    );

    Ok(NormalizeReport {
        transcript: Transcript {
            detected_language: language.unwrap_or_else(|| "unknown".to_string()),
            full_text,
            segments,
        },
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawSegment {
        serde_json::from_value(value).unwrap()
    }

    fn recognition(segments: Vec<RawSegment>) -> RawRecognition {
        RawRecognition {
            language: Some("en".into()),
            text: None,
            segments,
        }
    }

    #[test]
    fn test_coerce_seconds() {
        assert_eq!(coerce_seconds(&json!(1.5)), Some(1.5));
        assert_eq!(coerce_seconds(&json!(3)), Some(3.0));
        assert_eq!(coerce_seconds(&json!(" 2.25 ")), Some(2.25));
        assert_eq!(coerce_seconds(&json!("abc")), None);
        assert_eq!(coerce_seconds(&json!("NaN")), None);
        assert_eq!(coerce_seconds(&json!(null)), None);
        assert_eq!(coerce_seconds(&json!([1])), None);
    }

    #[test]
    fn test_normalize_coerces_string_times() {
        let report = normalize(recognition(vec![raw(
            json!({"start": "1.0", "end": "2.5", "text": "  hi  "}),
        )]))
        .unwrap();
        let seg = &report.transcript.segments[0];
        assert_eq!((seg.start, seg.end), (1.0, 2.5));
        assert_eq!(seg.text, "hi");
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_normalize_skips_bad_segments_without_aborting() {
        let report = normalize(recognition(vec![
            raw(json!({"start": "x", "end": 1.0, "text": "bad start"})),
            raw(json!({"start": 0.0, "text": "missing end"})),
            raw(json!({"start": 0.0, "end": 1.0, "text": "   "})),
            raw(json!({"start": 0.0, "end": 1.0})),
            raw(json!({"start": 1.0, "end": 2.0, "text": "kept"})),
        ]))
        .unwrap();

        assert_eq!(report.transcript.segments.len(), 1);
        assert_eq!(report.transcript.segments[0].text, "kept");
        assert_eq!(report.skipped.len(), 4);
        assert!(matches!(
            report.skipped[0].reason,
            SkipReason::BadTime { field: "start", .. }
        ));
        assert!(matches!(
            report.skipped[1].reason,
            SkipReason::BadTime { field: "end", .. }
        ));
        assert_eq!(report.skipped[2].reason, SkipReason::EmptyText);
        assert_eq!(report.skipped[3].segment, 3);
    }

    #[test]
    fn test_normalize_stringifies_numeric_text() {
        let report = normalize(recognition(vec![raw(json!({"start": 0, "end": 1, "text": 42}))])).unwrap();
        assert_eq!(report.transcript.segments[0].text, "42");
    }

    #[test]
    fn test_normalize_empty_is_hard_failure() {
        let err = normalize(recognition(vec![raw(json!({"start": 0, "end": 1, "text": ""}))]))
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTranscript));

        let err = normalize(RawRecognition::default()).unwrap_err();
        assert!(matches!(err, Error::EmptyTranscript));
    }

    #[test]
    fn test_normalize_clamps_negative_times() {
        let report = normalize(recognition(vec![RawSegment::new(-5.0, -1.0, "x")])).unwrap();
        let seg = &report.transcript.segments[0];
        assert_eq!((seg.start, seg.end), (0.0, 1.0));
    }

    #[test]
    fn test_normalize_chunks_adds_offsets_in_order() {
        let chunks = vec![
            RawChunk {
                index: 0,
                recognition: RawRecognition {
                    language: Some("en".into()),
                    text: Some("one two".into()),
                    segments: vec![RawSegment::new(0.0, 2.0, "one"), RawSegment::new(2.0, 5.0, "two")],
                },
            },
            RawChunk {
                index: 1,
                recognition: RawRecognition {
                    language: Some("de".into()),
                    text: Some("three".into()),
                    segments: vec![RawSegment::new(1.0, 4.0, "three")],
                },
            },
        ];

        let report = normalize_chunks(chunks, 30.0).unwrap();
        let t = &report.transcript;
        assert_eq!(t.detected_language, "en");
        assert_eq!(t.full_text, "one two three");
        let times: Vec<_> = t.segments.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(times, vec![(0.0, 2.0), (2.0, 5.0), (31.0, 34.0)]);
    }

    #[test]
    fn test_normalize_does_not_resort() {
        let report = normalize(recognition(vec![
            RawSegment::new(5.0, 6.0, "later"),
            RawSegment::new(1.0, 2.0, "earlier"),
        ]))
        .unwrap();
        let texts: Vec<_> = report.transcript.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["later", "earlier"]);
    }

    #[test]
    fn test_normalize_unknown_language_and_joined_text() {
        let report = normalize(RawRecognition {
            language: None,
            text: None,
            segments: vec![RawSegment::new(0.0, 1.0, "a"), RawSegment::new(1.0, 2.0, "b")],
        })
        .unwrap();
        assert_eq!(report.transcript.detected_language, "unknown");
        assert_eq!(report.transcript.full_text, "a b");
    }

    #[test]
    fn test_raw_recognition_accepts_transcript_json() {
        let raw: RawRecognition = serde_json::from_value(json!({
            "detected_language": "en",
            "full_text": "Hello World",
            "segments": [{"start": 0.0, "end": 3.0, "text": "Hello"}]
        }))
        .unwrap();
        assert_eq!(raw.language.as_deref(), Some("en"));
        assert_eq!(raw.text.as_deref(), Some("Hello World"));
        assert_eq!(raw.segments.len(), 1);
    }
}
