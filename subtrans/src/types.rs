use serde::{Deserialize, Serialize};

/// Duration given to a segment whose end does not come after its start.
pub const MIN_SEGMENT_SECS: f64 = 1.0;

/// A timed span of transcript text.
///
/// After translation `text` holds the subtitle line and `original_text` the
/// source-language text it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

impl Segment {
    /// Build a segment, clamping negative times to zero and forcing `end > start`.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        let start = clamp_time(start);
        let mut end = clamp_time(end);
        if end <= start {
            end = start + MIN_SEGMENT_SECS;
        }
        Self {
            start,
            end,
            text: text.into(),
            original_text: None,
        }
    }

    /// A copy of this segment carrying `translated` as its text.
    pub fn translated(&self, translated: impl Into<String>) -> Self {
        Self {
            start: self.start,
            end: self.end,
            text: translated.into(),
            original_text: Some(self.source_text().to_string()),
        }
    }

    /// Source-language text: `original_text` if translated, else `text`.
    pub fn source_text(&self) -> &str {
        self.original_text.as_deref().unwrap_or(&self.text)
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

fn clamp_time(t: f64) -> f64 {
    if t.is_finite() && t > 0.0 {
        t
    } else {
        0.0
    }
}

/// Normalized speech-recognition result for one source video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub detected_language: String,
    pub full_text: String,
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// Segment texts joined with spaces.
    pub fn text(&self) -> String {
        join_texts(&self.segments)
    }

    /// Format as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A transcript after the translation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslatedTranscript {
    pub source_language: String,
    pub target_language: String,
    pub full_text: String,
    pub translated_full_text: String,
    pub segments: Vec<Segment>,
}

impl TranslatedTranscript {
    /// Number of segments whose subtitle text differs from the source text.
    pub fn translated_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.original_text.as_deref().is_some_and(|o| o != s.text))
            .count()
    }
}

pub(crate) fn join_texts(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
