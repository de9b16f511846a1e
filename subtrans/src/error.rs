use std::fmt;
use std::path::PathBuf;

/// All errors that can occur in subtrans.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("invalid timestamp: \"{0}\" — expected HH:MM:SS,mmm")]
    Format(String),

    #[error("transcript has no usable segments")]
    EmptyTranscript,

    #[error("no valid subtitle entries to write")]
    NoValidSegments,

    #[error("subtitle self-check failed for {path}: {reason}")]
    SelfCheck { path: PathBuf, reason: String },

    #[error("subtitle parse error: {0}")]
    Parse(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model not found: {path}")]
    ModelNotFound { path: PathBuf },

    #[error("model download failed: {0}")]
    ModelDownload(String),

    #[error("audio extraction error: {0}")]
    AudioDecode(String),

    #[error("file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("unsupported language: \"{0}\" — use Language::supported() to list valid codes")]
    UnsupportedLanguage(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    #[cfg(feature = "whisper")]
    #[error("whisper error: {0}")]
    Whisper(#[from] whisper_rs::WhisperError),

    #[error("translation error: {0}")]
    Translation(#[from] TranslateError),

    #[error("download error: {0}")]
    Download(String),

    #[error("video unavailable: {0}")]
    Unavailable(String),

    #[error("yt-dlp not found — install with: pip install yt-dlp")]
    YtDlpNotFound,

    #[error("ffmpeg not found — install with: apt install ffmpeg")]
    FfmpegNotFound,

    #[error("muxing failed: {0}")]
    Mux(String),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<Error>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Wrap this error as the failure of a pipeline stage.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ Error::Stage { .. } => already,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// The pipeline stage that failed, if this is a stage error.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    ExtractAudio,
    Transcribe,
    Translate,
    Render,
    Mux,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::ExtractAudio => "extract-audio",
            Stage::Transcribe => "transcribe",
            Stage::Translate => "translate",
            Stage::Render => "render",
            Stage::Mux => "mux",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a failed external call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limiting, service unavailable, timeouts, dropped connections.
    Transient,
    /// Anything a retry will not fix (bad credentials, bad request, ...).
    Fatal,
}

impl ErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

const RATE_LIMIT_SIGNATURES: &[&str] = &["429", "rate limit", "too many requests", "throttled"];

const TRANSIENT_SIGNATURES: &[&str] = &[
    "503",
    "502",
    "504",
    "service unavailable",
    "bad gateway",
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "temporarily",
];

/// Classify an error message from an external service.
///
/// Matching is case-insensitive and purely textual; services that only report
/// failures as strings are mapped onto [`ErrorKind`] here and nowhere else.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_lowercase();
    if is_rate_limited(&lower)
        || TRANSIENT_SIGNATURES
            .iter()
            .any(|signature| lower.contains(signature))
    {
        ErrorKind::Transient
    } else {
        ErrorKind::Fatal
    }
}

/// Whether an error message signals rate limiting (429 and friends).
pub fn is_rate_limited(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

/// Failure of a single translation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TranslateError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TranslateError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Fatal,
            message: message.into(),
        }
    }

    /// Build an error whose kind is derived from the message text.
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_message(&message),
            message,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        is_rate_limited(&self.message)
    }
}

impl From<reqwest::Error> for TranslateError {
    fn from(err: reqwest::Error) -> Self {
        let transient = err.is_timeout()
            || err.is_connect()
            || err
                .status()
                .is_some_and(|s| s.as_u16() == 429 || s.is_server_error());
        let message = err.to_string();
        if transient {
            Self::transient(message)
        } else {
            Self::classified(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_format() {
        let e = Error::Format("12:00".into());
        assert!(e.to_string().contains("12:00"));
        assert!(e.to_string().contains("HH:MM:SS,mmm"));
    }

    #[test]
    fn test_error_display_self_check() {
        let e = Error::SelfCheck {
            path: PathBuf::from("/tmp/out.srt"),
            reason: "file is empty".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/out.srt"));
        assert!(msg.contains("file is empty"));
    }

    #[test]
    fn test_error_in_stage_names_stage() {
        let e = Error::EmptyTranscript.in_stage(Stage::Transcribe);
        assert_eq!(e.stage(), Some(Stage::Transcribe));
        assert_eq!(
            e.to_string(),
            "transcribe stage failed: transcript has no usable segments"
        );
    }

    #[test]
    fn test_error_in_stage_does_not_double_wrap() {
        let e = Error::NoValidSegments
            .in_stage(Stage::Render)
            .in_stage(Stage::Mux);
        assert_eq!(e.stage(), Some(Stage::Render));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<String>("invalid json").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Json(_)));
    }

    #[test]
    fn test_classify_rate_limit() {
        assert_eq!(classify_message("HTTP Error 429: Too Many Requests"), ErrorKind::Transient);
        assert_eq!(classify_message("Rate limit exceeded"), ErrorKind::Transient);
        assert!(is_rate_limited("rate LIMIT hit"));
    }

    #[test]
    fn test_classify_service_unavailable() {
        assert_eq!(classify_message("503 Service Unavailable"), ErrorKind::Transient);
        assert_eq!(classify_message("operation timed out"), ErrorKind::Transient);
    }

    #[test]
    fn test_classify_fatal() {
        assert_eq!(classify_message("403 Forbidden: invalid auth key"), ErrorKind::Fatal);
        assert_eq!(classify_message(""), ErrorKind::Fatal);
    }

    #[test]
    fn test_translate_error_classified() {
        let e = TranslateError::classified("429 Too Many Requests");
        assert!(e.kind.is_transient());
        assert!(e.is_rate_limited());

        let e = TranslateError::classified("unsupported target language");
        assert_eq!(e.kind, ErrorKind::Fatal);
        assert!(!e.is_rate_limited());
    }
}
