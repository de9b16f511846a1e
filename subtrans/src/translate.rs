//! Segment translation through an external service.
//!
//! Every call is awaited to completion under a per-attempt timeout, so only a
//! resolved `String` ever reaches the validator. Rejected or failed results
//! fall back per [`FallbackPolicy`]; one bad segment never aborts the run.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{FallbackPolicy, Language, TranslationConfig, TranslationMethod};
use crate::error::{Error, Result, TranslateError};
use crate::repair::PLACEHOLDER;
use crate::types::{Segment, Transcript, TranslatedTranscript};
use crate::validate::{self, Rejection};

type CallResult = std::result::Result<String, TranslateError>;

/// A machine-translation service.
///
/// Implementations return the translated text or a classified failure. They
/// never hand back anything that still has to be awaited.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn translate(&self, text: &str, source: Language, target: Language) -> CallResult;
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("subtrans/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn status_error(status: StatusCode, body: &str) -> TranslateError {
    let body: String = body.chars().take(300).collect();
    TranslateError::classified(format!("HTTP {status}: {body}"))
}

async fn read_json(response: reqwest::Response) -> std::result::Result<Value, TranslateError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, &body));
    }
    response
        .json::<Value>()
        .await
        .map_err(|e| TranslateError::fatal(format!("unreadable response: {e}")))
}

fn not_text(service: &str) -> TranslateError {
    TranslateError::fatal(format!("{service} response has no translated text"))
}

/// The public Google Translate web endpoint. No key required.
pub struct GoogleWeb {
    client: reqwest::Client,
}

impl GoogleWeb {
    const ENDPOINT: &'static str = "https://translate.googleapis.com/translate_a/single";

    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
        })
    }
}

/// Concatenate the sentence pieces of a `translate_a/single` response.
pub(crate) fn parse_google_response(body: &Value) -> CallResult {
    let sentences = body
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| not_text("google"))?;
    let text: String = sentences
        .iter()
        .filter_map(|s| s.get(0).and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        return Err(not_text("google"));
    }
    Ok(text)
}

#[async_trait]
impl TranslationBackend for GoogleWeb {
    fn name(&self) -> &str {
        "google"
    }

    async fn translate(&self, text: &str, source: Language, target: Language) -> CallResult {
        let sl = source.code().unwrap_or("auto");
        let tl = target
            .code()
            .ok_or_else(|| TranslateError::fatal("target language must not be auto"))?;
        let response = self
            .client
            .get(Self::ENDPOINT)
            .query(&[("client", "gtx"), ("sl", sl), ("tl", tl), ("dt", "t"), ("q", text)])
            .send()
            .await?;
        parse_google_response(&read_json(response).await?)
    }
}

/// DeepL API (free or pro, chosen from the key suffix).
pub struct DeepL {
    client: reqwest::Client,
    api_key: String,
}

impl DeepL {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
        })
    }

    fn endpoint(&self) -> &'static str {
        if self.api_key.ends_with(":fx") {
            "https://api-free.deepl.com/v2/translate"
        } else {
            "https://api.deepl.com/v2/translate"
        }
    }
}

pub(crate) fn parse_deepl_response(body: &Value) -> CallResult {
    body.pointer("/translations/0/text")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| not_text("deepl"))
}

#[async_trait]
impl TranslationBackend for DeepL {
    fn name(&self) -> &str {
        "deepl"
    }

    async fn translate(&self, text: &str, source: Language, target: Language) -> CallResult {
        let target_lang = target
            .deepl_target()
            .ok_or_else(|| TranslateError::fatal("target language must not be auto"))?;
        let mut body = json!({ "text": [text], "target_lang": target_lang });
        if let Some(source_lang) = source.deepl_source() {
            body["source_lang"] = Value::String(source_lang);
        }
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .json(&body)
            .send()
            .await?;
        parse_deepl_response(&read_json(response).await?)
    }
}

/// OpenAI chat completions, prompted to return only the translation.
pub struct OpenAi {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAi {
    const ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";

    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
        })
    }
}

pub(crate) fn parse_openai_response(body: &Value) -> CallResult {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| not_text("openai"))
}

#[async_trait]
impl TranslationBackend for OpenAi {
    fn name(&self) -> &str {
        "openai"
    }

    async fn translate(&self, text: &str, _source: Language, target: Language) -> CallResult {
        let language = target
            .name()
            .ok_or_else(|| TranslateError::fatal("target language must not be auto"))?;
        let body = json!({
            "model": self.model,
            "temperature": 0.1,
            "messages": [
                {
                    "role": "system",
                    "content": format!(
                        "Translate the following text to {language}. Return only the translation without any explanations."
                    )
                },
                {"role": "user", "content": text}
            ]
        });
        let response = self
            .client
            .post(Self::ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        parse_openai_response(&read_json(response).await?)
    }
}

/// Build the backend named by the config.
pub fn backend_from_config(config: &TranslationConfig) -> Result<Box<dyn TranslationBackend>> {
    let timeout = config.timeout();
    Ok(match config.method {
        TranslationMethod::Google => Box::new(GoogleWeb::new(timeout)?),
        TranslationMethod::Deepl => {
            let key = config.deepl_api_key().ok_or_else(|| {
                Error::Config("translation.method = \"deepl\" needs deepl_api_key or DEEPL_API_KEY".into())
            })?;
            Box::new(DeepL::new(key, timeout)?)
        }
        TranslationMethod::Openai => {
            let key = config.openai_api_key().ok_or_else(|| {
                Error::Config("translation.method = \"openai\" needs openai_api_key or OPENAI_API_KEY".into())
            })?;
            Box::new(OpenAi::new(key, config.openai_model.clone(), timeout)?)
        }
    })
}

/// Retry, pacing and fallback behaviour of a [`Translator`].
#[derive(Debug, Clone)]
pub struct TranslatorSettings {
    pub source: Language,
    pub retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub max_text_length: usize,
    pub fallback: FallbackPolicy,
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self::from_config(&TranslationConfig::default()).unwrap_or(Self {
            source: Language::Auto,
            retries: 3,
            retry_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            batch_size: 3,
            batch_pause: Duration::from_secs(1),
            max_text_length: 4000,
            fallback: FallbackPolicy::Original,
        })
    }
}

impl TranslatorSettings {
    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        Ok(Self {
            source: config.source_language()?,
            retries: config.retries.max(1),
            retry_delay: config.retry_delay(),
            timeout: config.timeout(),
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause(),
            max_text_length: config.max_text_length.max(1),
            fallback: config.fallback,
        })
    }
}

/// Why a piece of text kept its fallback instead of a translation.
#[derive(Debug, Clone, PartialEq)]
pub enum FallbackReason {
    Rejected(Rejection),
    Failed(TranslateError),
}

/// Result of translating one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub enum TextOutcome {
    Translated(String),
    Fallback { text: String, reason: FallbackReason },
}

impl TextOutcome {
    pub fn text(&self) -> &str {
        match self {
            TextOutcome::Translated(text) | TextOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TextOutcome::Translated(text) | TextOutcome::Fallback { text, .. } => text,
        }
    }

    pub fn is_translated(&self) -> bool {
        matches!(self, TextOutcome::Translated(_))
    }
}

static SENTENCE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?。！？]\s*").expect("valid sentence regex"));

/// Split `text` into pieces of at most `max_chars` characters, preferring
/// sentence boundaries. A single sentence longer than the limit is cut hard.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut sentences = Vec::new();
    let mut last = 0;
    for m in SENTENCE_END.find_iter(text) {
        sentences.push(&text[last..m.end()]);
        last = m.end();
    }
    if last < text.len() {
        sentences.push(&text[last..]);
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    for sentence in sentences {
        if current.chars().count() + sentence.chars().count() <= max_chars {
            current.push_str(sentence);
            continue;
        }
        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if sentence.chars().count() <= max_chars {
            current.push_str(sentence);
        } else {
            let chars: Vec<char> = sentence.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Translates transcripts segment by segment through one backend.
pub struct Translator {
    backend: Box<dyn TranslationBackend>,
    settings: TranslatorSettings,
}

impl Translator {
    pub fn new(backend: Box<dyn TranslationBackend>, settings: TranslatorSettings) -> Self {
        Self { backend, settings }
    }

    pub fn from_config(config: &TranslationConfig) -> Result<Self> {
        Ok(Self::new(
            backend_from_config(config)?,
            TranslatorSettings::from_config(config)?,
        ))
    }

    pub fn settings(&self) -> &TranslatorSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// One backend call with timeout and retries on transient failures.
    async fn call(&self, text: &str, source: Language, target: Language) -> CallResult {
        let retries = self.settings.retries.max(1);
        let mut last = TranslateError::fatal("no attempt made");

        for attempt in 0..retries {
            let result = tokio::time::timeout(
                self.settings.timeout,
                self.backend.translate(text, source, target),
            )
            .await;

            let err = match result {
                Ok(Ok(translated)) => return Ok(translated),
                Ok(Err(err)) => err,
                Err(_) => TranslateError::transient(format!(
                    "timed out after {:.1}s",
                    self.settings.timeout.as_secs_f64()
                )),
            };

            warn!(
                backend = self.backend.name(),
                attempt = attempt + 1,
                retries,
                kind = ?err.kind,
                error = %err,
                "translation attempt failed"
            );
            if !err.kind.is_transient() {
                return Err(err);
            }

            if attempt + 1 < retries {
                let factor = if err.is_rate_limited() { attempt + 2 } else { attempt + 1 };
                tokio::time::sleep(self.settings.retry_delay * factor).await;
            }
            last = err;
        }
        Err(last)
    }

    fn fallback_text(&self, original: &str) -> String {
        match self.settings.fallback {
            FallbackPolicy::Original => original.to_string(),
            FallbackPolicy::Placeholder => PLACEHOLDER.to_string(),
        }
    }

    async fn translate_piece(&self, text: &str, source: Language, target: Language) -> TextOutcome {
        let reason = match self.call(text, source, target).await {
            Ok(translated) => match validate::check_text(&translated, text) {
                Ok(()) => return TextOutcome::Translated(translated.trim().to_string()),
                Err(rejection) => FallbackReason::Rejected(rejection),
            },
            Err(err) => FallbackReason::Failed(err),
        };
        TextOutcome::Fallback {
            text: self.fallback_text(text),
            reason,
        }
    }

    /// Translate one piece of text. Texts longer than `max_text_length` are
    /// split on sentence boundaries and translated piecewise.
    pub async fn translate_text(&self, text: &str, source: Language, target: Language) -> TextOutcome {
        if text.trim().is_empty() {
            return TextOutcome::Translated(text.to_string());
        }
        if text.chars().count() <= self.settings.max_text_length {
            return self.translate_piece(text, source, target).await;
        }

        let pieces = split_text(text, self.settings.max_text_length);
        info!(
            chars = text.chars().count(),
            pieces = pieces.len(),
            "splitting long text for translation"
        );
        let mut translated = Vec::with_capacity(pieces.len());
        let mut first_failure = None;
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
            match self.translate_piece(piece, source, target).await {
                TextOutcome::Translated(t) => translated.push(t),
                TextOutcome::Fallback { reason, .. } => {
                    translated.push(piece.clone());
                    first_failure.get_or_insert(reason);
                }
            }
        }

        match first_failure {
            None => TextOutcome::Translated(translated.join(" ")),
            Some(reason) if self.settings.fallback == FallbackPolicy::Placeholder => {
                TextOutcome::Fallback {
                    text: PLACEHOLDER.to_string(),
                    reason,
                }
            }
            Some(reason) => TextOutcome::Fallback {
                text: translated.join(" "),
                reason,
            },
        }
    }

    /// Translate every segment of `transcript` in order.
    pub async fn translate_transcript(
        &self,
        transcript: &Transcript,
        target: Language,
    ) -> Result<TranslatedTranscript> {
        let target_code = target.code().ok_or_else(|| {
            Error::Config("translation target must be a specific language, not auto".into())
        })?;
        if transcript.segments.is_empty() {
            return Err(Error::EmptyTranscript);
        }

        let source = if self.settings.source.is_auto() {
            Language::new(&transcript.detected_language).unwrap_or(Language::Auto)
        } else {
            self.settings.source
        };

        let total = transcript.segments.len();
        info!(
            backend = self.backend.name(),
            source = %source,
            target = target_code,
            segments = total,
            "translating transcript"
        );

        let mut segments = Vec::with_capacity(total);
        let mut fallbacks = 0;
        for (i, segment) in transcript.segments.iter().enumerate() {
            if i > 0 && i % self.settings.batch_size.max(1) == 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }

            let outcome = self.translate_text(&segment.text, source, target).await;
            if let TextOutcome::Fallback { reason, .. } = &outcome {
                fallbacks += 1;
                warn!(segment = i, ?reason, policy = ?self.settings.fallback, "segment kept fallback text");
            } else {
                debug!(segment = i, "segment translated");
            }
            segments.push(segment.translated(outcome.into_text()));

            if (i + 1) % 10 == 0 || i + 1 == total {
                info!(done = i + 1, total, "translation progress");
            }
        }

        let translated = TranslatedTranscript {
            source_language: source
                .code()
                .map(str::to_string)
                .unwrap_or_else(|| transcript.detected_language.clone()),
            target_language: target_code.to_string(),
            full_text: transcript.full_text.clone(),
            translated_full_text: crate::types::join_texts(&segments),
            segments,
        };
        info!(
            translated = total - fallbacks,
            fallbacks,
            "translation finished"
        );
        Ok(translated)
    }
}

/// Translate an already-normalized segment list with a fresh transcript wrapper.
pub async fn translate_segments(
    translator: &Translator,
    segments: &[Segment],
    source_language: &str,
    target: Language,
) -> Result<TranslatedTranscript> {
    let transcript = Transcript {
        detected_language: source_language.to_string(),
        full_text: crate::types::join_texts(segments),
        segments: segments.to_vec(),
    };
    translator.translate_transcript(&transcript, target).await
}
