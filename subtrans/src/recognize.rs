//! Speech recognition collaborators.
//!
//! Recognizers only report what they heard. Times, text, and language come back
//! as [`RawRecognition`] and go through [`crate::normalize`] before anything
//! else looks at them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::audio::ExtractedAudio;
use crate::config::{Language, Model, RecognizerBackend, TranscriptionConfig};
use crate::error::{Error, Result};
use crate::model;
use crate::normalize::{self, NormalizeReport, RawChunk, RawRecognition, RawSegment};

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    /// Recognize one 16 kHz mono WAV file. `Language::Auto` asks for detection.
    async fn recognize(&self, audio: &Path, language: Language) -> Result<RawRecognition>;
}

/// Recognize every chunk of `audio` in order and normalize the result.
pub async fn transcribe_audio(
    recognizer: &dyn SpeechRecognizer,
    audio: &ExtractedAudio,
    language: Language,
) -> Result<NormalizeReport> {
    let mut chunks = Vec::with_capacity(audio.chunks.len());
    for chunk in &audio.chunks {
        info!(
            recognizer = recognizer.name(),
            chunk = chunk.index + 1,
            total = audio.chunks.len(),
            "recognizing speech"
        );
        let recognition = recognizer.recognize(&chunk.path, language).await?;
        debug!(chunk = chunk.index, segments = recognition.segments.len(), "chunk recognized");
        chunks.push(RawChunk {
            index: chunk.index,
            recognition,
        });
    }
    normalize::normalize_chunks(chunks, audio.chunk_length_secs)
}

/// Build the recognizer selected by `[transcription] backend`.
pub fn recognizer_from_config(config: &TranscriptionConfig) -> Result<Box<dyn SpeechRecognizer>> {
    match config.backend {
        RecognizerBackend::WhisperCli => Ok(Box::new(WhisperCli::from_config(config)?)),
        #[cfg(feature = "whisper")]
        RecognizerBackend::WhisperRs => Ok(Box::new(WhisperLocal::from_config(config)?)),
        #[cfg(not(feature = "whisper"))]
        RecognizerBackend::WhisperRs => Err(Error::Config(
            "backend \"whisper-rs\" needs subtrans built with the \"whisper\" feature".into(),
        )),
    }
}

/// whisper.cpp's `whisper-cli` binary, run once per audio file with JSON output.
pub struct WhisperCli {
    binary: String,
    model: Model,
    cache_dir: PathBuf,
    threads: Option<u32>,
    gpu: bool,
}

impl WhisperCli {
    pub fn new(binary: impl Into<String>, model: Model, cache_dir: PathBuf) -> Self {
        Self {
            binary: binary.into(),
            model,
            cache_dir,
            threads: None,
            gpu: true,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let mut cli = Self::new(&config.whisper_cli, config.model()?, config.resolve_cache_dir());
        cli.threads = config.threads;
        cli.gpu = config.gpu;
        Ok(cli)
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperCli {
    fn name(&self) -> &str {
        "whisper-cli"
    }

    async fn recognize(&self, audio: &Path, language: Language) -> Result<RawRecognition> {
        let model_path = model::ensure_model(&self.model, &self.cache_dir).await?;
        let prefix = audio.with_extension("");
        let mut json_name = prefix.as_os_str().to_os_string();
        json_name.push(".json");
        let json_path = PathBuf::from(json_name);

        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.arg("-m")
            .arg(&model_path)
            .arg("-f")
            .arg(audio)
            .args(["-l", whisper_language(language).unwrap_or("auto")])
            .args(["-oj", "-np", "-of"])
            .arg(&prefix);
        if let Some(threads) = self.threads {
            cmd.args(["-t", &threads.to_string()]);
        }
        if !self.gpu {
            cmd.arg("-ng");
        }

        let output = cmd.output().await.map_err(|e| {
            Error::Transcription(format!("cannot run {}: {e}", self.binary))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.chars().take(1000).collect();
            return Err(Error::Transcription(format!("{} failed: {stderr}", self.binary)));
        }

        let json = std::fs::read_to_string(&json_path).map_err(|e| {
            Error::Transcription(format!("no output at {}: {e}", json_path.display()))
        })?;
        std::fs::remove_file(&json_path).ok();
        parse_whisper_cli_json(&json)
    }
}

#[derive(Deserialize)]
struct CliOutput {
    #[serde(default)]
    result: Option<CliResult>,
    #[serde(default)]
    transcription: Vec<CliSegment>,
}

#[derive(Deserialize)]
struct CliResult {
    language: Option<String>,
}

#[derive(Deserialize)]
struct CliSegment {
    #[serde(default)]
    offsets: Option<CliOffsets>,
    #[serde(default)]
    text: Value,
}

#[derive(Deserialize)]
struct CliOffsets {
    #[serde(default)]
    from: Value,
    #[serde(default)]
    to: Value,
}

/// Language code for whisper. `None` means detect the language and then
/// transcribe; whisper's detect-only mode is never used.
fn whisper_language(language: Language) -> Option<&'static str> {
    language.code()
}

/// Milliseconds to seconds. Anything unreadable stays as is so the
/// normalizer can report it.
fn millis_to_secs(value: Value) -> Value {
    match normalize::coerce_seconds(&value) {
        Some(ms) => Value::from(ms / 1000.0),
        None => value,
    }
}

/// Parse the `-oj` output of `whisper-cli`.
pub fn parse_whisper_cli_json(json: &str) -> Result<RawRecognition> {
    let output: CliOutput = serde_json::from_str(json)
        .map_err(|e| Error::Transcription(format!("unreadable whisper-cli output: {e}")))?;

    let segments = output
        .transcription
        .into_iter()
        .map(|seg| {
            let (start, end) = match seg.offsets {
                Some(o) => (millis_to_secs(o.from), millis_to_secs(o.to)),
                None => (Value::Null, Value::Null),
            };
            RawSegment {
                start,
                end,
                text: seg.text,
            }
        })
        .collect();

    Ok(RawRecognition {
        language: output.result.and_then(|r| r.language),
        text: None,
        segments,
    })
}

/// In-process whisper.cpp through `whisper-rs`.
#[cfg(feature = "whisper")]
pub struct WhisperLocal {
    model: Model,
    cache_dir: PathBuf,
    threads: Option<u32>,
    gpu: bool,
}

#[cfg(feature = "whisper")]
impl WhisperLocal {
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        Ok(Self {
            model: config.model()?,
            cache_dir: config.resolve_cache_dir(),
            threads: config.threads,
            gpu: config.gpu,
        })
    }
}

#[cfg(feature = "whisper")]
#[async_trait]
impl SpeechRecognizer for WhisperLocal {
    fn name(&self) -> &str {
        "whisper-rs"
    }

    async fn recognize(&self, audio: &Path, language: Language) -> Result<RawRecognition> {
        let model_path = model::ensure_model(&self.model, &self.cache_dir).await?;
        let audio = audio.to_path_buf();
        let (threads, gpu) = (self.threads, self.gpu);

        tokio::task::spawn_blocking(move || {
            let samples = crate::audio::load_samples(&audio)?;
            run_whisper(&samples, &model_path, language, threads, gpu)
        })
        .await
        .map_err(|e| Error::Transcription(format!("recognition task failed: {e}")))?
    }
}

/// Samples must be 16 kHz mono f32.
#[cfg(feature = "whisper")]
fn run_whisper(
    samples: &[f32],
    model_path: &Path,
    language: Language,
    threads: Option<u32>,
    gpu: bool,
) -> Result<RawRecognition> {
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    info!(model = %model_path.display(), "loading whisper model");
    let mut ctx_params = WhisperContextParameters::new();
    ctx_params.use_gpu(gpu);

    let model_path = model_path
        .to_str()
        .ok_or_else(|| Error::Model("model path is not valid UTF-8".into()))?;
    let ctx = WhisperContext::new_with_params(model_path, ctx_params)?;
    let mut state = ctx.create_state()?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
    params.set_language(whisper_language(language));
    if let Some(n) = threads {
        params.set_n_threads(n as i32);
    }
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_timestamps(false);

    state.full(params, samples)?;

    let n_segments = state.full_n_segments();
    let mut segments = Vec::with_capacity(n_segments.max(0) as usize);
    for i in 0..n_segments {
        let segment = state
            .get_segment(i)
            .ok_or_else(|| Error::Transcription(format!("segment {i} missing")))?;
        let text = segment
            .to_str_lossy()
            .map_err(|e| Error::Transcription(format!("segment {i} text: {e}")))?
            .into_owned();
        // whisper timestamps are in centiseconds
        segments.push(RawSegment::new(
            segment.start_timestamp() as f64 / 100.0,
            segment.end_timestamp() as f64 / 100.0,
            text,
        ));
    }

    let language = whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string);
    debug!(segments = segments.len(), ?language, "whisper run complete");

    Ok(RawRecognition {
        language,
        text: None,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use std::sync::Mutex;

    const CLI_OUTPUT: &str = r#"{
        "systeminfo": "AVX = 1",
        "model": {"type": "base"},
        "params": {"model": "ggml-base.bin", "language": "auto", "translate": false},
        "result": {"language": "en"},
        "transcription": [
            {"timestamps": {"from": "00:00:00,000", "to": "00:00:03,000"},
             "offsets": {"from": 0, "to": 3000}, "text": " Hello"},
            {"timestamps": {"from": "00:00:03,000", "to": "00:00:06,000"},
             "offsets": {"from": 3000, "to": 6000}, "text": " World"}
        ]
    }"#;

    #[test]
    fn test_parse_whisper_cli_json() {
        let raw = parse_whisper_cli_json(CLI_OUTPUT).unwrap();
        assert_eq!(raw.language.as_deref(), Some("en"));
        assert_eq!(raw.segments.len(), 2);
        assert_eq!(raw.segments[1].start, Value::from(3.0));
        assert_eq!(raw.segments[1].end, Value::from(6.0));
        assert_eq!(raw.segments[0].text, Value::from(" Hello"));
    }

    #[test]
    fn test_parse_whisper_cli_json_keeps_bad_offsets_for_normalizer() {
        let raw = parse_whisper_cli_json(
            r#"{"transcription": [{"offsets": {"from": "n/a", "to": 500}, "text": "x"}, {"text": "y"}]}"#,
        )
        .unwrap();
        assert_eq!(raw.language, None);
        assert_eq!(raw.segments[0].start, Value::from("n/a"));
        assert_eq!(raw.segments[0].end, Value::from(0.5));
        assert_eq!(raw.segments[1].start, Value::Null);

        let report = normalize::normalize(raw);
        assert!(matches!(report.unwrap_err(), Error::EmptyTranscript));
    }

    #[test]
    fn test_parse_whisper_cli_json_garbage() {
        assert!(matches!(
            parse_whisper_cli_json("not json").unwrap_err(),
            Error::Transcription(_)
        ));
    }

    #[cfg(not(feature = "whisper"))]
    #[test]
    fn test_whisper_rs_backend_needs_feature() {
        let config = TranscriptionConfig {
            backend: RecognizerBackend::WhisperRs,
            ..Default::default()
        };
        assert!(matches!(recognizer_from_config(&config).err(), Some(Error::Config(_))));
    }

    #[test]
    fn test_whisper_language_auto_is_unset() {
        assert_eq!(whisper_language(Language::Auto), None);
        assert_eq!(whisper_language(Language::new("de").unwrap()), Some("de"));
    }

    struct PerChunk {
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl SpeechRecognizer for PerChunk {
        fn name(&self) -> &str {
            "per-chunk"
        }

        async fn recognize(&self, audio: &Path, _language: Language) -> Result<RawRecognition> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(audio.to_path_buf());
            Ok(RawRecognition {
                language: (seen.len() == 2).then(|| "de".to_string()),
                text: None,
                segments: vec![RawSegment::new(1.0, 2.0, format!("chunk {}", seen.len()))],
            })
        }
    }

    #[tokio::test]
    async fn test_transcribe_audio_offsets_chunks() {
        let audio = ExtractedAudio {
            path: PathBuf::from("a.wav"),
            duration_secs: 45.0,
            chunks: vec![
                AudioChunk { index: 0, path: PathBuf::from("a_0.wav") },
                AudioChunk { index: 1, path: PathBuf::from("a_1.wav") },
            ],
            chunk_length_secs: 30.0,
        };
        let recognizer = PerChunk { seen: Mutex::new(Vec::new()) };

        let report = transcribe_audio(&recognizer, &audio, Language::Auto).await.unwrap();
        let t = report.transcript;
        assert_eq!(t.detected_language, "de");
        assert_eq!(t.segments.len(), 2);
        assert_eq!((t.segments[1].start, t.segments[1].end), (31.0, 32.0));
        assert_eq!(t.segments[1].text, "chunk 2");
        assert_eq!(recognizer.seen.lock().unwrap().len(), 2);
    }
}
