//! Stage sequencing for one run: acquire → extract audio → transcribe →
//! translate → render → mux.
//!
//! Every stage either hands a usable artifact to the next one or the run stops
//! with [`Error::Stage`] naming it. Artifacts already written (video,
//! transcript JSON, subtitle file) stay on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::audio::{AudioSource, Ffmpeg};
use crate::config::{Config, Language, SubtitleFormat};
use crate::error::{Error, Result, Stage};
use crate::mux::{FfmpegMuxer, MuxOptions, Muxer};
use crate::normalize::{self, RawRecognition};
use crate::recognize::{self, SpeechRecognizer};
use crate::render;
use crate::translate::Translator;
use crate::types::{Transcript, TranslatedTranscript};

/// Fetches a video to a local file.
#[async_trait]
pub trait VideoSource: Send + Sync {
    async fn acquire(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Whether `input` goes to a [`VideoSource`] rather than being opened as a file.
pub fn is_url(input: &str) -> bool {
    let trimmed = input.trim();
    trimmed.starts_with("https://") || trimmed.starts_with("http://")
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub video: Option<PathBuf>,
    pub transcript_json: Option<PathBuf>,
    pub subtitle: PathBuf,
    pub vtt: Option<PathBuf>,
    /// Video with subtitles, if a source video was available.
    pub output: Option<PathBuf>,
    pub translated: TranslatedTranscript,
}

/// Removes a work directory when dropped.
struct TempDirGuard<'a>(&'a Path);

impl Drop for TempDirGuard<'_> {
    fn drop(&mut self) {
        if self.0.exists() {
            if let Err(e) = std::fs::remove_dir_all(self.0) {
                warn!(path = %self.0.display(), error = %e, "failed to remove work directory");
            }
        }
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "video".into())
}

/// Strip a trailing `.transcript` left over from a saved transcript's file name.
fn regen_stem(json_path: &Path) -> String {
    let stem = file_stem(json_path);
    stem.strip_suffix(".transcript").unwrap_or(&stem).to_string()
}

/// Load a saved transcript. Hand-edited files go through the normalizer again.
pub fn load_transcript(path: &Path) -> Result<Transcript> {
    if !path.exists() {
        return Err(Error::NotFound {
            path: path.to_path_buf(),
        });
    }
    let raw: RawRecognition = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let report = normalize::normalize(raw)?;
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), path = %path.display(), "saved transcript had unusable segments");
    }
    Ok(report.transcript)
}

pub struct Pipeline {
    config: Config,
    video_source: Option<Box<dyn VideoSource>>,
    audio: Box<dyn AudioSource>,
    recognizer: Box<dyn SpeechRecognizer>,
    translator: Translator,
    muxer: Box<dyn Muxer>,
}

impl Pipeline {
    /// Wire the default collaborators from a validated config.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;

        #[cfg(feature = "download")]
        let video_source: Option<Box<dyn VideoSource>> =
            Some(Box::new(crate::download::YtDlp::from_config(&config.download)?));
        #[cfg(not(feature = "download"))]
        let video_source: Option<Box<dyn VideoSource>> = None;

        Ok(Self {
            video_source,
            audio: Box::new(Ffmpeg::from_config(&config.transcription)),
            recognizer: recognize::recognizer_from_config(&config.transcription)?,
            translator: Translator::from_config(&config.translation)?,
            muxer: Box::new(FfmpegMuxer::default()),
            config,
        })
    }

    pub fn with_video_source(mut self, source: impl VideoSource + 'static) -> Self {
        self.video_source = Some(Box::new(source));
        self
    }

    pub fn with_audio_source(mut self, audio: impl AudioSource + 'static) -> Self {
        self.audio = Box::new(audio);
        self
    }

    pub fn with_recognizer(mut self, recognizer: impl SpeechRecognizer + 'static) -> Self {
        self.recognizer = Box::new(recognizer);
        self
    }

    pub fn with_translator(mut self, translator: Translator) -> Self {
        self.translator = translator;
        self
    }

    pub fn with_muxer(mut self, muxer: impl Muxer + 'static) -> Self {
        self.muxer = Box::new(muxer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run every stage for `input` (URL or local video) into `target`.
    pub async fn run(&self, input: &str, target: Language) -> Result<PipelineOutput> {
        let video = self
            .acquire(input)
            .await
            .map_err(|e| e.in_stage(Stage::Acquire))?;
        info!(stage = %Stage::Acquire, video = %video.display(), "stage complete");

        let stem = file_stem(&video);
        let work_dir = self.config.paths.work_dir.join(format!(
            "{stem}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        let _cleanup = self
            .config
            .paths
            .cleanup_temp_files
            .then(|| TempDirGuard(&work_dir));

        let audio = self
            .audio
            .extract(&video, &work_dir)
            .await
            .map_err(|e| e.in_stage(Stage::ExtractAudio))?;
        info!(stage = %Stage::ExtractAudio, chunks = audio.chunks.len(), "stage complete");

        let (transcript, transcript_json) = self
            .transcribe(&audio, &stem)
            .await
            .map_err(|e| e.in_stage(Stage::Transcribe))?;
        info!(
            stage = %Stage::Transcribe,
            segments = transcript.segments.len(),
            language = %transcript.detected_language,
            "stage complete"
        );

        let mut output = self.finish(&transcript, target, &stem, Some(&video)).await?;
        output.video = Some(video);
        output.transcript_json = Some(transcript_json);
        Ok(output)
    }

    /// Translate and render a saved transcript; mux into `video` if given.
    pub async fn subtitle_transcript(
        &self,
        transcript_json: &Path,
        target: Language,
        video: Option<&Path>,
    ) -> Result<PipelineOutput> {
        let transcript =
            load_transcript(transcript_json).map_err(|e| e.in_stage(Stage::Transcribe))?;
        info!(
            path = %transcript_json.display(),
            segments = transcript.segments.len(),
            "loaded saved transcript"
        );

        let stem = regen_stem(transcript_json);
        let mut output = self.finish(&transcript, target, &stem, video).await?;
        output.video = video.map(Path::to_path_buf);
        output.transcript_json = Some(transcript_json.to_path_buf());
        Ok(output)
    }

    /// Translate and render an in-memory transcript as `<stem>_translated.srt`.
    pub async fn subtitle(
        &self,
        transcript: &Transcript,
        target: Language,
        stem: &str,
    ) -> Result<PipelineOutput> {
        self.finish(transcript, target, stem, None).await
    }

    async fn acquire(&self, input: &str) -> Result<PathBuf> {
        if is_url(input) {
            let source = self.video_source.as_ref().ok_or_else(|| {
                Error::Config("URL input needs subtrans built with the \"download\" feature".into())
            })?;
            return source.acquire(input.trim(), &self.config.paths.download_dir).await;
        }

        let path = PathBuf::from(input);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound { path })
        }
    }

    async fn transcribe(
        &self,
        audio: &crate::audio::ExtractedAudio,
        stem: &str,
    ) -> Result<(Transcript, PathBuf)> {
        let language = self.config.transcription.language()?;
        let report = recognize::transcribe_audio(self.recognizer.as_ref(), audio, language).await?;
        if !report.skipped.is_empty() {
            warn!(skipped = report.skipped.len(), "some recognized segments were dropped");
        }

        let output_dir = &self.config.paths.output_dir;
        std::fs::create_dir_all(output_dir)?;
        let json_path = output_dir.join(format!("{stem}.transcript.json"));
        std::fs::write(&json_path, report.transcript.to_json_pretty()?)?;
        Ok((report.transcript, json_path))
    }

    /// Translate → render → mux.
    async fn finish(
        &self,
        transcript: &Transcript,
        target: Language,
        stem: &str,
        video: Option<&Path>,
    ) -> Result<PipelineOutput> {
        let translated = self
            .translator
            .translate_transcript(transcript, target)
            .await
            .map_err(|e| e.in_stage(Stage::Translate))?;
        info!(
            stage = %Stage::Translate,
            translated = translated.translated_count(),
            total = translated.segments.len(),
            "stage complete"
        );

        let (subtitle, vtt) = self
            .render(&translated, stem)
            .map_err(|e| e.in_stage(Stage::Render))?;
        info!(stage = %Stage::Render, path = %subtitle.display(), "stage complete");

        let output = match video {
            Some(video) => {
                let output = self.mux(video, &subtitle, stem, target).await;
                let output = output.map_err(|e| e.in_stage(Stage::Mux))?;
                info!(stage = %Stage::Mux, path = %output.display(), "stage complete");
                Some(output)
            }
            None => None,
        };

        Ok(PipelineOutput {
            video: None,
            transcript_json: None,
            subtitle,
            vtt,
            output,
            translated,
        })
    }

    /// Write the checked SRT file, plus a WebVTT sidecar when configured.
    fn render(
        &self,
        translated: &TranslatedTranscript,
        stem: &str,
    ) -> Result<(PathBuf, Option<PathBuf>)> {
        let doc = render::render(&translated.segments)?;
        let dir = &self.config.paths.output_dir;
        let subtitle = render::write_srt(&doc, &dir.join(format!("{stem}_translated.srt")))?;
        let vtt = match self.config.subtitle.format {
            SubtitleFormat::Vtt => {
                let path = dir.join(format!("{stem}_translated.vtt"));
                Some(render::write_vtt(&doc, &path)?)
            }
            SubtitleFormat::Srt => None,
        };
        Ok((subtitle, vtt))
    }

    async fn mux(
        &self,
        video: &Path,
        subtitle: &Path,
        stem: &str,
        target: Language,
    ) -> Result<PathBuf> {
        let options = MuxOptions::from_config(&self.config.subtitle, target);
        let output = self.config.paths.output_dir.join(format!("{stem}_subtitled.mp4"));
        self.muxer.mux(video, subtitle, &output, &options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/v"));
        assert!(is_url(" http://example.com/v "));
        assert!(!is_url("video.mp4"));
        assert!(!is_url("/home/me/http://x.mp4"));
    }

    #[test]
    fn test_regen_stem() {
        assert_eq!(regen_stem(Path::new("out/talk.transcript.json")), "talk");
        assert_eq!(regen_stem(Path::new("talk.json")), "talk");
    }

    #[test]
    fn test_load_transcript_renormalizes() {
        let path = std::env::temp_dir().join(format!("subtrans_load_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"detected_language": "en", "full_text": "a b",
                "segments": [{"start": "1.5", "end": 1.0, "text": " a "},
                             {"start": null, "end": 2, "text": "b"}]}"#,
        )
        .unwrap();

        let t = load_transcript(&path).unwrap();
        assert_eq!(t.detected_language, "en");
        assert_eq!(t.segments.len(), 1);
        assert_eq!((t.segments[0].start, t.segments[0].end), (1.5, 2.5));
        assert_eq!(t.segments[0].text, "a");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_transcript_missing() {
        let err = load_transcript(Path::new("/nonexistent/x.transcript.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
