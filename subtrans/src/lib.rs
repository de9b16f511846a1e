//! Video subtitle translation: URL or file in, translated subtitles out.
//!
//! **subtrans** runs the whole pipeline: downloading (via yt-dlp), audio
//! extraction (via ffmpeg), speech recognition (via whisper.cpp), segment by
//! segment machine translation, a self-checked SRT file, and burning or muxing
//! the subtitles back into the video. [`repair`] recovers subtitle files that
//! were written with leaked unresolved-call text.
//!
//! # Quick start
//!
//! ```rust,no_run
//! # #[tokio::main]
//! # async fn main() -> subtrans::Result<()> {
//! // Japanese subtitles for a local video, default config
//! let out = subtrans::translate_video("talk.mp4", "ja").await?;
//! println!("{}", out.subtitle.display());
//!
//! // Fix a subtitle file from an earlier run
//! subtrans::repair("output/talk_translated.srt")?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
#[cfg(feature = "download")]
pub mod download;
pub mod error;
pub mod model;
pub mod mux;
pub mod normalize;
pub mod pipeline;
pub mod recognize;
pub mod render;
pub mod repair;
pub mod subtitle;
pub mod timecode;
pub mod translate;
pub mod types;
pub mod validate;

pub use config::{Config, FallbackPolicy, Language, Model, SubtitleMethod};
pub use error::{Error, ErrorKind, Result, Stage, TranslateError};
pub use pipeline::{Pipeline, PipelineOutput};
pub use subtitle::{SubtitleDocument, SubtitleEntry};
pub use translate::Translator;
pub use types::{Segment, Transcript, TranslatedTranscript};

use std::path::Path;

/// Run the full pipeline on a URL or local video with the default config.
pub async fn translate_video(input: &str, target: &str) -> Result<PipelineOutput> {
    translate_video_with_config(input, target, Config::default()).await
}

/// Run the full pipeline on a URL or local video with a custom config.
pub async fn translate_video_with_config(
    input: &str,
    target: &str,
    config: Config,
) -> Result<PipelineOutput> {
    let target = Language::new(target)?;
    Pipeline::from_config(config)?.run(input, target).await
}

/// Check a subtitle file and repair it in place if needed.
///
/// Returns `false` if the repair failed and the original content was restored.
pub fn repair(path: impl AsRef<Path>) -> Result<bool> {
    repair::repair(path.as_ref())
}
