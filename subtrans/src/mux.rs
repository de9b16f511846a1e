use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use crate::config::{Language, SubtitleConfig, SubtitleMethod};
use crate::error::{Error, Result};

/// How subtitles end up in the output video.
#[derive(Debug, Clone, PartialEq)]
pub struct MuxOptions {
    pub method: SubtitleMethod,
    pub font: String,
    pub font_size: u32,
    /// Tagged on soft subtitle tracks.
    pub language: Language,
}

impl MuxOptions {
    pub fn from_config(config: &SubtitleConfig, language: Language) -> Self {
        Self {
            method: config.method,
            font: config.font.clone(),
            font_size: config.font_size,
            language,
        }
    }
}

#[async_trait]
pub trait Muxer: Send + Sync {
    async fn mux(
        &self,
        video: &Path,
        subtitle: &Path,
        output: &Path,
        options: &MuxOptions,
    ) -> Result<PathBuf>;
}

/// Escape a path for use inside an ffmpeg filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("'\\''"),
            ':' => out.push_str("\\:"),
            c => out.push(c),
        }
    }
    out
}

/// ffmpeg arguments (after the binary) for one mux run.
pub fn ffmpeg_args(video: &Path, subtitle: &Path, output: &Path, options: &MuxOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-nostdin".into(),
        "-y".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.to_string_lossy().into_owned(),
    ];
    match options.method {
        SubtitleMethod::Burn => {
            let style = format!("FontName={},FontSize={}", options.font, options.font_size);
            args.push("-vf".into());
            args.push(format!(
                "subtitles='{}':force_style='{style}'",
                escape_filter_path(subtitle)
            ));
            args.extend(["-c:a".into(), "copy".into()]);
        }
        SubtitleMethod::Soft => {
            args.extend(["-i".into(), subtitle.to_string_lossy().into_owned()]);
            args.extend(["-map".into(), "0".into(), "-map".into(), "1".into()]);
            args.extend(["-c".into(), "copy".into(), "-c:s".into(), "mov_text".into()]);
            if let Some(code) = options.language.iso639_2() {
                args.push("-metadata:s:s:0".into());
                args.push(format!("language={code}"));
            }
        }
    }
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Burns or muxes subtitles with the `ffmpeg` binary.
pub struct FfmpegMuxer {
    binary: String,
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".into(),
        }
    }
}

#[async_trait]
impl Muxer for FfmpegMuxer {
    async fn mux(
        &self,
        video: &Path,
        subtitle: &Path,
        output: &Path,
        options: &MuxOptions,
    ) -> Result<PathBuf> {
        for input in [video, subtitle] {
            if !input.exists() {
                return Err(Error::NotFound {
                    path: input.to_path_buf(),
                });
            }
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        info!(method = ?options.method, output = %output.display(), "adding subtitles to video");
        let result = tokio::process::Command::new(&self.binary)
            .args(ffmpeg_args(video, subtitle, output, options))
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FfmpegNotFound
                } else {
                    Error::Mux(format!("failed to run ffmpeg: {e}"))
                }
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr: String = stderr.chars().take(1000).collect();
            return Err(Error::Mux(stderr));
        }
        Ok(output.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(method: SubtitleMethod) -> MuxOptions {
        MuxOptions::from_config(
            &SubtitleConfig {
                method,
                ..Default::default()
            },
            Language::new("ja").unwrap(),
        )
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("out/a.srt")), "out/a.srt");
        assert_eq!(
            escape_filter_path(Path::new("C:\\subs\\it's.srt")),
            "C\\:\\\\subs\\\\it'\\''s.srt"
        );
    }

    #[test]
    fn test_burn_args() {
        let args = ffmpeg_args(
            Path::new("v.mp4"),
            Path::new("s.srt"),
            Path::new("o.mp4"),
            &options(SubtitleMethod::Burn),
        );
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(
            args[vf + 1],
            "subtitles='s.srt':force_style='FontName=Arial,FontSize=20'"
        );
        assert_eq!(args.last().unwrap(), "o.mp4");
    }

    #[test]
    fn test_soft_args_tag_language() {
        let args = ffmpeg_args(
            Path::new("v.mp4"),
            Path::new("s.srt"),
            Path::new("o.mp4"),
            &options(SubtitleMethod::Soft),
        );
        assert!(args.windows(2).any(|w| w == ["-c:s", "mov_text"]));
        assert!(args.windows(2).any(|w| w == ["-metadata:s:s:0", "language=jpn"]));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[tokio::test]
    async fn test_mux_missing_input() {
        let err = FfmpegMuxer::default()
            .mux(
                Path::new("/nonexistent/v.mp4"),
                Path::new("/nonexistent/s.srt"),
                Path::new("/nonexistent/o.mp4"),
                &options(SubtitleMethod::Burn),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
