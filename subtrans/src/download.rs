use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{secs, DownloadConfig};
use crate::error::{self, Error, ErrorKind, Result};
use crate::pipeline::{is_url, VideoSource};

/// Longest wait between two download attempts.
const MAX_RETRY_WAIT: Duration = Duration::from_secs(300);

const UNAVAILABLE_SIGNATURES: &[&str] = &[
    "video unavailable",
    "private video",
    "this video is private",
    "has been removed",
    "not available in your country",
    "members-only",
    "account associated with this video has been terminated",
];

const NETWORK_SIGNATURES: &[&str] = &[
    "unable to download webpage",
    "network is unreachable",
    "name or service not known",
    "temporary failure in name resolution",
    "read timed out",
    "incomplete read",
];

/// How a failed yt-dlp run should be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadFailure {
    /// Removed, private, or region-locked. Retrying will not help.
    Unavailable(String),
    /// Rate limiting or network trouble.
    Retryable(String),
    Fatal(String),
}

impl DownloadFailure {
    /// Classify yt-dlp's stderr.
    pub fn from_stderr(stderr: &str) -> Self {
        let message: String = stderr.trim().chars().take(1000).collect();
        let lower = message.to_lowercase();
        if UNAVAILABLE_SIGNATURES.iter().any(|s| lower.contains(s)) {
            DownloadFailure::Unavailable(message)
        } else if error::classify_message(&lower) == ErrorKind::Transient
            || NETWORK_SIGNATURES.iter().any(|s| lower.contains(s))
        {
            DownloadFailure::Retryable(message)
        } else {
            DownloadFailure::Fatal(message)
        }
    }

    fn into_error(self) -> Error {
        match self {
            DownloadFailure::Unavailable(m) => Error::Unavailable(m),
            DownloadFailure::Retryable(m) | DownloadFailure::Fatal(m) => {
                Error::Download(format!("yt-dlp failed: {m}"))
            }
        }
    }
}

/// Wait before retry number `attempt` (0-based): grows by half each time, capped.
pub fn retry_wait(initial: Duration, attempt: u32) -> Duration {
    initial.mul_f64(1.5_f64.powi(attempt as i32)).min(MAX_RETRY_WAIT)
}

#[derive(Deserialize)]
struct VideoInfo {
    title: Option<String>,
    duration: Option<f64>,
}

/// Rejects anything that isn't http:// or https://.
fn validate_url(url: &str) -> Result<()> {
    if is_url(url) {
        Ok(())
    } else {
        Err(Error::Download(format!(
            "invalid URL (must start with http:// or https://): {}",
            url.trim()
        )))
    }
}

/// Video download through `yt-dlp`.
///
/// Arguments are passed without a shell, `--no-exec` disables post-processing
/// commands, and the reported file must lie inside the destination directory.
pub struct YtDlp {
    binary: String,
    format: String,
    proxy: Option<String>,
    retries: u32,
    retry_delay: Duration,
}

impl YtDlp {
    pub fn from_config(config: &DownloadConfig) -> Result<Self> {
        let format = config.format_selector().ok_or_else(|| {
            Error::Config(format!("unknown download quality {:?}", config.quality))
        })?;
        Ok(Self {
            binary: "yt-dlp".into(),
            format: format.to_string(),
            proxy: config.proxy.clone().filter(|p| !p.trim().is_empty()),
            retries: config.retries.max(1),
            retry_delay: secs(config.retry_delay_secs),
        })
    }

    fn command(&self) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.binary);
        cmd.args(["--no-exec", "--no-playlist"]);
        if let Some(proxy) = &self.proxy {
            cmd.args(["--proxy", proxy]);
        }
        cmd
    }

    async fn probe(&self, url: &str) -> Option<VideoInfo> {
        let output = self
            .command()
            .args(["--dump-json", "--no-download"])
            .arg(url)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        serde_json::from_slice(&output.stdout).ok()
    }

    /// One yt-dlp run. The outer error is local (I/O, path checks); the inner
    /// one is yt-dlp's own failure, which may be retried.
    async fn attempt(
        &self,
        url: &str,
        dest_dir: &Path,
        template: &str,
    ) -> Result<std::result::Result<PathBuf, DownloadFailure>> {
        let output = self
            .command()
            .args(["--format", &self.format, "--merge-output-format", "mp4"])
            .args(["--output", template, "--print", "after_move:filepath"])
            .arg(url)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(Err(DownloadFailure::from_stderr(&stderr)));
        }

        let printed = String::from_utf8_lossy(&output.stdout);
        let path = match printed.lines().rev().map(str::trim).find(|l| !l.is_empty()) {
            Some(line) => {
                let candidate = PathBuf::from(line);
                validate_path_in_dir(&candidate, dest_dir)?;
                candidate
            }
            None => find_video_file(dest_dir)?,
        };
        Ok(Ok(path))
    }
}

#[async_trait]
impl VideoSource for YtDlp {
    async fn acquire(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        validate_url(url)?;

        let available = tokio::process::Command::new(&self.binary)
            .arg("--version")
            .output()
            .await;
        if available.is_err() {
            return Err(Error::YtDlpNotFound);
        }

        std::fs::create_dir_all(dest_dir)?;
        let template = dest_dir
            .join("%(title).80s [%(id)s].%(ext)s")
            .to_str()
            .ok_or_else(|| Error::Download("download directory is not valid UTF-8".into()))?
            .to_string();

        if let Some(info) = self.probe(url).await {
            info!(
                title = info.title.as_deref().unwrap_or("?"),
                duration = info.duration.unwrap_or(0.0),
                "video found"
            );
        }

        let mut attempt = 0;
        loop {
            info!(%url, attempt = attempt + 1, of = self.retries, "downloading video");
            let failure = match self.attempt(url, dest_dir, &template).await? {
                Ok(path) if path.exists() => {
                    debug!(path = %path.display(), "video downloaded");
                    return Ok(path);
                }
                Ok(path) => {
                    return Err(Error::Download(format!(
                        "downloaded file not found at {}",
                        path.display()
                    )))
                }
                Err(failure) => failure,
            };

            attempt += 1;
            match failure {
                DownloadFailure::Retryable(message) if attempt < self.retries => {
                    let wait = retry_wait(self.retry_delay, attempt - 1);
                    warn!(attempt, wait_secs = wait.as_secs_f64(), %message, "download failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                other => return Err(other.into_error()),
            }
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    use std::path::Component;
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

fn validate_path_in_dir(path: &Path, expected_dir: &Path) -> Result<()> {
    let dir = expected_dir
        .canonicalize()
        .unwrap_or_else(|_| normalize_path(expected_dir));
    let resolved = path.canonicalize().unwrap_or_else(|_| normalize_path(path));

    if resolved.starts_with(&dir) {
        Ok(())
    } else {
        warn!(
            path = %path.display(),
            dir = %expected_dir.display(),
            "yt-dlp reported a file outside the download directory"
        );
        Err(Error::Download(
            "downloaded file path is outside the download directory".into(),
        ))
    }
}

/// Most recently modified video (or audio-only) file in `dir`.
fn find_video_file(dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_media = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| matches!(ext, "mp4" | "mkv" | "webm" | "mov" | "m4a" | "mp3"));
        if !is_media {
            continue;
        }
        let Ok(modified) = path.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        if newest.as_ref().is_none_or(|(_, t)| modified > *t) {
            newest = Some((path, modified));
        }
    }

    newest
        .map(|(p, _)| p)
        .ok_or_else(|| Error::Download("no video file found after download".into()))
}
