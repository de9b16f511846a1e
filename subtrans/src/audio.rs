use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::TranscriptionConfig;
use crate::error::{Error, Result};

/// Sample rate whisper expects.
pub const SAMPLE_RATE: u32 = 16_000;

/// Bytes per second of 16 kHz mono s16le audio.
const BYTES_PER_SEC: f64 = SAMPLE_RATE as f64 * 2.0;

/// Extracted audio, possibly split into fixed-length chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub duration_secs: f64,
    /// Chunks in playback order. A single chunk covers the whole file.
    pub chunks: Vec<AudioChunk>,
    /// Length of every chunk but the last; offsets are `index * chunk_length_secs`.
    pub chunk_length_secs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    pub index: usize,
    pub path: PathBuf,
}

/// Pulls a recognizer-ready audio track out of a video.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn extract(&self, video: &Path, work_dir: &Path) -> Result<ExtractedAudio>;
}

/// Audio extraction through the `ffmpeg` binary.
pub struct Ffmpeg {
    binary: String,
    chunk_length_secs: f64,
    chunk_threshold_secs: f64,
}

impl Ffmpeg {
    pub fn new(chunk_length_secs: f64, chunk_threshold_secs: f64) -> Self {
        Self {
            binary: "ffmpeg".into(),
            chunk_length_secs,
            chunk_threshold_secs,
        }
    }

    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self::new(config.chunk_length_secs, config.chunk_threshold_secs)
    }

    async fn run(&self, args: &[&str], input: &Path, output: &Path) -> Result<()> {
        let result = tokio::process::Command::new(&self.binary)
            .args(["-nostdin", "-y", "-loglevel", "error"])
            .args(args)
            .arg("-i")
            .arg(input)
            .args(["-vn", "-ac", "1", "-ar", &SAMPLE_RATE.to_string(), "-acodec", "pcm_s16le"])
            .arg(output)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::FfmpegNotFound
                } else {
                    Error::AudioDecode(format!("failed to run ffmpeg: {e}"))
                }
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr: String = stderr.chars().take(1000).collect();
            return Err(Error::AudioDecode(format!("ffmpeg failed: {stderr}")));
        }
        Ok(())
    }
}

#[async_trait]
impl AudioSource for Ffmpeg {
    async fn extract(&self, video: &Path, work_dir: &Path) -> Result<ExtractedAudio> {
        if !video.exists() {
            return Err(Error::NotFound {
                path: video.to_path_buf(),
            });
        }
        std::fs::create_dir_all(work_dir)?;

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".into());
        let wav = work_dir.join(format!("{stem}.wav"));

        info!(video = %video.display(), "extracting audio");
        self.run(&[], video, &wav).await?;

        let duration_secs = wav_duration(&wav)?;
        if duration_secs <= 0.0 {
            return Err(Error::AudioDecode("extracted audio is empty".into()));
        }

        let plan = plan_chunks(duration_secs, self.chunk_length_secs, self.chunk_threshold_secs);
        let chunks = if plan.len() <= 1 {
            vec![AudioChunk {
                index: 0,
                path: wav.clone(),
            }]
        } else {
            info!(duration_secs, chunks = plan.len(), "splitting audio into chunks");
            let mut chunks = Vec::with_capacity(plan.len());
            for (index, offset, length) in plan {
                let path = work_dir.join(format!("{stem}_chunk_{index:03}.wav"));
                let (ss, t) = (format!("{offset:.3}"), format!("{length:.3}"));
                self.run(&["-ss", &ss, "-t", &t], &wav, &path).await?;
                debug!(index, offset, path = %path.display(), "chunk written");
                chunks.push(AudioChunk { index, path });
            }
            chunks
        };

        info!(path = %wav.display(), duration_secs, "audio ready");
        Ok(ExtractedAudio {
            path: wav,
            duration_secs,
            chunks,
            chunk_length_secs: self.chunk_length_secs,
        })
    }
}

/// Split `duration` into `(index, offset, length)` chunks of `chunk_length`.
///
/// Audio no longer than `threshold` is kept whole (one chunk).
pub fn plan_chunks(duration: f64, chunk_length: f64, threshold: f64) -> Vec<(usize, f64, f64)> {
    if duration <= threshold || chunk_length <= 0.0 {
        return vec![(0, 0.0, duration)];
    }
    let count = (duration / chunk_length).ceil() as usize;
    (0..count)
        .map(|i| {
            let offset = i as f64 * chunk_length;
            (i, offset, chunk_length.min(duration - offset))
        })
        .collect()
}

/// Location of the PCM payload inside a RIFF/WAVE file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavData {
    pub offset: usize,
    pub len: usize,
}

/// Find the `data` chunk in a WAV header. `file_len` bounds a chunk whose
/// declared size is missing or larger than the file (streamed output).
pub fn find_wav_data(header: &[u8], file_len: usize) -> Result<WavData> {
    if header.len() < 12 || &header[0..4] != b"RIFF" || &header[8..12] != b"WAVE" {
        return Err(Error::AudioDecode("not a RIFF/WAVE file".into()));
    }
    let mut pos = 12;
    while pos + 8 <= header.len() {
        let id = &header[pos..pos + 4];
        let size = u32::from_le_bytes([header[pos + 4], header[pos + 5], header[pos + 6], header[pos + 7]]) as usize;
        let body = pos + 8;
        if id == b"data" {
            let available = file_len.saturating_sub(body);
            let len = if size == 0 || size == u32::MAX as usize { available } else { size.min(available) };
            return Ok(WavData { offset: body, len });
        }
        pos = body + size + (size & 1);
    }
    Err(Error::AudioDecode("WAV file has no data chunk".into()))
}

fn read_wav_data(path: &Path) -> Result<WavData> {
    use std::io::Read;

    let file_len = std::fs::metadata(path)?.len() as usize;
    let mut header = Vec::with_capacity(4096);
    std::fs::File::open(path)?.take(64 * 1024).read_to_end(&mut header)?;
    find_wav_data(&header, file_len)
}

/// Duration of a 16 kHz mono s16le WAV file in seconds.
pub fn wav_duration(path: &Path) -> Result<f64> {
    Ok(read_wav_data(path)?.len as f64 / BYTES_PER_SEC)
}

/// Load a 16 kHz mono s16le WAV file as f32 samples in [-1.0, 1.0).
#[cfg(feature = "whisper")]
pub fn load_samples(path: &Path) -> Result<Vec<f32>> {
    let bytes = std::fs::read(path)?;
    let data = find_wav_data(&bytes, bytes.len())?;
    let pcm = &bytes[data.offset..data.offset + data.len];
    Ok(pcm
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A minimal 16 kHz mono s16le WAV with `samples` zero samples.
    pub(crate) fn wav_bytes(samples: usize, extra_chunk: bool) -> Vec<u8> {
        let data_len = samples * 2;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        out.extend_from_slice(&(SAMPLE_RATE * 2).to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        if extra_chunk {
            out.extend_from_slice(b"LIST");
            out.extend_from_slice(&5u32.to_le_bytes());
            out.extend_from_slice(b"INFO\0\0");
        }
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data_len as u32).to_le_bytes());
        out.resize(out.len() + data_len, 0);
        out
    }

    #[test]
    fn test_plan_chunks_short_audio_is_whole() {
        assert_eq!(plan_chunks(120.0, 30.0, 600.0), vec![(0, 0.0, 120.0)]);
        assert_eq!(plan_chunks(600.0, 30.0, 600.0).len(), 1);
    }

    #[test]
    fn test_plan_chunks_long_audio() {
        let plan = plan_chunks(95.0, 30.0, 60.0);
        assert_eq!(
            plan,
            vec![(0, 0.0, 30.0), (1, 30.0, 30.0), (2, 60.0, 30.0), (3, 90.0, 5.0)]
        );
    }

    #[test]
    fn test_find_wav_data_plain_header() {
        let bytes = wav_bytes(16_000, false);
        let data = find_wav_data(&bytes, bytes.len()).unwrap();
        assert_eq!(data, WavData { offset: 44, len: 32_000 });
    }

    #[test]
    fn test_find_wav_data_skips_padded_chunks() {
        let bytes = wav_bytes(8, true);
        let data = find_wav_data(&bytes, bytes.len()).unwrap();
        assert_eq!(data.offset, 44 + 14);
        assert_eq!(data.len, 16);
    }

    #[test]
    fn test_find_wav_data_rejects_garbage() {
        assert!(find_wav_data(b"not a wav file at all", 21).is_err());
        assert!(find_wav_data(b"RIFF\0\0\0\0WAVE", 12).is_err());
    }

    #[test]
    fn test_wav_duration() {
        let path = std::env::temp_dir().join(format!("subtrans_audio_{}.wav", std::process::id()));
        std::fs::write(&path, wav_bytes(40_000, true)).unwrap();
        assert_eq!(wav_duration(&path).unwrap(), 2.5);
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_extract_missing_video() {
        let ffmpeg = Ffmpeg::new(30.0, 600.0);
        let err = ffmpeg
            .extract(Path::new("/nonexistent/video.mp4"), &std::env::temp_dir())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
