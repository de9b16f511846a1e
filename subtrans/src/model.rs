use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::config::Model;
use crate::error::{Error, Result};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Smallest plausible ggml file. Anything below is an error page.
const MIN_MODEL_BYTES: u64 = 1_000_000;

/// A ggml model found in the cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedModel {
    pub path: PathBuf,
    pub size: u64,
}

impl CachedModel {
    /// Model name derived from the file name (`ggml-base.en.bin` → `base.en`).
    pub fn name(&self) -> String {
        let file = self
            .path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = file.strip_suffix(".bin").unwrap_or(&file);
        stem.strip_prefix("ggml-").unwrap_or(stem).to_string()
    }
}

/// Download URL of a named model. Custom paths have none.
pub fn model_url(model: &Model) -> Option<String> {
    match model {
        Model::Custom(_) => None,
        named => Some(format!("{MODEL_BASE_URL}/{}", named.filename())),
    }
}

/// Return the local path of `model`, downloading it into `cache_dir` first
/// when it is a named model that is not cached yet.
pub async fn ensure_model(model: &Model, cache_dir: &Path) -> Result<PathBuf> {
    if let Model::Custom(path) = model {
        return if path.is_file() {
            Ok(path.clone())
        } else {
            Err(Error::ModelNotFound { path: path.clone() })
        };
    }

    let url = format!("{MODEL_BASE_URL}/{}", model.filename());
    let model_path = cache_dir.join(model.filename());
    if model_path.is_file() {
        debug!(path = %model_path.display(), "using cached model");
        return Ok(model_path);
    }

    std::fs::create_dir_all(cache_dir).map_err(|e| {
        Error::Model(format!("cannot create model cache {}: {e}", cache_dir.display()))
    })?;

    info!(model = model.name(), %url, "model not cached, downloading");
    download_model(&url, &model_path).await?;
    Ok(model_path)
}

fn progress_bar(total: u64, dest: &Path) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    let name = dest
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    pb.set_message(format!("Fetching whisper model {name}"));
    pb
}

async fn download_model(url: &str, dest: &Path) -> Result<()> {
    let response = reqwest::Client::new()
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| Error::ModelDownload(format!("server refused model download: {e}")))?;

    let expected = response.content_length().unwrap_or(0);
    let pb = progress_bar(expected, dest);

    let mut part_name = dest.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part = dest.with_file_name(part_name);

    let written = {
        use std::io::Write;

        let mut file = std::io::BufWriter::new(std::fs::File::create(&part)?);
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    drop(file);
                    std::fs::remove_file(&part).ok();
                    return Err(Error::ModelDownload(format!("connection dropped: {e}")));
                }
            };
            file.write_all(&chunk)?;
            written += chunk.len() as u64;
            pb.set_position(written);
        }
        file.flush()?;
        written
    };

    if written < MIN_MODEL_BYTES {
        std::fs::remove_file(&part).ok();
        pb.abandon_with_message("Model download failed");
        return Err(Error::ModelDownload(format!(
            "got only {written} bytes from {url}"
        )));
    }
    if expected > 0 && written != expected {
        warn!(expected, written, "model size differs from Content-Length");
    }

    std::fs::rename(&part, dest)?;
    pb.finish_with_message("Model ready");
    info!(path = %dest.display(), bytes = written, "model cached");
    Ok(())
}

/// Models present in `cache_dir`, sorted by file name. Partial downloads are ignored.
pub fn list_cached_models(cache_dir: &Path) -> Vec<CachedModel> {
    let Ok(entries) = std::fs::read_dir(cache_dir) else {
        return Vec::new();
    };

    let mut models: Vec<CachedModel> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "bin"))
        .filter_map(|e| {
            let size = e.metadata().ok()?.len();
            Some(CachedModel { path: e.path(), size })
        })
        .collect();
    models.sort_by(|a, b| a.path.cmp(&b.path));
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn cache(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("subtrans_models_{}_{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_model_url() {
        assert_eq!(
            model_url(&Model::LargeV3Turbo).unwrap(),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-large-v3-turbo.bin"
        );
        assert!(model_url(&Model::Custom("/m/x.bin".into())).is_none());
    }

    #[test]
    fn test_list_cached_models_missing_dir() {
        assert!(list_cached_models(Path::new("/nonexistent/subtrans/models")).is_empty());
    }

    #[test]
    fn test_list_cached_models_skips_partial_files() {
        // "ggml-medium.bin.part" has extension "part"
        let dir = cache("list");
        fs::write(dir.join("ggml-small.bin"), b"small").unwrap();
        fs::write(dir.join("ggml-base.en.bin"), b"base").unwrap();
        fs::write(dir.join("ggml-medium.bin.part"), b"partial").unwrap();
        fs::write(dir.join("notes.txt"), b"text").unwrap();

        let models = list_cached_models(&dir);
        let names: Vec<_> = models.iter().map(CachedModel::name).collect();
        assert_eq!(names, vec!["base.en", "small"]);
        assert_eq!(models[1].size, 5);

        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ensure_model_returns_cached_file() {
        let dir = cache("hit");
        let path = dir.join("ggml-tiny.bin");
        fs::write(&path, b"cached").unwrap();

        assert_eq!(ensure_model(&Model::Tiny, &dir).await.unwrap(), path);
        fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_ensure_model_custom_path() {
        let dir = cache("custom");
        let path = dir.join("my-model.bin");
        fs::write(&path, b"weights").unwrap();

        let found = ensure_model(&Model::Custom(path.clone()), Path::new("/unused")).await;
        assert_eq!(found.unwrap(), path);

        let missing = ensure_model(&Model::Custom(dir.join("gone.bin")), Path::new("/unused")).await;
        assert!(matches!(missing.unwrap_err(), Error::ModelNotFound { .. }));
        fs::remove_dir_all(&dir).ok();
    }
}
