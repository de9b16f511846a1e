use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default location of the configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Languages known to the translation layer: `(code, english name, aliases)`.
/// Code, English name, aliases. The first three-letter alias is the ISO 639-2/T code.
const LANGUAGES: &[(&str, &str, &[&str])] = &[
    ("ja", "Japanese", &["jp", "jpn"]),
    ("en", "English", &["eng"]),
    ("ko", "Korean", &["kr", "kor"]),
    ("zh", "Chinese", &["cn", "zho", "chi"]),
    ("es", "Spanish", &["spa"]),
    ("fr", "French", &["fra", "fre"]),
    ("de", "German", &["deu", "ger"]),
    ("it", "Italian", &["ita"]),
    ("pt", "Portuguese", &["por"]),
    ("ru", "Russian", &["rus"]),
    ("ar", "Arabic", &["ara"]),
    ("hi", "Hindi", &["hin"]),
    ("th", "Thai", &["tha"]),
    ("vi", "Vietnamese", &["vie"]),
    ("id", "Indonesian", &["ind"]),
    ("nl", "Dutch", &["nld", "dut"]),
    ("pl", "Polish", &["pol"]),
    ("tr", "Turkish", &["tur"]),
    ("uk", "Ukrainian", &["ukr"]),
    ("sv", "Swedish", &["swe"]),
];

/// A validated language, or automatic detection.
///
/// Accepts short codes ("ja"), common aliases ("jp", "kr"), English names
/// ("japanese") and region-tagged codes ("en-US", "zh_TW").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Auto,
    Code {
        code: &'static str,
        name: &'static str,
    },
}

impl Language {
    pub fn new(lang: &str) -> Result<Self> {
        let lower = lang.trim().to_lowercase();
        if lower == "auto" {
            return Ok(Language::Auto);
        }
        let primary = lower.split(['-', '_']).next().unwrap_or_default();

        [lower.as_str(), primary]
            .iter()
            .find_map(|candidate| lookup(candidate))
            .ok_or_else(|| Error::UnsupportedLanguage(lang.to_string()))
    }

    /// Short language code (e.g. "ja"), or None for Auto.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Language::Auto => None,
            Language::Code { code, .. } => Some(*code),
        }
    }

    /// English language name (e.g. "Japanese"), or None for Auto.
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Language::Auto => None,
            Language::Code { name, .. } => Some(*name),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, Language::Auto)
    }

    /// Target-language code as DeepL expects it.
    pub fn deepl_target(&self) -> Option<String> {
        self.code().map(|code| match code {
            "en" => "EN-US".to_string(),
            "pt" => "PT-BR".to_string(),
            other => other.to_uppercase(),
        })
    }

    /// Three-letter ISO 639-2 code (e.g. "jpn"), as MP4 track metadata expects.
    pub fn iso639_2(&self) -> Option<&'static str> {
        let code = self.code()?;
        LANGUAGES
            .iter()
            .find(|(c, _, _)| *c == code)
            .and_then(|(_, _, aliases)| aliases.iter().copied().find(|a| a.len() == 3))
    }

    /// Source-language code as DeepL expects it (no regional variants).
    pub fn deepl_source(&self) -> Option<String> {
        self.code().map(str::to_uppercase)
    }

    /// List all supported languages as (code, name) pairs.
    pub fn supported() -> Vec<(&'static str, &'static str)> {
        LANGUAGES.iter().map(|(code, name, _)| (*code, *name)).collect()
    }
}

fn lookup(candidate: &str) -> Option<Language> {
    LANGUAGES
        .iter()
        .find(|(code, name, aliases)| {
            *code == candidate || name.eq_ignore_ascii_case(candidate) || aliases.contains(&candidate)
        })
        .map(|(code, name, _)| Language::Code {
            code: *code,
            name: *name,
        })
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Auto => write!(f, "auto"),
            Language::Code { code, .. } => write!(f, "{code}"),
        }
    }
}

/// Whisper model sizes.
#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Tiny,
    TinyEn,
    Base,
    BaseEn,
    Small,
    SmallEn,
    Medium,
    MediumEn,
    LargeV2,
    LargeV3,
    LargeV3Turbo,
    /// User-provided ggml file path.
    Custom(PathBuf),
}

impl Model {
    const NAMED: &'static [(&'static str, Model)] = &[
        ("tiny", Model::Tiny),
        ("tiny.en", Model::TinyEn),
        ("base", Model::Base),
        ("base.en", Model::BaseEn),
        ("small", Model::Small),
        ("small.en", Model::SmallEn),
        ("medium", Model::Medium),
        ("medium.en", Model::MediumEn),
        ("large-v2", Model::LargeV2),
        ("large-v3", Model::LargeV3),
        ("large-v3-turbo", Model::LargeV3Turbo),
    ];

    /// Model filename as used by HuggingFace / whisper.cpp.
    pub fn filename(&self) -> String {
        match self {
            Model::Custom(path) => path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "custom-model".into()),
            named => format!("ggml-{}.bin", named.name()),
        }
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        match self {
            Model::Custom(_) => "custom",
            named => Self::NAMED
                .iter()
                .find(|(_, m)| m == named)
                .map(|(name, _)| *name)
                .unwrap_or("custom"),
        }
    }

    /// Parse a model name (e.g. "base") or, failing that, a path to a `.bin` file.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some((_, model)) = Self::NAMED.iter().find(|(name, _)| *name == s) {
            return Some(model.clone());
        }
        let path = Path::new(s);
        if path.extension().is_some_and(|ext| ext == "bin") || path.components().count() > 1 {
            return Some(Model::Custom(path.to_path_buf()));
        }
        None
    }

    pub fn names() -> impl Iterator<Item = &'static str> {
        Self::NAMED.iter().map(|(name, _)| *name)
    }
}

/// How speech recognition is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognizerBackend {
    /// The `whisper-cli` binary from whisper.cpp, as a subprocess.
    #[default]
    WhisperCli,
    /// whisper.cpp linked in-process (requires the `whisper` feature).
    WhisperRs,
}

/// Which translation service to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMethod {
    #[default]
    Google,
    Deepl,
    Openai,
}

/// What a segment shows when its translation could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// The untranslated source text.
    #[default]
    Original,
    /// A visible `[translation error]` marker.
    Placeholder,
}

/// Burn subtitles into the picture or attach them as a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMethod {
    #[default]
    Burn,
    Soft,
}

impl SubtitleMethod {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "burn" => Some(SubtitleMethod::Burn),
            "soft" => Some(SubtitleMethod::Soft),
            _ => None,
        }
    }
}

/// Extra subtitle format written next to the SRT file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleFormat {
    #[default]
    Srt,
    Vtt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscriptionConfig {
    /// Model name (tiny … large-v3-turbo) or path to a ggml file.
    pub model: String,
    /// Spoken language hint, or "auto".
    pub language: String,
    pub backend: RecognizerBackend,
    /// Binary used by the `whisper-cli` backend.
    pub whisper_cli: String,
    pub threads: Option<u32>,
    pub gpu: bool,
    pub chunk_length_secs: f64,
    /// Audio longer than this is recognized in chunks.
    pub chunk_threshold_secs: f64,
    pub cache_dir: Option<PathBuf>,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "base".into(),
            language: "auto".into(),
            backend: RecognizerBackend::default(),
            whisper_cli: "whisper-cli".into(),
            threads: None,
            gpu: true,
            chunk_length_secs: 30.0,
            chunk_threshold_secs: 600.0,
            cache_dir: None,
        }
    }
}

impl TranscriptionConfig {
    pub fn model(&self) -> Result<Model> {
        Model::parse(&self.model)
            .ok_or_else(|| Error::Config(format!("unknown model {:?}", self.model)))
    }

    pub fn language(&self) -> Result<Language> {
        Language::new(&self.language)
    }

    /// Resolve the model cache directory, defaulting to ~/.cache/subtrans/models.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("subtrans")
                .join("models")
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranslationConfig {
    pub method: TranslationMethod,
    pub source_language: String,
    /// Attempts per segment, including the first.
    pub retries: u32,
    pub retry_delay_secs: f64,
    /// Per-attempt timeout.
    pub timeout_secs: f64,
    /// Pause after every `batch_size` segments.
    pub batch_size: usize,
    pub batch_pause_secs: f64,
    /// Longer texts are split on sentence boundaries.
    pub max_text_length: usize,
    pub fallback: FallbackPolicy,
    pub deepl_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            method: TranslationMethod::default(),
            source_language: "auto".into(),
            retries: 3,
            retry_delay_secs: 2.0,
            timeout_secs: 30.0,
            batch_size: 3,
            batch_pause_secs: 1.0,
            max_text_length: 4000,
            fallback: FallbackPolicy::default(),
            deepl_api_key: None,
            openai_api_key: None,
            openai_model: "gpt-3.5-turbo".into(),
        }
    }
}

impl TranslationConfig {
    pub fn source_language(&self) -> Result<Language> {
        Language::new(&self.source_language)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }

    pub fn batch_pause(&self) -> Duration {
        secs(self.batch_pause_secs)
    }

    /// DeepL key from the config file, else `DEEPL_API_KEY`.
    pub fn deepl_api_key(&self) -> Option<String> {
        key_or_env(&self.deepl_api_key, "DEEPL_API_KEY")
    }

    /// OpenAI key from the config file, else `OPENAI_API_KEY`.
    pub fn openai_api_key(&self) -> Option<String> {
        key_or_env(&self.openai_api_key, "OPENAI_API_KEY")
    }
}

fn key_or_env(configured: &Option<String>, var: &str) -> Option<String> {
    configured
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var(var).ok().filter(|k| !k.trim().is_empty()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubtitleConfig {
    pub method: SubtitleMethod,
    pub font: String,
    pub font_size: u32,
    pub format: SubtitleFormat,
}

impl Default for SubtitleConfig {
    fn default() -> Self {
        Self {
            method: SubtitleMethod::default(),
            font: "Arial".into(),
            font_size: 20,
            format: SubtitleFormat::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloadConfig {
    /// One of `best`, `worst`, `480p`, `720p`, `1080p`, `audio`.
    pub quality: String,
    pub retries: u32,
    /// Initial wait before retrying a rate-limited download.
    pub retry_delay_secs: f64,
    pub proxy: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            quality: "best".into(),
            retries: 5,
            retry_delay_secs: 20.0,
            proxy: None,
        }
    }
}

/// yt-dlp format selectors for each quality preset.
pub const QUALITY_PRESETS: &[(&str, &str)] = &[
    ("best", "best[ext=mp4]/best"),
    ("worst", "worst[ext=mp4]/worst"),
    ("480p", "best[height<=480][ext=mp4]/best[height<=480]"),
    ("720p", "best[height<=720][ext=mp4]/best[height<=720]"),
    ("1080p", "best[height<=1080][ext=mp4]/best[height<=1080]"),
    ("audio", "bestaudio[ext=m4a]/bestaudio[ext=mp3]/bestaudio"),
];

impl DownloadConfig {
    /// yt-dlp `--format` selector for the configured quality.
    pub fn format_selector(&self) -> Option<&'static str> {
        QUALITY_PRESETS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(self.quality.trim()))
            .map(|(_, selector)| *selector)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub download_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Scratch space for extracted audio.
    pub work_dir: PathBuf,
    pub cleanup_temp_files: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
            output_dir: PathBuf::from("output"),
            work_dir: PathBuf::from("temp"),
            cleanup_temp_files: true,
        }
    }
}

/// Complete configuration, one section per concern.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub transcription: TranscriptionConfig,
    pub translation: TranslationConfig,
    pub subtitle: SubtitleConfig,
    pub download: DownloadConfig,
    pub paths: PathsConfig,
}

impl Config {
    /// Parse and validate TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Load a config file, falling back to defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Write this config to `path`, creating parent directories.
    /// An existing file is never overwritten.
    pub fn write(&self, path: &Path) -> Result<()> {
        if path.exists() {
            return Err(Error::Config(format!(
                "{} already exists, not overwriting",
                path.display()
            )));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// Check every option once. Called by [`Config::load`].
    pub fn validate(&self) -> Result<()> {
        let t = &self.transcription;
        t.model()?;
        t.language()?;
        positive("transcription.chunk_length_secs", t.chunk_length_secs)?;
        non_negative("transcription.chunk_threshold_secs", t.chunk_threshold_secs)?;
        if t.threads == Some(0) {
            return Err(Error::Config("transcription.threads must be at least 1".into()));
        }
        if t.backend == RecognizerBackend::WhisperRs && !cfg!(feature = "whisper") {
            return Err(Error::Config(
                "transcription.backend = \"whisper-rs\" requires the `whisper` feature".into(),
            ));
        }

        let tr = &self.translation;
        tr.source_language()?;
        if tr.retries == 0 {
            return Err(Error::Config("translation.retries must be at least 1".into()));
        }
        if tr.batch_size == 0 {
            return Err(Error::Config("translation.batch_size must be at least 1".into()));
        }
        if tr.max_text_length == 0 {
            return Err(Error::Config("translation.max_text_length must be at least 1".into()));
        }
        positive("translation.timeout_secs", tr.timeout_secs)?;
        non_negative("translation.retry_delay_secs", tr.retry_delay_secs)?;
        non_negative("translation.batch_pause_secs", tr.batch_pause_secs)?;

        if self.subtitle.font_size == 0 {
            return Err(Error::Config("subtitle.font_size must be at least 1".into()));
        }
        if self.subtitle.font.trim().is_empty() {
            return Err(Error::Config("subtitle.font must not be empty".into()));
        }

        let d = &self.download;
        if d.format_selector().is_none() {
            let known: Vec<_> = QUALITY_PRESETS.iter().map(|(name, _)| *name).collect();
            return Err(Error::Config(format!(
                "download.quality {:?} is not one of {}",
                d.quality,
                known.join(", ")
            )));
        }
        if d.retries == 0 {
            return Err(Error::Config("download.retries must be at least 1".into()));
        }
        non_negative("download.retry_delay_secs", d.retry_delay_secs)?;
        Ok(())
    }
}

/// Upper bound for every duration setting: one week.
pub const MAX_DURATION_SECS: f64 = 604_800.0;

/// Seconds as a `Duration`; negative or NaN gives zero, anything too large
/// saturates at [`MAX_DURATION_SECS`].
pub fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value.min(MAX_DURATION_SECS)).unwrap_or(Duration::ZERO)
}

fn bounded(field: &str, value: f64) -> Result<()> {
    if value <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{field} must be at most {MAX_DURATION_SECS} seconds, got {value}"
        )))
    }
}

fn positive(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        bounded(field, value)
    } else {
        Err(Error::Config(format!("{field} must be positive, got {value}")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        bounded(field, value)
    } else {
        Err(Error::Config(format!("{field} must not be negative, got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_codes_and_aliases() {
        assert_eq!(Language::new("ja").unwrap().code(), Some("ja"));
        assert_eq!(Language::new("jp").unwrap().code(), Some("ja"));
        assert_eq!(Language::new("KR").unwrap().code(), Some("ko"));
        assert_eq!(Language::new("Japanese").unwrap().code(), Some("ja"));
        assert_eq!(Language::new("en-US").unwrap().code(), Some("en"));
        assert_eq!(Language::new("zh_TW").unwrap().code(), Some("zh"));
        assert!(Language::new("auto").unwrap().is_auto());
    }

    #[test]
    fn test_language_rejects_unknown() {
        assert!(matches!(
            Language::new("klingon"),
            Err(Error::UnsupportedLanguage(_))
        ));
        assert!(Language::new("").is_err());
    }

    #[test]
    fn test_language_deepl_codes() {
        let en = Language::new("en").unwrap();
        assert_eq!(en.deepl_target().as_deref(), Some("EN-US"));
        assert_eq!(en.deepl_source().as_deref(), Some("EN"));
        assert_eq!(Language::new("ja").unwrap().deepl_target().as_deref(), Some("JA"));
        assert_eq!(Language::new("pt").unwrap().deepl_target().as_deref(), Some("PT-BR"));
        assert_eq!(Language::Auto.deepl_target(), None);
    }

    #[test]
    fn test_language_iso639_2() {
        assert_eq!(Language::new("ja").unwrap().iso639_2(), Some("jpn"));
        assert_eq!(Language::new("de").unwrap().iso639_2(), Some("deu"));
        assert_eq!(Language::new("zh").unwrap().iso639_2(), Some("zho"));
        assert_eq!(Language::Auto.iso639_2(), None);
        for (code, _) in Language::supported() {
            assert!(Language::new(code).unwrap().iso639_2().is_some(), "{code}");
        }
    }

    #[test]
    fn test_language_name() {
        assert_eq!(Language::new("de").unwrap().name(), Some("German"));
        assert_eq!(Language::Auto.to_string(), "auto");
        assert!(Language::supported().contains(&("ja", "Japanese")));
    }

    #[test]
    fn test_model_parse_and_filename() {
        assert_eq!(Model::parse("base"), Some(Model::Base));
        assert_eq!(Model::parse("large-v3-turbo").unwrap().filename(), "ggml-large-v3-turbo.bin");
        assert_eq!(Model::TinyEn.filename(), "ggml-tiny.en.bin");
        assert_eq!(Model::Medium.name(), "medium");
        assert_eq!(
            Model::parse("/models/ggml-custom.bin"),
            Some(Model::Custom(PathBuf::from("/models/ggml-custom.bin")))
        );
        assert_eq!(Model::parse("enormous"), None);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.translation.retries, 3);
        assert_eq!(config.translation.batch_size, 3);
        assert_eq!(config.translation.max_text_length, 4000);
        assert_eq!(config.subtitle.font, "Arial");
        assert_eq!(config.subtitle.font_size, 20);
        assert_eq!(config.download.format_selector(), Some("best[ext=mp4]/best"));
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = Config::from_toml(
            r#"
            [translation]
            method = "deepl"
            fallback = "placeholder"
            retries = 5

            [subtitle]
            method = "soft"
            "#,
        )
        .unwrap();
        assert_eq!(config.translation.method, TranslationMethod::Deepl);
        assert_eq!(config.translation.fallback, FallbackPolicy::Placeholder);
        assert_eq!(config.translation.retries, 5);
        assert_eq!(config.translation.batch_size, 3);
        assert_eq!(config.subtitle.method, SubtitleMethod::Soft);
        assert_eq!(config.transcription.model, "base");
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = Config::from_toml("[translation]\nretires = 3\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        for toml in [
            "[translation]\nretries = 0",
            "[translation]\nbatch_size = 0",
            "[translation]\ntimeout_secs = 0.0",
            "[translation]\nsource_language = \"xx\"",
            "[subtitle]\nfont_size = 0",
            "[transcription]\nchunk_length_secs = 0.0",
            "[transcription]\nmodel = \"huge\"",
            "[download]\nquality = \"4k\"",
            "[translation]\ntimeout_secs = 1e300",
            "[translation]\nretry_delay_secs = 1e300",
            "[download]\nretry_delay_secs = 1e300",
        ] {
            assert!(Config::from_toml(toml).is_err(), "accepted {toml:?}");
        }
    }

    #[test]
    fn test_duration_accessors_never_panic() {
        let mut tr = TranslationConfig::default();
        tr.timeout_secs = 1e300;
        tr.retry_delay_secs = -1.0;
        tr.batch_pause_secs = f64::NAN;
        assert_eq!(tr.timeout(), Duration::from_secs(604_800));
        assert_eq!(tr.retry_delay(), Duration::ZERO);
        assert_eq!(tr.batch_pause(), Duration::ZERO);
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(f64::INFINITY), Duration::from_secs(604_800));
    }

    #[test]
    fn test_toml_round_trip_and_write() {
        let dir = std::env::temp_dir().join(format!("subtrans_config_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("config").join("config.toml");

        let config = Config::default();
        config.write(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
        assert!(config.write(&path).is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let path = std::env::temp_dir().join("subtrans_no_such_config.toml");
        assert_eq!(Config::load_or_default(&path).unwrap(), Config::default());
        assert!(matches!(Config::load(&path), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_subtitle_method_parse() {
        assert_eq!(SubtitleMethod::parse("Burn"), Some(SubtitleMethod::Burn));
        assert_eq!(SubtitleMethod::parse("soft"), Some(SubtitleMethod::Soft));
        assert_eq!(SubtitleMethod::parse("hard"), None);
    }
}
