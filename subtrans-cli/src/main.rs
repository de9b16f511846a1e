use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use subtrans::config::DEFAULT_CONFIG_PATH;
use subtrans::repair::{self, RepairState};
use subtrans::{Config, Language, Pipeline, PipelineOutput, Segment, SubtitleMethod, Transcript};

#[derive(Parser)]
#[command(name = "subtrans", about = "Translate a video's speech into subtitles")]
struct Cli {
    /// Video URL or local video file.
    #[arg(required_unless_present_any = ["test", "repair", "regen", "init_config", "list_languages"])]
    input: Option<String>,

    /// Target language code (e.g. "ja", "de").
    #[arg(short, long, default_value = "ja")]
    lang: String,

    /// Config file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Remove temporary audio files after the run.
    #[arg(long)]
    cleanup: bool,

    /// Debug logging.
    #[arg(long)]
    debug: bool,

    /// Translate and render a built-in two-line sample instead of a video.
    #[arg(long)]
    test: bool,

    /// How subtitles are added to the video (overrides the config).
    #[arg(long)]
    method: Option<MethodArg>,

    /// Whisper model name or path to a ggml file (overrides the config).
    #[arg(long)]
    model: Option<String>,

    /// Repair a subtitle file, or every .srt file in a directory.
    #[arg(long, value_name = "PATH")]
    repair: Option<PathBuf>,

    /// Regenerate subtitles from a saved transcript JSON.
    #[arg(long, value_name = "TRANSCRIPT")]
    regen: Option<PathBuf>,

    /// Video to mux the regenerated subtitles into.
    #[arg(long, requires = "regen")]
    video: Option<PathBuf>,

    /// Write a default config file and exit.
    #[arg(long)]
    init_config: bool,

    /// List supported languages.
    #[arg(long)]
    list_languages: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Burn,
    Soft,
}

impl From<MethodArg> for SubtitleMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Burn => SubtitleMethod::Burn,
            MethodArg::Soft => SubtitleMethod::Soft,
        }
    }
}

fn exit_with(err: impl std::fmt::Display) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(1);
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn sample_transcript() -> Transcript {
    let segments = vec![
        Segment::new(0.0, 3.0, "Hello, this is a subtitle test."),
        Segment::new(3.0, 6.0, "The translation should appear here."),
    ];
    Transcript {
        detected_language: "en".into(),
        full_text: segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
        segments,
    }
}

fn print_output(out: &PipelineOutput) {
    let t = &out.translated;
    eprintln!(
        "Translated {}/{} segments ({} → {})",
        t.translated_count(),
        t.segments.len(),
        t.source_language,
        t.target_language
    );
    if let Some(json) = &out.transcript_json {
        eprintln!("Transcript: {}", json.display());
    }
    eprintln!("Subtitles:  {}", out.subtitle.display());
    if let Some(vtt) = &out.vtt {
        eprintln!("WebVTT:     {}", vtt.display());
    }
    if let Some(output) = &out.output {
        println!("{}", output.display());
    }
}

fn run_repair(path: &Path) {
    if path.is_dir() {
        let summary = repair::repair_dir(path).unwrap_or_else(|e| exit_with(e));
        println!(
            "Scanned {} files: {} fixed, {} failed",
            summary.scanned, summary.fixed, summary.failed
        );
        if summary.failed > 0 {
            std::process::exit(1);
        }
        return;
    }

    let outcome = repair::repair_file(path).unwrap_or_else(|e| exit_with(e));
    match outcome.state {
        RepairState::Clean => println!("{}: clean ({} entries)", path.display(), outcome.entries),
        RepairState::Repaired => {
            println!(
                "{}: repaired, {} markers replaced, {} entries",
                path.display(),
                outcome.replacements,
                outcome.entries
            );
            if let Some(backup) = &outcome.backup {
                println!("backup: {}", backup.display());
            }
        }
        state => {
            eprintln!("{}: repair failed ({state:?}), original restored", path.display());
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let directive = if cli.debug { "subtrans=debug" } else { "subtrans=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(directive.parse().unwrap_or_else(|e| exit_with(e))),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.list_languages {
        println!("{:<6} LANGUAGE", "CODE");
        println!("{:<6} --------", "----");
        for (code, name) in Language::supported() {
            println!("{code:<6} {name}");
        }
        return;
    }

    if cli.init_config {
        if let Err(e) = Config::default().write(&cli.config) {
            exit_with(e);
        }
        println!("Wrote default config to {}", cli.config.display());
        return;
    }

    if let Some(path) = &cli.repair {
        run_repair(path);
        return;
    }

    let mut config = Config::load_or_default(&cli.config).unwrap_or_else(|e| exit_with(e));
    if cli.cleanup {
        config.paths.cleanup_temp_files = true;
    }
    if let Some(method) = cli.method {
        config.subtitle.method = method.into();
    }
    if let Some(model) = cli.model {
        config.transcription.model = model;
    }

    let target = Language::new(&cli.lang).unwrap_or_else(|e| {
        eprintln!("Use --list-languages to see supported languages");
        exit_with(e)
    });
    let pipeline = Pipeline::from_config(config).unwrap_or_else(|e| exit_with(e));

    let (pb, result) = if cli.test {
        let pb = spinner("Translating sample transcript");
        let result = pipeline.subtitle(&sample_transcript(), target, "test").await;
        (pb, result)
    } else if let Some(json) = &cli.regen {
        let pb = spinner("Regenerating subtitles");
        let result = pipeline
            .subtitle_transcript(json, target, cli.video.as_deref())
            .await;
        (pb, result)
    } else {
        let input = cli.input.unwrap_or_default();
        let pb = spinner("Processing video");
        let result = pipeline.run(&input, target).await;
        (pb, result)
    };
    pb.finish_and_clear();

    match result {
        Ok(out) => {
            if cli.test {
                for seg in &out.translated.segments {
                    eprintln!("  {} → {}", seg.source_text(), seg.text);
                }
            }
            print_output(&out);
        }
        Err(e) => exit_with(e),
    }
}
