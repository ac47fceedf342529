// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use log::{info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use subs2study::app_config::{Config, LogLevel};
use subs2study::app_controller::Controller;
use subs2study::job::{CancelFlag, JobSettings, Mode, RunContext};
use subs2study::media::FfmpegMedia;
use subs2study::providers::ProviderRegistry;

/// CLI Wrapper for Mode to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Cards,
    Dubs,
    Translit,
    Enhance,
}

impl From<CliMode> for Mode {
    fn from(cli_mode: CliMode) -> Self {
        match cli_mode {
            CliMode::Cards => Mode::Cards,
            CliMode::Dubs => Mode::Dubs,
            CliMode::Translit => Mode::Translit,
            CliMode::Enhance => Mode::Enhance,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate shell completions for subs2study
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// subs2study - study material from subtitled media
///
/// Cuts every subtitle line of a film or episode into an audio clip and a
/// still frame, aligns it with a reference subtitle and writes one record
/// per line, ready for import into a flashcard program.
#[derive(Parser, Debug)]
#[command(name = "subs2study")]
#[command(version)]
#[command(about = "Batch study-card and dubtitle generator for subtitled media")]
#[command(long_about = "subs2study turns subtitled media into per-line study material.

EXAMPLES:
    subs2study movie.mkv                          # Cards with the configured languages
    subs2study -l ja,en /series/                  # Every episode under a directory
    subs2study -m dubs --stt whisper-1 movie.mkv  # Dubtitles from speech-to-text
    subs2study --condensed --dub-only movie.mkv   # Condensed audio, no images
    subs2study -m enhance --separation custom a.mkv
    subs2study completions bash > subs2study.bash

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default
    one will be created automatically. Command line flags override it.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Media file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: Option<PathBuf>,

    /// Languages, target first then references (e.g. 'ja,en' or 'pt-BR,en')
    #[arg(short, long, value_delimiter = ',')]
    lang: Vec<String>,

    /// Processing mode
    #[arg(short, long, value_enum)]
    mode: Option<CliMode>,

    /// Number of extraction workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Audio padding around each line, in milliseconds
    #[arg(long)]
    offset: Option<u64>,

    /// Speech-to-text model (whisper-1, gpt-4o-transcribe, gpt-4o-mini-transcribe, custom)
    #[arg(long)]
    stt: Option<String>,

    /// API key of the speech-to-text service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Voice separation provider
    #[arg(long)]
    separation: Option<String>,

    /// Target subtitle file, bypassing automatic selection
    #[arg(long)]
    target_subs: Option<PathBuf>,

    /// Reference subtitle file, bypassing automatic selection
    #[arg(long)]
    reference_subs: Option<PathBuf>,

    /// Audio stream index, auto-selected by default
    #[arg(short, long)]
    audio_track: Option<usize>,

    /// Audio only, no still images
    #[arg(long)]
    dub_only: bool,

    /// Build a condensed audio track
    #[arg(long)]
    condensed: bool,

    /// Answer yes to every prompt
    #[arg(short, long)]
    yes: bool,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, default_value = "conf.json")]
    config_path: String,

    /// Set logging level
    #[arg(long, value_enum)]
    log_level: Option<CliLogLevel>,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Marker for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color of a level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();

            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // The level is lowered or raised once the config is known
    CustomLogger::init(LevelFilter::Trace)?;
    log::set_max_level(LevelFilter::Info);

    let cli = CommandLineOptions::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = CommandLineOptions::command();
        generate(shell, &mut cmd, "subs2study", &mut std::io::stdout());
        return Ok(());
    }

    let input_path = cli.input_path.clone().ok_or_else(|| {
        anyhow!("INPUT_PATH is required when no subcommand is specified")
    })?;

    run(cli, input_path).await
}

// @returns: Config with command line overrides applied
fn apply_overrides(mut config: Config, options: &CommandLineOptions) -> Config {
    if !options.lang.is_empty() {
        config.languages = options.lang.clone();
    }
    if let Some(mode) = options.mode {
        config.mode = mode.into();
    }
    if let Some(workers) = options.workers {
        config.workers = workers;
    }
    if let Some(offset) = options.offset {
        config.offset_ms = offset;
    }
    if let Some(model) = &options.stt {
        config.transcription.model = model.clone();
    }
    if let Some(api_key) = &options.api_key {
        config.transcription.api_key = api_key.clone();
    }
    if let Some(provider) = &options.separation {
        config.separation.provider = provider.clone();
    }
    if options.audio_track.is_some() {
        config.audio_track = options.audio_track;
    }
    if options.dub_only {
        config.dub_only = true;
    }
    if options.condensed {
        config.condensed_audio = true;
    }
    if let Some(log_level) = options.log_level {
        config.log_level = log_level.into();
    }
    config
}

async fn run(options: CommandLineOptions, input_path: PathBuf) -> Result<()> {
    // If log level is set via command line, apply it immediately
    if let Some(cli_level) = options.log_level {
        log::set_max_level(LogLevel::from(cli_level).into());
    }

    let config = Config::load_or_create(&options.config_path)?;
    let config = apply_overrides(config, &options);
    config.validate()
        .context("Configuration validation failed")?;
    log::set_max_level(config.log_level.into());

    let settings = JobSettings::from_config(&config)?
        .with_subtitles(options.target_subs.clone(), options.reference_subs.clone());

    let media = Arc::new(FfmpegMedia::new(
        config.ffmpeg_path.clone(),
        config.ffprobe_path.clone(),
        Duration::from_secs(config.media_timeout_secs),
    ));
    let providers = Arc::new(ProviderRegistry::from_config(&config));

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing the lines in flight");
                cancel.cancel();
            }
        });
    }

    let ctx = RunContext::new(media, providers)
        .with_cancel(cancel)
        .assume_yes(options.yes)
        .quiet(options.quiet);

    info!("subs2study: {} mode, {} workers", settings.mode, settings.workers);
    let controller = Controller::new(settings, ctx);
    let summary = controller.run(&input_path).await?;

    if summary.processed == 0 && summary.failed > 0 {
        return Err(anyhow!("No media file could be processed"));
    }
    Ok(())
}
