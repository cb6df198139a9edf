//! Binary entry point for the subtitle translator.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use subline_core::client::openai::OpenAiConnector;
use subline_core::client::{Connector, InferenceClient};
use subline_core::config::{AppConfig, LlmSettings};
use subline_core::context::ContextMap;
use subline_core::jobs::{
    FileTranslationRequest, JobKind, JobOrchestrator, JobPayload, JobResult, LineTranslationRequest,
};
use subline_core::progress::format_eta;
use subline_core::subtitle;
use subline_core::translate::TranslationMode;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often the running job is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Command line options for the binary.
#[derive(Parser)]
struct Cli {
    /// Enable verbose debug and trace logs.
    #[arg(long, global = true)]
    debug: bool,

    /// JSON config file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate an .srt or .ass file.
    TranslateFile(FileArgs),
    /// Translate a single line of text.
    TranslateLine(LineArgs),
    /// Print dialogue statistics for a subtitle file.
    Info {
        /// Path to the subtitle file.
        input: PathBuf,
    },
}

#[derive(Args)]
struct LangArgs {
    /// Source language, e.g. `ja`.
    #[arg(long)]
    from: Option<String>,

    /// Target language, e.g. `en`.
    #[arg(long)]
    to: Option<String>,

    /// Extra context as `key=value`. Repeatable.
    #[arg(long = "context", value_parser = parse_key_val)]
    context: Vec<(String, String)>,

    /// JSON object of extra context entries.
    #[arg(long)]
    context_file: Option<PathBuf>,
}

#[derive(Args)]
struct FileArgs {
    /// Path to the subtitle file we want to translate.
    input: PathBuf,

    /// Number of subtitle lines to translate per batch.
    #[arg(long, conflicts_with = "per_line")]
    batch_size: Option<usize>,

    /// Translate one line at a time. Failed lines are kept untranslated.
    #[arg(long)]
    per_line: bool,

    /// Lines of context before and after each line in per-line mode.
    #[arg(long, requires = "per_line")]
    window: Option<usize>,

    /// Where to write the translation. Defaults to `{stem}_translated{ext}`
    /// next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    lang: LangArgs,
}

#[derive(Args)]
struct LineArgs {
    /// Text to translate.
    text: String,

    #[command(flatten)]
    lang: LangArgs,
}

/// Parse `key=value`.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got {s:?}"))?;
    Ok((k.trim().to_string(), v.trim().to_string()))
}

/// Merge the context file (if any) and `--context` pairs, pairs winning.
fn load_context(args: &LangArgs) -> Result<ContextMap> {
    let mut context = match &args.context_file {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading context file {}", path.display()))?;
            serde_json::from_str::<BTreeMap<String, String>>(&text)
                .context("context file must be a JSON object of strings")?
        }
        None => ContextMap::new(),
    };
    context.extend(args.context.iter().cloned());
    Ok(context)
}

/// Build an orchestrator with a loaded inference client.
async fn connect(llm: &LlmSettings) -> Result<JobOrchestrator> {
    let connector: Arc<dyn Connector<LlmSettings, dyn InferenceClient>> = Arc::new(OpenAiConnector);
    let orchestrator = JobOrchestrator::new(Some(connector), None);
    orchestrator.configure_llm(|s| *s = llm.clone());
    orchestrator.initialize(JobKind::Translation).await?;
    Ok(orchestrator)
}

/// Poll until the job of `kind` reaches a terminal state, logging progress.
async fn wait_for(orchestrator: &JobOrchestrator, kind: JobKind) -> Result<JobPayload> {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut reported = 0;
    loop {
        ticker.tick().await;
        let progress = orchestrator.progress();
        if progress.total > 0 && progress.current != reported {
            reported = progress.current;
            info!(
                "completed {}/{} lines ({}%), ETA: {}",
                progress.current,
                progress.total,
                progress.current * 100 / progress.total,
                format_eta(progress.eta_seconds)
            );
        }
        match orchestrator.result(kind) {
            JobResult::Processing => continue,
            JobResult::Complete(payload) => return Ok(payload),
            JobResult::Error(message) => return Err(anyhow!(message)),
            JobResult::Idle => return Err(anyhow!("{kind} job finished without a result")),
        }
    }
}

async fn translate_file(config: &AppConfig, args: FileArgs) -> Result<()> {
    let defaults = &config.translation;
    let mode = if args.per_line {
        TranslationMode::LineByLine {
            context_window: args.window.unwrap_or(defaults.context_window),
        }
    } else {
        TranslationMode::Batched {
            batch_size: args.batch_size.unwrap_or(defaults.batch_size),
        }
    };
    let request = FileTranslationRequest {
        path: args.input.clone(),
        context: load_context(&args.lang)?,
        input_lang: args.lang.from.clone().unwrap_or_else(|| defaults.input_lang.clone()),
        output_lang: args.lang.to.clone().unwrap_or_else(|| defaults.output_lang.clone()),
        mode,
    };
    let orchestrator = connect(&config.llm).await?;
    let _job = orchestrator.submit_translate_file(request)?;
    match wait_for(&orchestrator, JobKind::Translation).await? {
        JobPayload::FileTranslation { filename, content } => {
            let out = args
                .output
                .unwrap_or_else(|| args.input.with_file_name(filename));
            fs::write(&out, content)?;
            info!("wrote {}", out.display());
            Ok(())
        }
        other => Err(anyhow!("unexpected payload {other:?}")),
    }
}

async fn translate_line(config: &AppConfig, args: LineArgs) -> Result<()> {
    let defaults = &config.translation;
    let request = LineTranslationRequest {
        context: load_context(&args.lang)?,
        input_lang: args.lang.from.unwrap_or_else(|| defaults.input_lang.clone()),
        output_lang: args.lang.to.unwrap_or_else(|| defaults.output_lang.clone()),
        text: args.text,
    };
    let orchestrator = connect(&config.llm).await?;
    let _job = orchestrator.submit_translate_line(request)?;
    match wait_for(&orchestrator, JobKind::Translation).await? {
        JobPayload::LineTranslation(text) => {
            println!("{text}");
            Ok(())
        }
        other => Err(anyhow!("unexpected payload {other:?}")),
    }
}

fn print_info(input: &Path) -> Result<()> {
    let doc = subtitle::load(input)?;
    println!("{}", serde_json::to_string_pretty(&subtitle::stats(&doc.script))?);
    Ok(())
}

/// Application entry point which parses CLI args and performs actions.
/// This function should initialize logging and delegate to the core library.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.debug {
        EnvFilter::default()
            .add_directive("subline=trace".parse()?)
            .add_directive("subline_core=trace".parse()?)
            .add_directive("info".parse()?)
    } else {
        EnvFilter::default()
            .add_directive("subline=info".parse()?)
            .add_directive("subline_core=info".parse()?)
            .add_directive("warn".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let config = AppConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::TranslateFile(args) => translate_file(&config, args).await,
        Command::TranslateLine(args) => translate_line(&config, args).await,
        Command::Info { input } => print_info(&input),
    }
}
