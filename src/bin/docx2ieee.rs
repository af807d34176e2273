//! CLI binary for docx2ieee.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `TransformConfig` / `AssistantConfig` and prints results.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use docx2ieee::{
    inspect, write_output, Assistant, AssistantConfig, AssistantMode, AssistantQuery, ImageSize,
    PipelineController, PipelineProgressCallback, ProgressCallback, RawDocument, Stage,
    StageFailure, TransformConfig, TransformOutput, VerificationMode, WrittenFiles,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Per-file progress callback. Every file shares one bar whose length is
/// `files × 6` working stages; each file prints its own stage lines.
struct CliProgressCallback {
    bar: ProgressBar,
    name: String,
}

impl CliProgressCallback {
    fn shared_bar(files: usize) -> ProgressBar {
        let bar = ProgressBar::new((files * Stage::STEPS.len()) as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} stages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Transforming");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }

    fn new(bar: ProgressBar, name: String) -> Arc<Self> {
        Arc::new(Self { bar, name })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, _run_id: u64, stage: Stage) {
        self.bar.set_message(format!("{} · {}", self.name, stage.label()));
    }

    fn on_stage_complete(&self, _run_id: u64, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<28} {:<12} {}",
            green("✓"),
            self.name,
            stage.label(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_run_failed(&self, _run_id: u64, failure: &StageFailure) {
        self.bar.println(format!(
            "  {} {:<28} {:<12} {}",
            red("✗"),
            self.name,
            failure.stage.label(),
            red(&failure.message),
        ));
        // Skip the stages this file will never reach.
        let done = failure.stage.step_index().unwrap_or(0);
        self.bar
            .inc(Stage::STEPS.len().saturating_sub(done) as u64);
    }

    fn on_run_complete(&self, _run_id: u64, output_filename: &str, total_ms: u64) {
        self.bar.println(format!(
            "{} {} → {}  {}",
            green("✔"),
            self.name,
            bold(output_filename),
            dim(&format!("{total_ms}ms")),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Transform one draft; writes paper_IEEE.docx next to it
  docx2ieee convert paper.docx

  # Several drafts into one directory, with manifests
  docx2ieee convert drafts/*.docx -o out/ --manifest --concurrency 4

  # Check a draft without calling any LLM
  docx2ieee inspect paper.docx

  # Ask the research assistant
  docx2ieee ask "How should IEEE references be numbered?"
  docx2ieee ask --mode search "IEEE conference template margins"
  docx2ieee ask --mode image-generate --size 2K --save fig.png "block diagram of a CNN"
  docx2ieee ask --mode image-analyze --image plot.png "what does this show?"

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key (also used for image generation)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Convert research-paper drafts into IEEE conference layout.
#[derive(Parser, Debug)]
#[command(
    name = "docx2ieee",
    version,
    about = "Convert .docx research papers into IEEE two-column layout",
    long_about = "Convert .docx research-paper drafts into the IEEE two-column conference \
layout. The draft's text is segmented by an LLM (OpenAI, Anthropic, Gemini, Ollama or any \
OpenAI-compatible endpoint) without rewording, then rendered as a new .docx with a manifest \
of checksums and the citation index.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCX2IEEE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCX2IEEE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transform one or more .docx files.
    Convert(ConvertArgs),
    /// Run validation and text extraction only (no API key needed).
    Inspect(InspectArgs),
    /// Ask the research assistant.
    Ask(AskArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input .docx files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory. Default: next to each input.
    #[arg(short, long, env = "DOCX2IEEE_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Also write <stem>_IEEE.manifest.json.
    #[arg(long, env = "DOCX2IEEE_MANIFEST")]
    manifest: bool,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "DOCX2IEEE_JSON")]
    json: bool,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Verification after rendering.
    #[arg(long, env = "DOCX2IEEE_VERIFY", value_enum, default_value = "content")]
    verify: VerifyArg,

    /// Delay for `--verify delay`, in milliseconds.
    #[arg(long, env = "DOCX2IEEE_VERIFY_DELAY_MS", default_value_t = 800)]
    verify_delay_ms: u64,

    /// Per-stage timeout in seconds (0 disables).
    #[arg(long, env = "DOCX2IEEE_TIMEOUT", default_value_t = 180)]
    timeout: u64,

    /// Number of files transformed concurrently.
    #[arg(short, long, env = "DOCX2IEEE_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Accept documents with unresolved tracked changes.
    #[arg(long, env = "DOCX2IEEE_ALLOW_TRACKED_CHANGES")]
    allow_tracked_changes: bool,

    /// Minimum extracted characters.
    #[arg(long, env = "DOCX2IEEE_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Retries for transient LLM failures.
    #[arg(long, env = "DOCX2IEEE_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Path to a text file containing a custom structure prompt.
    #[arg(long, env = "DOCX2IEEE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "DOCX2IEEE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input .docx file.
    input: PathBuf,

    /// Minimum extracted characters.
    #[arg(long, env = "DOCX2IEEE_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Filenames containing this are reported as protected.
    #[arg(long, env = "DOCX2IEEE_PROTECTED_MARKER", default_value = "protected")]
    protected_marker: String,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AskArgs {
    /// The question or prompt.
    query: String,

    /// chat, search, image-generate or image-analyze.
    #[arg(long, default_value = "chat")]
    mode: AssistantMode,

    /// Image to analyze (image-analyze).
    #[arg(long)]
    image: Option<PathBuf>,

    /// Generated image size: 1K, 2K or 4K (image-generate).
    #[arg(long, default_value = "1K")]
    size: ImageSize,

    /// Write a generated image here instead of printing its URL.
    #[arg(long)]
    save: Option<PathBuf>,

    /// Refuse clearly off-topic questions locally.
    #[arg(long, env = "DOCX2IEEE_DOMAIN_GUARD")]
    domain_guard: bool,

    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM call timeout in seconds.
    #[arg(long, env = "DOCX2IEEE_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Print the reply as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum VerifyArg {
    Content,
    Delay,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Convert(args) => run_convert(args, cli.quiet, show_progress).await,
        Command::Inspect(args) => run_inspect(args).await,
        Command::Ask(args) => run_ask(args).await,
    }
}

// ── convert ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct FileResult {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    written: Option<WrittenFiles>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<docx2ieee::RunStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

async fn run_convert(args: ConvertArgs, quiet: bool, show_progress: bool) -> Result<()> {
    let base = build_config(&args).await?;
    let bar = show_progress.then(|| CliProgressCallback::shared_bar(args.inputs.len()));
    let concurrency = args.concurrency.max(1);

    let results: Vec<FileResult> = stream::iter(args.inputs.iter().cloned())
        .map(|input| {
            let mut config = base.clone();
            if let Some(bar) = &bar {
                let name = display_name(&input);
                config.progress_callback =
                    Some(CliProgressCallback::new(bar.clone(), name) as ProgressCallback);
            }
            let out_dir = args.output_dir.clone();
            let manifest = args.manifest;
            async move {
                match convert_one(&input, config, out_dir, manifest).await {
                    Ok((output, written)) => FileResult {
                        input,
                        written: Some(written),
                        stats: Some(output.stats),
                        error: None,
                        code: None,
                    },
                    Err(e) => FileResult {
                        code: e
                            .downcast_ref::<docx2ieee::PipelineError>()
                            .and_then(|p| p.kind())
                            .map(|k| k.code()),
                        error: Some(format!("{e:#}")),
                        input,
                        written: None,
                        stats: None,
                    },
                }
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Failed to serialise results")?
        );
    } else if !quiet {
        for r in &results {
            match (&r.written, &r.error) {
                (Some(w), _) => {
                    if !show_progress {
                        eprintln!("{} {} → {}", green("✔"), r.input.display(), w.document.display());
                    }
                    if let Some(m) = &w.manifest {
                        eprintln!("   {} {}", dim("manifest"), m.display());
                    }
                }
                (None, Some(e)) => {
                    eprintln!("{} {}: {}", red("✘"), r.input.display(), e);
                }
                (None, None) => {}
            }
        }
        eprintln!(
            "{} {}/{} file(s) transformed",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&(results.len() - failed).to_string()),
            results.len()
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} file(s) failed", results.len());
    }
    Ok(())
}

async fn convert_one(
    input: &Path,
    config: TransformConfig,
    out_dir: Option<PathBuf>,
    manifest: bool,
) -> Result<(TransformOutput, WrittenFiles)> {
    let document = RawDocument::from_path(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let controller = PipelineController::from_config(config)?;
    let output = controller.start(document).await?;

    let dir = out_dir.unwrap_or_else(|| {
        input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let written = write_output(&output, &dir, manifest)
        .await
        .context("Failed to write output")?;
    Ok((output, written))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Map CLI args to `TransformConfig`.
async fn build_config(args: &ConvertArgs) -> Result<TransformConfig> {
    let verification = match args.verify {
        VerifyArg::Content => VerificationMode::Content,
        VerifyArg::Delay => VerificationMode::FixedDelay {
            ms: args.verify_delay_ms,
        },
    };

    let mut builder = TransformConfig::builder()
        .min_text_chars(args.min_chars)
        .stage_timeout_secs(args.timeout)
        .verification(verification)
        .reject_tracked_changes(!args.allow_tracked_changes)
        .max_retries(args.max_retries);

    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = args.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

// ── inspect ──────────────────────────────────────────────────────────────

async fn run_inspect(args: InspectArgs) -> Result<()> {
    let config = inspect_config(&args)?;
    let report = inspect(&args.input, &config)
        .await
        .context("Failed to inspect document")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    let yes_no = |b: bool| if b { red("yes") } else { green("no") };
    let v = &report.validation;
    println!("File:             {}", report.filename);
    println!("Size:             {} bytes", report.size_bytes);
    println!("Extension .docx:  {}", if report.docx_extension { green("yes") } else { red("no") });
    println!("Protected name:   {}", yes_no(v.protected_by_name));
    println!("Encrypted:        {}", yes_no(v.encrypted_container));
    println!("Edit protection:  {}", yes_no(v.enforced_protection));
    println!("Tracked changes:  {}", v.tracked_changes);
    if let Some(ref e) = report.extract_error {
        println!("Extraction:       {}", red(e));
    } else {
        println!("Characters:       {}", report.characters);
        println!("Words:            {}", report.words);
        println!("Paragraphs:       {}", report.paragraphs);
        println!(
            "Enough text:      {}",
            if report.enough_text { green("yes") } else { red("no") }
        );
    }
    Ok(())
}

/// Map `inspect` flags to `TransformConfig`.
fn inspect_config(args: &InspectArgs) -> Result<TransformConfig> {
    TransformConfig::builder()
        .min_text_chars(args.min_chars)
        .protected_marker(&args.protected_marker)
        .build()
        .context("Invalid configuration")
}

// ── ask ──────────────────────────────────────────────────────────────────

async fn run_ask(args: AskArgs) -> Result<()> {
    let mut builder = AssistantConfig::builder()
        .local_domain_guard(args.domain_guard)
        .api_timeout_secs(args.api_timeout);
    if let Some(ref model) = args.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider);
    }
    let config = builder.build().context("Invalid configuration")?;
    let assistant = Assistant::from_config(&config)?;

    let mut query = AssistantQuery::chat(&args.query)
        .with_mode(args.mode)
        .with_size(args.size);
    if let Some(ref path) = args.image {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        query = query.with_image(bytes);
    }

    let reply = assistant.ask(&query).await;

    if let (Some(path), Some(url)) = (&args.save, &reply.image) {
        save_image(path, url).await?;
        eprintln!("{} saved {}", green("✔"), path.display());
    }

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reply).context("Failed to serialise reply")?
        );
        return Ok(());
    }

    println!("{}", reply.content);
    if !reply.sources.is_empty() {
        println!();
        println!("{}", bold("Sources:"));
        for s in &reply.sources {
            println!("  - {} {}", s.title, dim(&s.url));
        }
    }
    if let (Some(url), None) = (&reply.image, &args.save) {
        if url.starts_with("data:") {
            println!("{}", dim(&format!("<image: {} bytes data URL; use --save>", url.len())));
        } else {
            println!("{url}");
        }
    }
    Ok(())
}

async fn save_image(path: &Path, url: &str) -> Result<()> {
    let Some(b64) = url.strip_prefix("data:image/png;base64,") else {
        anyhow::bail!("Generated image is a remote URL, not saved: {url}");
    };
    let bytes = STANDARD
        .decode(b64)
        .context("Generated image is not valid base64")?;
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspect_args(argv: &[&str]) -> InspectArgs {
        let cli = Cli::try_parse_from(argv).unwrap();
        match cli.command {
            Command::Inspect(args) => args,
            other => panic!("expected inspect, got {other:?}"),
        }
    }

    #[test]
    fn inspect_defaults_match_the_library() {
        let config = inspect_config(&inspect_args(&["docx2ieee", "inspect", "paper.docx"])).unwrap();
        let defaults = TransformConfig::default();
        assert_eq!(config.min_text_chars, defaults.min_text_chars);
        assert_eq!(config.protected_marker, defaults.protected_marker);
    }

    #[test]
    fn inspect_honours_threshold_and_marker() {
        let args = inspect_args(&[
            "docx2ieee",
            "inspect",
            "paper.docx",
            "--min-chars",
            "500",
            "--protected-marker",
            "locked",
        ]);
        let config = inspect_config(&args).unwrap();
        assert_eq!(config.min_text_chars, 500);
        assert_eq!(config.protected_marker, "locked");
    }
}
