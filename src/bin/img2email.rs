//! CLI binary for edgequake-img2email.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig` / `RenderConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_img2email::pipeline::input::{prepare_image, resolve_input};
use edgequake_img2email::{
    analyze_image, generate_email_html, render_to_file, resolve_slices, segment_only, AnalysisConfig,
    AnalysisProgressCallback, AnalysisStrategy, Area, AreaKind, DirSliceStore, HttpModel, LanguageModel,
    ModelConfig, ProgressCallback, ProviderKind, RenderConfig, SliceOptions, SuggestionKind,
    TextAssistant,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a live progress bar plus one log line per classified block.
/// Blocks complete out of order when classified concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    fallbacks: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Segmenting image…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            fallbacks: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} blocks  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Classifying");
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_blocks: usize) {
        self.activate_bar(total_blocks);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Classifying {total_blocks} blocks…"))
        ));
    }

    fn on_block_start(&self, index: usize, _total: usize) {
        self.bar.set_message(format!("block {}", index + 1));
    }

    fn on_block_complete(&self, index: usize, total: usize, kind: AreaKind) {
        self.bar.println(format!(
            "  {} Block {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(kind.as_str()),
        ));
        self.bar.inc(1);
    }

    fn on_block_fallback(&self, index: usize, total: usize, error: &str) {
        self.fallbacks.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Block {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_analysis_complete(&self, total_blocks: usize, area_count: usize) {
        self.bar.finish_and_clear();
        let fallbacks = self.fallbacks.load(Ordering::SeqCst);
        if fallbacks == 0 {
            eprintln!(
                "{} {} blocks → {} areas",
                green("✔"),
                bold(&total_blocks.to_string()),
                bold(&area_count.to_string())
            );
        } else {
            eprintln!(
                "{} {} blocks → {} areas  ({} fell back to spacers)",
                cyan("⚠"),
                bold(&total_blocks.to_string()),
                bold(&area_count.to_string()),
                red(&fallbacks.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a design and print the HTML email
  img2email analyze design.png

  # Write HTML and the area list, cropping image slices to disk
  img2email analyze design.png -o email.html --areas areas.json \
      --slices-dir public/slices --slice-url /slices --base-url https://cdn.example.com

  # One model call for the whole layout instead of per-block classification
  img2email analyze --whole-image design.png -o email.html

  # Inspect segmentation (no model needed)
  img2email segment design.png --json

  # Re-render an edited area list
  img2email render areas.json -o email.html

  # Copywriting helpers
  img2email suggest --kind button --context "summer sale"
  img2email improve "Buy our stuff" --instruction "Make it friendlier"

ENVIRONMENT VARIABLES:
  AI_ENABLED        Must be "true" for any model call
  AI_PROVIDER       ollama (default) or openai
  AI_MODEL          Text model (default: llama3.2)
  AI_VISION_MODEL   Vision model (default: AI_MODEL, else llava)
  OLLAMA_BASE_URL   Default: http://localhost:11434
  OPENAI_API_KEY    Required when AI_PROVIDER=openai
  OPENAI_BASE_URL   Default: https://api.openai.com/v1

SETUP:
  1. ollama pull llava
  2. export AI_ENABLED=true AI_VISION_MODEL=llava
  3. img2email analyze design.png -o email.html
"#;

/// Turn email design images into table-based HTML email.
#[derive(Parser, Debug)]
#[command(
    name = "img2email",
    version,
    about = "Turn email design images into table-based HTML email using pixel segmentation and vision models",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "IMG2EMAIL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "IMG2EMAIL_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "IMG2EMAIL_NO_PROGRESS")]
    no_progress: bool,

    /// Override AI_PROVIDER (ollama, openai).
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Override AI_VISION_MODEL.
    #[arg(long, global = true)]
    vision_model: Option<String>,

    /// Override AI_MODEL.
    #[arg(long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a design image and generate HTML email.
    Analyze(AnalyzeArgs),
    /// Print the pixel segmentation of an image (no model needed).
    Segment(SegmentArgs),
    /// Render an area list (JSON) to HTML email.
    Render(RenderArgs),
    /// Suggest copy for a text or button area.
    Suggest(SuggestArgs),
    /// Rewrite existing copy.
    Improve(ImproveArgs),
    /// Report whether model access is configured.
    Status,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Local PNG/JPEG path or HTTP/HTTPS URL.
    input: String,

    /// Write HTML to this file instead of stdout.
    #[arg(short, long, env = "IMG2EMAIL_OUTPUT")]
    output: Option<PathBuf>,

    /// Also write the area list as JSON.
    #[arg(long, env = "IMG2EMAIL_AREAS")]
    areas: Option<PathBuf>,

    /// Crop slice areas to JPEG files in this directory.
    #[arg(long, env = "IMG2EMAIL_SLICES_DIR")]
    slices_dir: Option<PathBuf>,

    /// URL prefix the slice files are served from. Default: the slices directory path.
    #[arg(long, env = "IMG2EMAIL_SLICE_URL")]
    slice_url: Option<String>,

    /// Keep buttons as live HTML instead of cropping them to image CTAs.
    #[arg(long, env = "IMG2EMAIL_LIVE_BUTTONS")]
    live_buttons: bool,

    /// Analyze the image as uploaded, without resizing to 1200 px / JPEG.
    #[arg(long, env = "IMG2EMAIL_KEEP_ORIGINAL")]
    keep_original: bool,

    /// One model call for the whole layout instead of per-block classification.
    #[arg(long, env = "IMG2EMAIL_WHOLE_IMAGE")]
    whole_image: bool,

    /// Number of concurrent block classification calls.
    #[arg(short, long, env = "IMG2EMAIL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "IMG2EMAIL_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Retries per block on model failure.
    #[arg(long, env = "IMG2EMAIL_MAX_RETRIES", default_value_t = 1)]
    max_retries: u32,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "IMG2EMAIL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the full analysis (areas, blocks, fallbacks, stats) as JSON instead of HTML.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    render: RenderFlags,
}

#[derive(Args, Debug)]
struct RenderFlags {
    /// Base URL prepended to relative image paths.
    #[arg(long, env = "IMG2EMAIL_BASE_URL")]
    base_url: Option<String>,

    /// Email container width in pixels.
    #[arg(long, env = "IMG2EMAIL_WIDTH", default_value_t = 600)]
    width: u32,

    /// Container background colour.
    #[arg(long, env = "IMG2EMAIL_BACKGROUND", default_value = "#ffffff")]
    background: String,

    /// Document title.
    #[arg(long, env = "IMG2EMAIL_TITLE", default_value = "Email")]
    title: String,

    /// Skip the CSS inlining pass.
    #[arg(long, env = "IMG2EMAIL_NO_INLINE_CSS")]
    no_inline_css: bool,
}

#[derive(Args, Debug)]
struct SegmentArgs {
    /// Local PNG/JPEG path or HTTP/HTTPS URL.
    input: String,

    /// Output JSON.
    #[arg(long)]
    json: bool,

    /// Minimum block height in pixels.
    #[arg(long, default_value_t = 30)]
    min_block_height: u32,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// JSON file with an array of areas.
    areas: PathBuf,

    /// Write HTML to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    render: RenderFlags,
}

#[derive(Args, Debug)]
struct SuggestArgs {
    /// text or button.
    #[arg(long, default_value = "text")]
    kind: String,

    /// Existing copy to improve on.
    #[arg(long)]
    current: Option<String>,

    /// What the email is about.
    #[arg(long)]
    context: Option<String>,
}

#[derive(Args, Debug)]
struct ImproveArgs {
    /// Text to rewrite.
    text: String,

    /// How to rewrite it.
    #[arg(long)]
    instruction: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides all the feedback during analysis, so INFO
    // logs are suppressed while it is shown.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && matches!(&cli.command, Command::Analyze(a) if !a.json);
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

    match &cli.command {
        Command::Analyze(args) => run_analyze(&cli, args, show_progress).await,
        Command::Segment(args) => run_segment(args).await,
        Command::Render(args) => run_render(args).await,
        Command::Suggest(args) => {
            let kind: SuggestionKind = args.kind.parse().context("Invalid --kind")?;
            let text = assistant(&cli, 60)?
                .suggest_text(kind, args.current.as_deref(), args.context.as_deref())
                .await
                .context("Suggestion failed")?;
            println!("{text}");
            Ok(())
        }
        Command::Improve(args) => {
            let text = assistant(&cli, 60)?
                .improve_text(&args.text, args.instruction.as_deref())
                .await
                .context("Rewrite failed")?;
            println!("{text}");
            Ok(())
        }
        Command::Status => {
            let status = assistant(&cli, 60)?.status();
            if status.available {
                println!("{} {} ({})", green("✔"), status.message, status.provider);
            } else {
                println!("{} AI is not configured ({})", red("✘"), status.provider);
                println!("{}", status.message);
            }
            Ok(())
        }
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn run_analyze(cli: &Cli, args: &AnalyzeArgs, show_progress: bool) -> Result<()> {
    let render_config = build_render_config(&args.render)?;

    let loaded = resolve_input(&args.input, args.download_timeout)
        .await
        .with_context(|| format!("Failed to load '{}'", args.input))?;
    let image = if args.keep_original {
        loaded
    } else {
        prepare_image(&loaded.bytes)
            .await
            .context("Failed to prepare image")?
    };

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new_dynamic() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_analysis_config(args, progress)?;
    let model = http_model(cli, args.api_timeout)?;

    let output = analyze_image(&image.bytes, image.width, image.height, &model, &config)
        .await
        .context("Analysis failed")?;

    let mut areas = output.areas.clone();
    if let Some(ref dir) = args.slices_dir {
        let url_prefix = args
            .slice_url
            .clone()
            .unwrap_or_else(|| dir.display().to_string());
        let store = DirSliceStore::new(dir, url_prefix);
        let options = SliceOptions {
            include_buttons: !args.live_buttons,
            ..Default::default()
        };
        areas = resolve_slices(&areas, &image.bytes, &store, &options)
            .await
            .context("Failed to write slices")?;
    }

    if let Some(ref path) = args.areas {
        write_json(path, &areas).await?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    emit_html(&areas, args.output.as_deref(), &render_config).await?;

    if !cli.quiet {
        let s = &output.stats;
        eprintln!(
            "   {} areas  /  {} model calls  —  {}ms total",
            dim(&s.area_count.to_string()),
            dim(&s.model_calls.to_string()),
            s.total_duration_ms,
        );
    }
    Ok(())
}

async fn run_segment(args: &SegmentArgs) -> Result<()> {
    let image = resolve_input(&args.input, 120)
        .await
        .with_context(|| format!("Failed to load '{}'", args.input))?;
    let config = AnalysisConfig::builder()
        .min_block_height(args.min_block_height)
        .build()
        .context("Invalid configuration")?;

    let blocks = segment_only(&image.bytes, image.width, image.height, &config)
        .await
        .context("Segmentation failed")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&blocks).context("Failed to serialise blocks")?
        );
    } else {
        println!("Image: {}x{}  ({} blocks)", image.width, image.height, blocks.len());
        for (i, b) in blocks.iter().enumerate() {
            println!(
                "{:>3}  {:<5}  y={:<5} h={:<5} {}",
                i + 1,
                b.kind.as_str(),
                b.y,
                b.height,
                b.background_hint
            );
        }
    }
    Ok(())
}

async fn run_render(args: &RenderArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.areas)
        .await
        .with_context(|| format!("Failed to read {:?}", args.areas))?;
    let areas: Vec<Area> =
        serde_json::from_str(&raw).with_context(|| format!("Invalid area JSON in {:?}", args.areas))?;
    let config = build_render_config(&args.render)?;
    emit_html(&areas, args.output.as_deref(), &config).await
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn build_analysis_config(args: &AnalyzeArgs, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let strategy = if args.whole_image {
        AnalysisStrategy::WholeImage
    } else {
        AnalysisStrategy::Segmented
    };
    let mut builder = AnalysisConfig::builder()
        .strategy(strategy)
        .concurrency(args.concurrency)
        .api_timeout_secs(args.api_timeout)
        .max_retries(args.max_retries);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn build_render_config(flags: &RenderFlags) -> Result<RenderConfig> {
    let mut builder = RenderConfig::builder()
        .email_width(flags.width)
        .background_color(flags.background.clone())
        .title(flags.title.clone())
        .inline_css(!flags.no_inline_css);
    if let Some(ref url) = flags.base_url {
        builder = builder.base_url(url.clone());
    }
    builder.build().context("Invalid render configuration")
}

fn model_config(cli: &Cli) -> ModelConfig {
    let mut config = ModelConfig::from_env();
    if let Some(ref p) = cli.provider {
        config.provider = ProviderKind::parse(p);
    }
    if let Some(ref m) = cli.model {
        config.model = m.clone();
    }
    if let Some(ref m) = cli.vision_model {
        config.vision_model = m.clone();
    }
    config
}

fn http_model(cli: &Cli, timeout_secs: u64) -> Result<HttpModel> {
    HttpModel::with_timeout(model_config(cli), timeout_secs).context("Failed to create HTTP client")
}

fn assistant(cli: &Cli, timeout_secs: u64) -> Result<TextAssistant> {
    let model: Arc<dyn LanguageModel> = Arc::new(http_model(cli, timeout_secs)?);
    Ok(TextAssistant::new(model))
}

async fn write_json(path: &Path, areas: &[Area]) -> Result<()> {
    let json = serde_json::to_string_pretty(areas).context("Failed to serialise areas")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", path))
}

async fn emit_html(areas: &[Area], output: Option<&Path>, config: &RenderConfig) -> Result<()> {
    match output {
        Some(path) => {
            let bytes = render_to_file(areas, path, config)
                .await
                .context("Failed to render HTML")?;
            eprintln!("{}  {} bytes  →  {}", green("✔"), bytes, bold(&path.display().to_string()));
        }
        None => {
            let html = generate_email_html(areas, config).context("Failed to render HTML")?;
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(html.as_bytes())
                .context("Failed to write to stdout")?;
            if !html.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}
