//! CLI binary for edgequake-table2md.
//!
//! A thin shim over the library crate: one subcommand per stage plus `run`
//! for the whole pipeline. Flags map onto `PipelineConfig`; API keys and
//! defaults come from the environment here and only here.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use edgequake_table2md::pipeline::input::find_input_pdf;
use edgequake_table2md::pipeline::ocr::ocr_crops;
use edgequake_table2md::pipeline::render::render_table_pages;
use edgequake_table2md::{
    crop_from_workspace, load_parsed_document, parse_document, render_markdown,
    rows_for_ocr_file, run_pipeline, PageSelection, PipelineConfig, PipelineProgressCallback,
    ProgressCallback, RowAnchor, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar reused across stages, with a log
/// line per table. Items may complete out of order (OCR runs concurrently).
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len}  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.reset();
        self.bar.set_style(style);
        self.bar.set_length(total as u64);
        self.bar.set_prefix(format!("{:<8}", stage.to_string()));
        self.bar.set_message("");
    }

    fn on_item_complete(&self, _stage: Stage, name: &str) {
        self.bar.println(format!("  {} {}", green("✓"), name));
        self.bar.inc(1);
    }

    fn on_item_error(&self, _stage: Stage, name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), name, red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: Stage, succeeded: usize, total: usize) {
        let failed = total.saturating_sub(succeeded);
        let mark = if failed == 0 {
            green("✔")
        } else if succeeded == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        self.bar.println(format!(
            "{} {} {}/{}{}",
            mark,
            bold(&stage.to_string()),
            succeeded,
            total,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole pipeline on the first PDF in ./input
  table2md run

  # Stage by stage in another workspace
  table2md --root work parse work/input/report.pdf
  table2md --root work pages work/input/report.pdf
  table2md --root work crop --annotate
  table2md --root work ocr
  table2md --root work markdown

  # Inspect the reconstructed rows of one table
  table2md rows ocr_results/page_9_table_1.json

  # Local model through Ollama
  table2md markdown --llm-base-url http://localhost:11434/v1 --model qwen2.5:3b

WORKSPACE:
  input/                     source PDFs
  output/parsed_result.json  Document Parse response
  pages/page_N.png           rendered table pages
  crop_results/              page_N_table_I.png crops (annotated/ with --annotate)
  ocr_results/               OCR responses per crop (reused unless --overwrite-ocr)
  md_results/                Markdown table per crop

ENVIRONMENT VARIABLES:
  UPSTAGE_API_KEY         Upstage key for Document Parse and OCR
  OPENAI_API_KEY          Key for the chat model endpoint
  TABLE2MD_LLM_BASE_URL   OpenAI-compatible base URL (Ollama, vLLM, LiteLLM)
  TABLE2MD_PROVIDER       Provider when no key or base URL is set (anthropic, ollama, ...)
  TABLE2MD_MODEL          Chat model ID
  TABLE2MD_PASSWORD       PDF user password
  TABLE2MD_PDFIUM_LIB     Path to libpdfium
  RUST_LOG                Overrides the log filter
"#;

/// Extract tables from PDFs as Markdown via Document Parse, OCR and a chat model.
#[derive(Parser, Debug)]
#[command(
    name = "table2md",
    version,
    about = "Extract tables from PDFs as Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    opts: GlobalOpts,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the PDF to Document Parse and save output/parsed_result.json.
    Parse {
        /// PDF file; defaults to the first PDF in input/.
        pdf: Option<PathBuf>,
    },
    /// Render the pages that hold tables to pages/.
    Pages {
        /// PDF file; defaults to the first PDF in input/.
        pdf: Option<PathBuf>,
    },
    /// Crop every table out of the rendered pages.
    Crop,
    /// OCR every crop in crop_results/.
    Ocr,
    /// Turn every OCR result into a Markdown table.
    Markdown,
    /// Run parse, pages, crop, ocr and markdown in sequence.
    Run {
        /// PDF file; defaults to the first PDF in input/.
        pdf: Option<PathBuf>,
    },
    /// Print the reconstructed "left || right" rows of one OCR response.
    Rows {
        /// OCR JSON file, e.g. ocr_results/page_9_table_1.json.
        ocr_json: PathBuf,
    },
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// Workspace root holding input/, output/, pages/, … directories.
    #[arg(long, global = true, env = "TABLE2MD_ROOT", default_value = ".")]
    root: PathBuf,

    /// Upstage API key.
    #[arg(long, global = true, env = "UPSTAGE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Key for the chat model endpoint.
    #[arg(long, global = true, env = "OPENAI_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// OpenAI-compatible base URL of the chat model.
    #[arg(long, global = true, env = "TABLE2MD_LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// Provider for the chat model when no key or base URL is given
    /// (openai, anthropic, gemini, ollama, lmstudio, openrouter, ...).
    #[arg(long, global = true, env = "TABLE2MD_PROVIDER")]
    provider: Option<String>,

    /// Chat model ID.
    #[arg(long, global = true, env = "TABLE2MD_MODEL")]
    model: Option<String>,

    /// Maximum vertical distance (OCR pixels) from the row anchor.
    #[arg(long, global = true, env = "TABLE2MD_Y_THRESHOLD", default_value_t = 6.0)]
    y_threshold: f64,

    /// Words whose centre x is left of this go to the first column.
    #[arg(long, global = true, env = "TABLE2MD_X_SPLIT", default_value_t = 80.0)]
    x_split: f64,

    /// Row anchor: the first word of a row, or the previously joined word.
    #[arg(long, global = true, env = "TABLE2MD_ROW_ANCHOR", value_enum, default_value = "first")]
    row_anchor: AnchorArg,

    /// Rendering DPI (36–400).
    #[arg(long, global = true, env = "TABLE2MD_DPI", default_value_t = 72,
          value_parser = clap::value_parser!(u32).range(36..=400))]
    dpi: u32,

    /// Page selection among table pages: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, global = true, env = "TABLE2MD_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "TABLE2MD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Path to libpdfium.
    #[arg(long, global = true, env = "TABLE2MD_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Also write pages with table boxes outlined to crop_results/annotated/.
    #[arg(long, global = true, env = "TABLE2MD_ANNOTATE")]
    annotate: bool,

    /// Number of concurrent OCR / model calls.
    #[arg(short, long, global = true, env = "TABLE2MD_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Pause after each OCR call, in milliseconds.
    #[arg(long, global = true, env = "TABLE2MD_REQUEST_DELAY_MS", default_value_t = 0)]
    request_delay_ms: u64,

    /// Call OCR again even when a cached response exists.
    #[arg(long, global = true, env = "TABLE2MD_OVERWRITE_OCR")]
    overwrite_ocr: bool,

    /// Path to a text file with a custom prompt; `{rows}` marks the rows.
    #[arg(long, global = true, env = "TABLE2MD_PROMPT")]
    prompt: Option<PathBuf>,

    /// Max model output tokens per table.
    #[arg(long, global = true, env = "TABLE2MD_MAX_TOKENS", default_value_t = 512)]
    max_tokens: usize,

    /// Model temperature (0.0–2.0).
    #[arg(long, global = true, env = "TABLE2MD_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per table on model failure.
    #[arg(long, global = true, env = "TABLE2MD_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, global = true, env = "TABLE2MD_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Print the stage summary as JSON on stdout.
    #[arg(long, global = true, env = "TABLE2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "TABLE2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "TABLE2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "TABLE2MD_QUIET")]
    quiet: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AnchorArg {
    First,
    Previous,
}

impl From<AnchorArg> for RowAnchor {
    fn from(v: AnchorArg) -> Self {
        match v {
            AnchorArg::First => RowAnchor::First,
            AnchorArg::Previous => RowAnchor::Previous,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let opts = &cli.opts;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let is_rows = matches!(cli.command, Command::Rows { .. });
    let show_progress = !opts.quiet && !opts.no_progress && !opts.json && !is_rows;
    let filter = if opts.verbose {
        "debug"
    } else if opts.quiet || show_progress {
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        opts,
        progress.clone().map(|cb| cb as ProgressCallback),
    )
    .await?;

    let outcome = dispatch(&cli.command, &config, opts).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }
    outcome
}

async fn dispatch(command: &Command, config: &PipelineConfig, opts: &GlobalOpts) -> Result<()> {
    let layout = &config.layout;
    match command {
        Command::Parse { pdf } => {
            layout.ensure_dirs().context("Failed to create workspace")?;
            let pdf = input_pdf(pdf.as_deref(), config)?;
            let doc = parse_document(&pdf, config)
                .await
                .context("Document Parse failed")?;
            let regions = doc.table_regions();
            report(opts, &regions, || {
                format!(
                    "{} tables on pages {:?}  →  {}",
                    regions.len(),
                    doc.table_pages(),
                    bold(&layout.parsed_result().display().to_string())
                )
            })
        }
        Command::Pages { pdf } => {
            let pdf = input_pdf(pdf.as_deref(), config)?;
            let doc = load_parsed_document(layout)?;
            let summary = render_table_pages(&pdf, &doc, config)
                .await
                .context("Rendering failed")?;
            report(opts, &summary, || {
                format!(
                    "{} pages rendered in {}ms  →  {}",
                    summary.pages.len(),
                    summary.duration_ms,
                    bold(&layout.pages_dir().display().to_string())
                )
            })
        }
        Command::Crop => {
            let summary = crop_from_workspace(config).await.context("Cropping failed")?;
            report(opts, &summary, || {
                format!(
                    "{}/{} tables cropped  →  {}",
                    summary.succeeded(),
                    summary.tables.len(),
                    bold(&layout.crops_dir().display().to_string())
                )
            })
        }
        Command::Ocr => {
            let summary = ocr_crops(config).await.context("OCR failed")?;
            report(opts, &summary, || {
                format!(
                    "{}/{} crops OCR'd ({} cached) in {}ms  →  {}",
                    summary.succeeded(),
                    summary.results.len(),
                    summary.cached(),
                    summary.duration_ms,
                    bold(&layout.ocr_dir().display().to_string())
                )
            })
        }
        Command::Markdown => {
            let summary = render_markdown(config)
                .await
                .context("Markdown rendering failed")?;
            report(opts, &summary, || {
                format!(
                    "{}/{} tables  {}  →  {}",
                    summary.succeeded(),
                    summary.tables.len(),
                    dim(&format!(
                        "{} tokens in / {} tokens out",
                        summary.total_input_tokens, summary.total_output_tokens
                    )),
                    bold(&layout.markdown_dir().display().to_string())
                )
            })
        }
        Command::Run { pdf } => {
            let pdf = input_pdf(pdf.as_deref(), config)?;
            let summary = run_pipeline(&pdf, config).await.context("Pipeline failed")?;
            report(opts, &summary, || {
                format!(
                    "{}/{} tables  {}ms  →  {}",
                    summary.markdown.succeeded(),
                    summary.table_count,
                    summary.total_duration_ms,
                    bold(&layout.markdown_dir().display().to_string())
                )
            })
        }
        Command::Rows { ocr_json } => {
            let rows = rows_for_ocr_file(ocr_json, &config.reconstruct)
                .with_context(|| format!("Failed to reconstruct rows from {:?}", ocr_json))?;
            if opts.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&rows).context("Failed to serialise rows")?
                );
            } else {
                for row in rows {
                    println!("{row}");
                }
            }
            Ok(())
        }
    }
}

/// Print `value` as JSON on stdout, or the summary line on stderr.
fn report<T: Serialize>(opts: &GlobalOpts, value: &T, line: impl FnOnce() -> String) -> Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(value).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !opts.quiet {
        eprintln!("{}  {}", green("✔"), line());
    }
    Ok(())
}

fn input_pdf(explicit: Option<&Path>, config: &PipelineConfig) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p.to_path_buf()),
        None => find_input_pdf(&config.layout.input_dir())
            .context("No PDF given and none found in the workspace input/ directory"),
    }
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(opts: &GlobalOpts, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let prompt = if let Some(ref path) = opts.prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .root(&opts.root)
        .y_threshold(opts.y_threshold)
        .x_split(opts.x_split)
        .row_anchor(opts.row_anchor.into())
        .dpi(opts.dpi)
        .pages(parse_pages(&opts.pages)?)
        .annotate(opts.annotate)
        .concurrency(opts.concurrency)
        .request_delay_ms(opts.request_delay_ms)
        .overwrite_ocr(opts.overwrite_ocr)
        .max_tokens(opts.max_tokens)
        .temperature(opts.temperature)
        .max_retries(opts.max_retries)
        .request_timeout_secs(opts.timeout);

    if let Some(ref key) = opts.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref name) = opts.provider {
        builder = builder.provider_name(name);
    }
    if let Some(ref key) = opts.llm_api_key {
        builder = builder.llm_api_key(key);
    }
    if let Some(ref url) = opts.llm_base_url {
        builder = builder.llm_base_url(url);
    }
    if let Some(ref model) = opts.model {
        builder = builder.model(model);
    }
    if let Some(ref pwd) = opts.password {
        builder = builder.password(pwd);
    }
    if let Some(ref lib) = opts.pdfium_lib {
        builder = builder.pdfium_lib_path(lib);
    }
    if let Some(prompt) = prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .context(format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
