//! CLI binary for briefing-book.
//!
//! A thin shim over the library crate that maps CLI flags onto a
//! `RenderConfig` loaded from YAML and prints results.

use anyhow::{Context, Result};
use briefing_book::{
    append_image_placeholder, discover, export_html, BuildOptions, BuildProgressCallback,
    CancelFlag, ChainResolver, DirectoryResolver, MapResolver, ProgressCallback, RenameStatus,
    RenderConfig, ReorderEngine,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner while discovering, a bar while converting, a spinner again
/// while the external engine runs.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(Self::spinner_style());
        bar.set_prefix("Preparing");
        bar.set_message("Scanning input folder…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS)
    }
}

impl BuildProgressCallback for CliProgressCallback {
    fn on_build_start(&self, documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Assembling {documents} documents…"))
        ));
    }

    fn on_document_converted(&self, index: usize, total: usize, name: &str) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            name
        ));
        self.bar.inc(1);
    }

    fn on_render_start(&self, engine: &str) {
        self.bar.set_style(Self::spinner_style());
        self.bar.set_prefix("Rendering");
        self.bar.set_message(format!("PDF via {engine}…"));
    }

    fn on_fallback(&self, engine: &str, reason: &str) {
        let reason = reason.lines().next().unwrap_or_default();
        let reason = if reason.chars().count() > 80 {
            format!("{}\u{2026}", reason.chars().take(79).collect::<String>())
        } else {
            reason.to_string()
        };
        self.bar.println(format!(
            "  {} primary renderer failed: {}",
            cyan("⚠"),
            dim(&reason)
        ));
        self.bar.set_message(format!("PDF via {engine} (fallback)…"));
    }

    fn on_render_complete(&self, _output: &Path, _sha256: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Write a default config.yaml
  briefbook init

  # Show the build order of the input folder
  briefbook list

  # Build with a classification banner
  briefbook build --classification "CUI"

  # Resolve [[image:NAME]] placeholders from a folder and one explicit file
  briefbook build --images assets/ --image seal=logos/seal.png

  # Skip the primary renderer
  briefbook build --fallback

  # Review the composed HTML in a browser
  briefbook preview book.html

  # Put files in a new order on disk
  briefbook reorder summary.md budget.md annex.md

EXTERNAL TOOLS:
  weasyprint              Primary HTML+CSS → PDF engine
  pandoc + xelatex        Fallback toolchain

ENVIRONMENT VARIABLES:
  BRIEFBOOK_CONFIG        Configuration file (default: config.yaml)
  RUST_LOG                Override log filter (e.g. briefing_book=debug)
"#;

/// Assemble a folder of Markdown files into a PDF briefing book.
#[derive(Parser, Debug)]
#[command(
    name = "briefbook",
    version,
    about = "Assemble a folder of Markdown files into a PDF briefing book",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// YAML configuration file; created with defaults if missing.
    #[arg(long, global = true, env = "BRIEFBOOK_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Output structured JSON instead of text.
    #[arg(long, global = true, env = "BRIEFBOOK_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "BRIEFBOOK_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BRIEFBOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BRIEFBOOK_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a configuration file with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the input documents in build order.
    List,

    /// Build the PDF.
    Build {
        #[command(flatten)]
        overrides: Overrides,

        /// Destination PDF.
        #[arg(short, long, env = "BRIEFBOOK_OUTPUT")]
        output: Option<PathBuf>,

        /// Use the fallback toolchain directly.
        #[arg(long, env = "BRIEFBOOK_FALLBACK")]
        fallback: bool,
    },

    /// Write the composed HTML (stylesheet embedded) without rendering.
    Preview {
        /// Destination HTML file.
        output: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Rename the input documents so they sort in the given order.
    Reorder {
        /// File names in the new order.
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Append an [[image:NAME]] placeholder to a document.
    AddImage {
        /// Markdown document to append to.
        document: PathBuf,
        /// Placeholder name.
        name: String,
    },
}

#[derive(clap::Args, Debug)]
struct Overrides {
    /// Input folder of Markdown documents.
    #[arg(short, long, env = "BRIEFBOOK_INPUT")]
    input: Option<PathBuf>,

    /// Classification marking; an empty string removes the banner.
    #[arg(long, env = "BRIEFBOOK_CLASSIFICATION")]
    classification: Option<String>,

    /// Folder searched for [[image:NAME]] files.
    #[arg(long, env = "BRIEFBOOK_IMAGES")]
    images: Option<PathBuf>,

    /// Explicit NAME=PATH image mapping (repeatable).
    #[arg(long = "image", value_parser = parse_image_mapping)]
    image_map: Vec<(String, PathBuf)>,
}

fn parse_image_mapping(s: &str) -> std::result::Result<(String, PathBuf), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        }
        _ => Err(format!("expected NAME=PATH, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active.
    let is_build = matches!(cli.command, Command::Build { .. });
    let show_progress = is_build && !cli.quiet && !cli.no_progress && !cli.json;
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
        Command::Init { force } => init(&cli, *force),
        Command::List => list(&cli),
        Command::Build {
            overrides,
            output,
            fallback,
        } => run_build(&cli, overrides, output.as_deref(), *fallback, show_progress).await,
        Command::Preview { output, overrides } => preview(&cli, overrides, output).await,
        Command::Reorder { names } => reorder(&cli, names),
        Command::AddImage { document, name } => {
            append_image_placeholder(document, name)
                .with_context(|| format!("Failed to update {}", document.display()))?;
            if !cli.quiet {
                eprintln!("{} appended [[image:{}]] to {}", green("✔"), name, document.display());
            }
            Ok(())
        }
    }
}

fn init(cli: &Cli, force: bool) -> Result<()> {
    if cli.config.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            cli.config.display()
        );
    }
    RenderConfig::default()
        .save(&cli.config)
        .context("Failed to write configuration")?;
    if !cli.quiet {
        eprintln!("{} wrote {}", green("✔"), bold(&cli.config.display().to_string()));
    }
    Ok(())
}

fn load_config(cli: &Cli, overrides: Option<&Overrides>) -> Result<RenderConfig> {
    let mut config = RenderConfig::load(&cli.config).context("Failed to load configuration")?;
    if let Some(o) = overrides {
        if let Some(ref input) = o.input {
            config.input_folder = input.clone();
        }
        if let Some(ref marking) = o.classification {
            config.classification = marking.clone();
        }
    }
    Ok(config)
}

fn build_options(overrides: &Overrides) -> BuildOptions {
    let mut chain = ChainResolver::new();
    if !overrides.image_map.is_empty() {
        let map = overrides
            .image_map
            .iter()
            .fold(MapResolver::new(), |m, (name, path)| m.with_file(name, path));
        chain = chain.then(Arc::new(map));
    }
    if let Some(ref dir) = overrides.images {
        chain = chain.then(Arc::new(DirectoryResolver::new(dir)));
    }
    BuildOptions::new().resolver(Arc::new(chain))
}

fn list(cli: &Cli) -> Result<()> {
    let config = load_config(cli, None)?;
    let set = discover(&config.input_folder).context("Failed to scan input folder")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&set.names()).context("Failed to serialise listing")?
        );
        return Ok(());
    }

    println!("{}", bold(&config.input_folder.display().to_string()));
    for (i, doc) in set.iter().enumerate() {
        let prefix = if doc.has_prefix() {
            doc.order_prefix.to_string()
        } else {
            "-".to_string()
        };
        println!("  {:>3}  {:>6}  {}", i + 1, dim(&prefix), doc.file_name());
    }
    if set.is_empty() {
        println!("  {}", dim("(no Markdown documents)"));
    }
    Ok(())
}

async fn run_build(
    cli: &Cli,
    overrides: &Overrides,
    output: Option<&Path>,
    fallback: bool,
    show_progress: bool,
) -> Result<()> {
    let mut config = load_config(cli, Some(overrides))?;
    if let Some(output) = output {
        config.output_file = output.to_path_buf();
    }
    if fallback {
        config.use_latex_fallback = true;
    }

    let cancel = CancelFlag::new();
    let mut options = build_options(overrides).cancel(cancel.clone());
    if show_progress {
        let cb: ProgressCallback = CliProgressCallback::new();
        options = options.progress(cb);
    }

    // Ctrl-C stops the build at the next stage boundary.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let output = briefing_book::build(&config, &options)
        .await
        .context("Build failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&output).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} documents  {} headings  {}ms  →  {}",
            if output.render.used_fallback {
                cyan("⚠")
            } else {
                green("✔")
            },
            output.documents.len(),
            output.headings,
            output.stats.total_ms,
            bold(&output.render.output_path.display().to_string()),
        );
        eprintln!(
            "   {} {}  via {}",
            dim("sha256"),
            output.render.sha256,
            output.render.engine
        );
    }
    Ok(())
}

async fn preview(cli: &Cli, overrides: &Overrides, output: &Path) -> Result<()> {
    let config = load_config(cli, Some(overrides))?;
    let path = export_html(&config, &build_options(overrides), output)
        .await
        .context("Preview failed")?;
    if !cli.quiet {
        eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
    }
    Ok(())
}

fn reorder(cli: &Cli, names: &[String]) -> Result<()> {
    let config = load_config(cli, None)?;
    let mut engine = ReorderEngine::new(&config.input_folder);
    let report = engine.apply(names).context("Reorder failed")?;

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        for outcome in &report.outcomes {
            let from = outcome
                .from
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let to = outcome
                .to
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &outcome.status {
                RenameStatus::Renamed => println!("  {} {} → {}", green("✓"), from, to),
                RenameStatus::Unchanged => println!("  {} {}", dim("="), dim(&from)),
                RenameStatus::Failed(e) => println!("  {} {}  {}", red("✗"), from, red(&e.to_string())),
            }
        }
        eprintln!(
            "{} renamed, {} unchanged, {} failed",
            report.renamed(),
            report.unchanged(),
            report.failed()
        );
    }

    if !report.is_complete() {
        anyhow::bail!("{} of {} renames failed", report.failed(), report.outcomes.len());
    }
    Ok(())
}
