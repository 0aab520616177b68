//! papercrawl - resumable, rate-limited arXiv crawler
//!
//! Downloads LaTeX sources for a range of arXiv identifiers, strips figures,
//! and collects metadata and references for each paper.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use papercrawl_core::{LogOptions, ProgressContext, SharedProgress};

mod cmd;
mod config;

use config::{Config, Overrides};

/// Exit status for configuration and other fatal errors
const EXIT_FATAL: u8 = 2;

#[derive(Parser)]
#[command(name = "papercrawl")]
#[command(about = "Resumable, rate-limited arXiv crawler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Also append log lines to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Config file path (default: ./papercrawl.toml or ~/.config/papercrawl/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Command {
    /// Crawl an identifier range (resumes from what is on disk)
    Crawl(cmd::crawl::CrawlArgs),
    /// Re-run identifiers recorded in the failure ledger
    RetryFailed(cmd::retry::RetryArgs),
    /// Show per-stage completion for an identifier range
    Status(cmd::status::StatusArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e:#}");
            if !log::log_enabled!(log::Level::Error) {
                eprintln!("Error: {e:#}");
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress: SharedProgress = Arc::new(ProgressContext::new());

    // Logging:
    //   TTY:     warn unless --debug, the progress bar shows activity
    //   non-TTY: info unless --quiet/--debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let opts = LogOptions {
        quiet: cli.quiet || (is_tty && !cli.debug),
        debug: cli.debug,
        log_file: cli.log_file.as_deref(),
    };
    if let Err(e) = papercrawl_core::init_logging(opts, multi) {
        eprintln!("Error: cannot initialize logging: {e}");
        return Ok(ExitCode::from(EXIT_FATAL));
    }

    papercrawl_core::install_signal_handlers().context("Failed to install signal handlers")?;

    let config = if let Some(path) = cli.config {
        Config::from_file(&path)?
    } else {
        Config::load()?
    };

    // Apply HTTP settings (config file defaults, CLI overrides)
    let mut http_config = config.http_config();
    if let Some(secs) = cli.read_timeout {
        http_config.read_timeout = std::time::Duration::from_secs(secs);
    }
    papercrawl_core::set_http_config(http_config);

    match cli.command {
        Command::Crawl(args) => cmd::crawl::run(args, &config, &progress),
        Command::RetryFailed(args) => cmd::retry::run(args, &config, &progress),
        Command::Status(args) => cmd::status::run(args, &config, &progress),
        Command::Config => {
            print_config(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_config(config: &Config) -> Result<()> {
    let crawl = config.crawl_config(&Overrides::default())?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    table.add_row(vec![
        "Output directory",
        &crawl.output_dir.display().to_string(),
    ]);
    table.add_row(vec![
        "Min interval",
        &format!("{:.2}s", crawl.interval.as_secs_f64()),
    ]);
    table.add_row(vec![
        "Retry",
        &format!(
            "{} attempts, {:.1}s x{}",
            crawl.retry.max_attempts(),
            crawl.retry.backoff_duration(1).as_secs_f64(),
            config.crawl.backoff_multiplier
        ),
    ]);
    table.add_row(vec!["arXiv API URL", &crawl.arxiv_api_base]);
    table.add_row(vec!["e-print URL", &crawl.eprint_base]);
    table.add_row(vec!["S2 API URL", &crawl.s2_api_base]);
    table.add_row(vec![
        "S2 API key",
        if crawl.s2_api_key.is_some() {
            "configured"
        } else {
            "not set"
        },
    ]);
    table.add_row(vec![
        "Timeouts",
        &format!(
            "connect {}s, read {}s",
            config.http.connect_timeout, config.http.read_timeout
        ),
    ]);
    table.add_row(vec!["User agent", &config.http.user_agent]);

    eprintln!("\n{table}");
    Ok(())
}
