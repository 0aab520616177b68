//! Status subcommand - report stage completion without touching the network

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use papercrawl_arxiv::{IdRange, StatusReport};
use papercrawl_core::SharedProgress;

use crate::config::Config;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Output directory to inspect
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub from: i64,

    #[arg(long)]
    pub to: i64,

    #[arg(long)]
    pub year: u16,

    #[arg(long)]
    pub month: u8,

    /// List every incomplete identifier
    #[arg(short, long)]
    pub list: bool,
}

pub fn run(args: StatusArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let range = IdRange::new(args.from, args.to, args.year, args.month)?;
    let root = args.out.unwrap_or_else(|| config.output.dir.clone());

    let report = papercrawl_arxiv::scan_status(&root, &range)
        .with_context(|| format!("Failed to scan {}", root.display()))?;

    if progress.is_tty() {
        eprintln!("{}", report.format_table());
        if args.list {
            eprintln!("{}", incomplete_table(&report));
        }
    } else {
        report.log();
        if args.list {
            for unit in report.incomplete() {
                log::info!("  {}: {}", unit.id, unit.state);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn incomplete_table(report: &StatusReport) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Identifier").fg(Color::Cyan),
            Cell::new("State").fg(Color::Cyan),
        ]);
    for unit in report.incomplete() {
        let state = Cell::new(unit.state.to_string());
        let state = if unit.state.is_failed() {
            state.fg(Color::Red)
        } else {
            state
        };
        table.add_row(vec![Cell::new(unit.id.canonical()), state]);
    }
    format!("\n{table}")
}
