//! Crawl subcommand - run an identifier range through every stage

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use papercrawl_arxiv::IdRange;
use papercrawl_core::SharedProgress;

use super::RunArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// First sequence number (inclusive)
    #[arg(long)]
    pub from: i64,

    /// Last sequence number (inclusive)
    #[arg(long)]
    pub to: i64,

    /// Submission year (e.g. 2025)
    #[arg(long)]
    pub year: u16,

    /// Submission month (1-12)
    #[arg(long)]
    pub month: u8,

    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run(args: CrawlArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let range = IdRange::new(args.from, args.to, args.year, args.month)?;
    let crawl = config.crawl_config(&args.run.overrides())?;

    let stats = papercrawl_arxiv::run(&crawl, &range, progress.clone())?;
    Ok(super::finish(&stats, progress))
}
