//! Retry-failed subcommand - re-run identifiers from the failure ledger

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;
use papercrawl_core::SharedProgress;

use super::RunArgs;
use crate::config::Config;

#[derive(Args, Debug)]
pub struct RetryArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

pub fn run(args: RetryArgs, config: &Config, progress: &SharedProgress) -> Result<ExitCode> {
    let crawl = config.crawl_config(&args.run.overrides())?;
    let stats = papercrawl_arxiv::retry_failed(&crawl, progress.clone())?;
    Ok(super::finish(&stats, progress))
}
