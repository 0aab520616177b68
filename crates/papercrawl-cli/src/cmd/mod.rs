//! Subcommands

pub mod crawl;
pub mod retry;
pub mod status;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use papercrawl_arxiv::RunStats;
use papercrawl_core::SharedProgress;

use crate::config::Overrides;

/// Exit status when a run stopped on SIGINT/SIGTERM
pub const EXIT_INTERRUPTED: u8 = 130;

/// Settings shared by every subcommand that crawls
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Output directory (one sub-directory per paper)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Minimum seconds between outbound requests
    #[arg(short, long)]
    pub interval: Option<f64>,

    /// Maximum attempts per stage for transient failures
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds to wait after the first failed attempt
    #[arg(long)]
    pub retry_delay: Option<f64>,

    /// Backoff multiplier between attempts
    #[arg(long)]
    pub backoff: Option<f64>,
}

impl RunArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            output_dir: self.out.clone(),
            interval: self.interval,
            max_attempts: self.max_attempts,
            retry_delay: self.retry_delay,
            backoff_multiplier: self.backoff,
        }
    }
}

/// Print the run summary and map the outcome to an exit status.
pub fn finish(stats: &RunStats, progress: &SharedProgress) -> ExitCode {
    if progress.is_tty() {
        eprintln!("{}", stats.format_table());
    } else {
        stats.log();
    }
    ExitCode::from(exit_status(stats))
}

fn exit_status(stats: &RunStats) -> u8 {
    if stats.interrupted {
        EXIT_INTERRUPTED
    } else if stats.failed > 0 {
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let mut stats = RunStats::default();
        assert_eq!(exit_status(&stats), 0);
        stats.failed = 1;
        assert_eq!(exit_status(&stats), 1);
        // Interruption wins over failures
        stats.interrupted = true;
        assert_eq!(exit_status(&stats), EXIT_INTERRUPTED);
    }
}
