//! arXiv crawl configuration

use std::path::PathBuf;
use std::time::Duration;

use papercrawl_core::{ConfigError, RateLimiter, RetryPolicy};

use crate::arxiv_api::DEFAULT_API_BASE;
use crate::clean::Cleaner;
use crate::download::{DEFAULT_EPRINT_BASE, Downloader};
use crate::metadata::MetadataWriter;
use crate::orchestrator::{Orchestrator, Pipeline};
use crate::references::{DEFAULT_S2_API_BASE, ReferenceFetcher};

/// Runtime configuration for a crawl
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Root directory holding one sub-directory per paper
    pub output_dir: PathBuf,
    /// Minimum gap between outbound requests (arXiv asks for 3s)
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub arxiv_api_base: String,
    pub eprint_base: String,
    pub s2_api_base: String,
    /// Semantic Scholar API key (higher rate limits)
    pub s2_api_key: Option<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            interval: Duration::from_secs(3),
            retry: RetryPolicy::default(),
            arxiv_api_base: DEFAULT_API_BASE.to_string(),
            eprint_base: DEFAULT_EPRINT_BASE.to_string(),
            s2_api_base: DEFAULT_S2_API_BASE.to_string(),
            s2_api_key: None,
        }
    }
}

impl CrawlConfig {
    /// Real collaborators for every stage.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline {
            download: Box::new(Downloader::new(&self.arxiv_api_base, &self.eprint_base)),
            clean: Box::new(Cleaner),
            metadata: Box::new(MetadataWriter::new(&self.arxiv_api_base)),
            references: Box::new(ReferenceFetcher::new(
                &self.s2_api_base,
                self.s2_api_key.clone(),
            )),
        }
    }

    /// Validate settings and build an orchestrator over `output_dir`.
    pub fn orchestrator(&self) -> Result<Orchestrator<'static>, ConfigError> {
        let limiter = RateLimiter::new(self.interval)?;
        Orchestrator::new(
            self.output_dir.clone(),
            self.pipeline(),
            limiter,
            self.retry.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = CrawlConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.interval, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts(), 3);
        assert!(config.s2_api_key.is_none());
    }

    #[test]
    fn zero_interval_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CrawlConfig {
            output_dir: dir.path().to_path_buf(),
            interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(
            config.orchestrator(),
            Err(ConfigError::InvalidInterval(_))
        ));
    }

    #[test]
    fn orchestrator_creates_root_and_ledger() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = CrawlConfig {
            output_dir: dir.path().join("out"),
            ..Default::default()
        };
        let orchestrator = config.orchestrator().unwrap();
        assert!(orchestrator.root().is_dir());
        assert!(crate::layout::ledger_path(orchestrator.root()).exists());
    }
}
