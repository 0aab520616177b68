//! Configuration loading from TOML files

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use papercrawl_arxiv::CrawlConfig;
use papercrawl_arxiv::arxiv_api::DEFAULT_API_BASE;
use papercrawl_arxiv::download::DEFAULT_EPRINT_BASE;
use papercrawl_arxiv::references::DEFAULT_S2_API_BASE;
use papercrawl_core::{ConfigError, ErrorKind, HttpConfig, RetryPolicy};
use serde::Deserialize;

/// Global configuration for papercrawl
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub crawl: CrawlSection,
    pub http: HttpSection,
    pub arxiv: ArxivConfig,
    pub s2: S2Config,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    /// Minimum seconds between outbound requests
    pub interval: f64,
    pub max_attempts: u32,
    /// Seconds to wait after the first failed attempt
    pub retry_delay: f64,
    pub backoff_multiplier: f64,
}

impl Default for CrawlSection {
    fn default() -> Self {
        Self {
            interval: 3.0,
            max_attempts: 3,
            retry_delay: 1.0,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    /// Connect timeout in seconds
    pub connect_timeout: u64,
    /// Read timeout in seconds for stall detection
    pub read_timeout: u64,
    pub user_agent: String,
}

impl Default for HttpSection {
    fn default() -> Self {
        let defaults = HttpConfig::default();
        Self {
            connect_timeout: defaults.connect_timeout.as_secs(),
            read_timeout: defaults.read_timeout.as_secs(),
            user_agent: defaults.user_agent,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivConfig {
    pub api_url: String,
    pub eprint_url: String,
}

impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_BASE.to_string(),
            eprint_url: DEFAULT_EPRINT_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S2Config {
    pub api_url: String,
    #[serde(deserialize_with = "deserialize_env_var")]
    pub api_key: Option<String>,
}

impl Default for S2Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_S2_API_BASE.to_string(),
            api_key: std::env::var("S2_API_KEY").ok(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub interval: Option<f64>,
    pub max_attempts: Option<u32>,
    pub retry_delay: Option<f64>,
    pub backoff_multiplier: Option<f64>,
}

/// Deserialize a string that may contain environment variable reference like ${VAR}
fn deserialize_env_var<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| expand_env_var(&s)))
}

/// Expand ${VAR} to environment variable value
fn expand_env_var(s: &str) -> Option<String> {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).ok()
    } else {
        Some(s.to_string())
    }
}

fn secs(value: f64, what: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| format!("{what} must be a non-negative number of seconds, got {value}"))
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Search order:
    /// 1. ./papercrawl.toml (current directory)
    /// 2. ~/.config/papercrawl/config.toml
    ///
    /// If no config file found, returns default config.
    pub fn load() -> Result<Self> {
        let local_config = PathBuf::from("papercrawl.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "papercrawl") {
            let user_config = config_dir.config_dir().join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.http.connect_timeout),
            read_timeout: Duration::from_secs(self.http.read_timeout),
            user_agent: self.http.user_agent.clone(),
        }
    }

    /// Effective crawl settings: file values with `overrides` applied.
    pub fn crawl_config(&self, overrides: &Overrides) -> Result<CrawlConfig, ConfigError> {
        let interval = overrides.interval.unwrap_or(self.crawl.interval);
        let interval = secs(interval, "interval").map_err(ConfigError::InvalidInterval)?;

        let delay = overrides.retry_delay.unwrap_or(self.crawl.retry_delay);
        let delay = secs(delay, "retry delay").map_err(ConfigError::InvalidRetryPolicy)?;
        let retry = RetryPolicy::new(
            overrides.max_attempts.unwrap_or(self.crawl.max_attempts),
            delay,
            overrides
                .backoff_multiplier
                .unwrap_or(self.crawl.backoff_multiplier),
            ErrorKind::DEFAULT_RETRYABLE,
        )?;

        Ok(CrawlConfig {
            output_dir: overrides
                .output_dir
                .clone()
                .unwrap_or_else(|| self.output.dir.clone()),
            interval,
            retry,
            arxiv_api_base: self.arxiv.api_url.clone(),
            eprint_base: self.arxiv.eprint_url.clone(),
            s2_api_base: self.s2.api_url.clone(),
            s2_api_key: self.s2.api_key.clone(),
        })
    }
}
