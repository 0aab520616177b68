//! Papercrawl Core - Common infrastructure for rate-limited paper crawls
//!
//! Error taxonomy, rate limiting, retry policy, shutdown handling,
//! logging/progress plumbing, memory readings and the shared HTTP client.

pub mod error;
pub mod http;
pub mod logging;
pub mod memory;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;

// Re-exports for convenience
pub use error::{ConfigError, ErrorKind, StageError};
pub use http::{HttpConfig, set_http_config};
pub use logging::{IndicatifLogger, LogOptions, init_logging};
pub use memory::peak_rss_kb;
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use rate_limit::RateLimiter;
pub use retry::{RetryFailure, RetryPolicy};
pub use shutdown::{install_signal_handlers, shutdown_flag};
