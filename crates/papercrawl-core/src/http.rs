//! Shared blocking-facade HTTP client.
//!
//! Uses async reqwest on a shared tokio runtime with a per-chunk read
//! timeout for stall detection, but presents a sync interface: the crawl
//! loop is strictly sequential.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, OnceLock};
use std::time::Duration;

use futures_util::StreamExt;

use crate::error::StageError;

/// HTTP settings, installed once at startup via [`set_http_config`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    /// Max gap between body chunks before the transfer counts as stalled
    pub read_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            user_agent: concat!("papercrawl/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

static HTTP_CONFIG: OnceLock<HttpConfig> = OnceLock::new();

/// Install HTTP settings. Later calls are ignored (first one wins).
pub fn set_http_config(config: HttpConfig) {
    if HTTP_CONFIG.set(config).is_err() {
        log::debug!("HTTP config already set, ignoring");
    }
}

/// Current HTTP settings (defaults if never set).
fn http_config() -> &'static HttpConfig {
    HTTP_CONFIG.get_or_init(HttpConfig::default)
}

/// Shared async HTTP client with connection pooling.
static SHARED_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    let config = http_config();
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

fn http_client() -> &'static reqwest::Client {
    &SHARED_CLIENT
}

/// Shared tokio runtime for HTTP operations.
static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Classify a transport-level reqwest error (no usable status code).
pub fn classify_reqwest(e: &reqwest::Error, context: &str) -> StageError {
    if let Some(status) = e.status() {
        return StageError::from_status(status.as_u16(), None, context);
    }
    if e.is_decode() {
        return StageError::Malformed(format!("{context}: {e}"));
    }
    // Timeouts, refused connections, resets, truncated bodies
    StageError::Transient(format!("{context}: {e}"))
}

/// Parse a `Retry-After` header given in seconds.
fn retry_after(resp: &reqwest::Response) -> Option<Duration> {
    resp.headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

async fn send(
    url: &str,
    headers: &[(&str, &str)],
    context: &str,
) -> Result<reqwest::Response, StageError> {
    let mut request = http_client().get(url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    request
        .send()
        .await
        .map_err(|e| classify_reqwest(&e, context))
}

fn check_status(resp: reqwest::Response, context: &str) -> Result<reqwest::Response, StageError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(StageError::from_status(
            status.as_u16(),
            retry_after(&resp),
            context,
        ))
    }
}

async fn read_text(resp: reqwest::Response, context: &str) -> Result<String, StageError> {
    let read_timeout = http_config().read_timeout;
    match tokio::time::timeout(read_timeout, resp.text()).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(classify_reqwest(&e, context)),
        Err(_) => Err(StageError::Transient(format!(
            "{context}: read timeout ({}s)",
            read_timeout.as_secs()
        ))),
    }
}

/// GET `url` and return the body as text.
pub fn get_text(url: &str, context: &str) -> Result<String, StageError> {
    SHARED_RUNTIME.handle().block_on(async {
        let resp = check_status(send(url, &[], context).await?, context)?;
        read_text(resp, context).await
    })
}

/// GET `url` with extra request headers and return the body text, or `None`
/// when the server answers 404.
pub fn get_text_optional(
    url: &str,
    headers: &[(&str, &str)],
    context: &str,
) -> Result<Option<String>, StageError> {
    SHARED_RUNTIME.handle().block_on(async {
        let resp = send(url, headers, context).await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = check_status(resp, context)?;
        read_text(resp, context).await.map(Some)
    })
}

/// Partial-download path next to `dest`.
pub fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    dest.with_file_name(name)
}

/// Stream `url` into `dest` via a `.tmp` sibling, renamed on completion.
///
/// An empty body counts as a transient failure: a zero-byte artifact must
/// never land at the final path. Returns bytes written.
pub fn download_to_file(url: &str, dest: &Path, context: &str) -> Result<u64, StageError> {
    let tmp = tmp_path(dest);
    let read_timeout = http_config().read_timeout;

    let result = SHARED_RUNTIME.handle().block_on(async {
        let resp = check_status(send(url, &[], context).await?, context)?;
        let mut file = fs::File::create(&tmp)?;
        let mut stream = resp.bytes_stream();
        let mut written = 0u64;
        loop {
            match tokio::time::timeout(read_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    file.write_all(&chunk)?;
                    written += chunk.len() as u64;
                }
                Ok(Some(Err(e))) => return Err(classify_reqwest(&e, context)),
                Ok(None) => break,
                Err(_) => {
                    return Err(StageError::Transient(format!(
                        "{context}: read timeout ({}s with no data)",
                        read_timeout.as_secs()
                    )));
                }
            }
        }
        file.sync_all()?;
        Ok::<u64, StageError>(written)
    });

    match result {
        Ok(0) => {
            let _ = fs::remove_file(&tmp);
            Err(StageError::Transient(format!("{context}: empty response body")))
        }
        Ok(written) => {
            fs::rename(&tmp, dest)?;
            Ok(written)
        }
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_path_appends_suffix() {
        let p = tmp_path(Path::new("/out/202510-00001/tex/202510-00001v1.tar.gz"));
        assert_eq!(
            p,
            PathBuf::from("/out/202510-00001/tex/202510-00001v1.tar.gz.tmp")
        );
    }

    #[test]
    fn default_config_has_user_agent() {
        let config = HttpConfig::default();
        assert!(config.user_agent.starts_with("papercrawl/"));
        assert!(config.read_timeout > Duration::ZERO);
    }
}
