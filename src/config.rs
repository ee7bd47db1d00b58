//! Configuration for talking to the document service.
//!
//! Everything the HTTP client and the artifact store need lives in
//! [`ClientConfig`], built via its [`ClientConfigBuilder`]. The builder
//! clamps obviously wrong values and `build()` rejects the rest, so a
//! constructed config is always usable.

use crate::error::WorkflowError;
use std::path::PathBuf;

/// Default service address used when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for a workflow client.
///
/// # Example
/// ```rust
/// use suprimento_client::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .base_url("https://suprimento.example.org/api")
///     .request_timeout_secs(20)
///     .download_dir("out")
///     .build()
///     .unwrap();
/// assert_eq!(config.base_url, "https://suprimento.example.org/api");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the document service, without a trailing slash.
    pub base_url: String,

    /// Timeout for the generation and download calls, in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for the upload call, in seconds. Default: 300.
    ///
    /// The server extracts text and runs OCR on scanned pages before it
    /// answers, which can take minutes on long case files.
    pub upload_timeout_secs: u64,

    /// Directory generated documents are saved into. Default: current directory.
    pub download_dir: PathBuf,

    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 30,
            upload_timeout_secs: 300,
            download_dir: PathBuf::from("."),
            user_agent: concat!("suprimento-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Join `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim().trim_end_matches('/').to_string();
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.config.user_agent = ua.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, WorkflowError> {
        let c = &self.config;
        if !is_http_url(&c.base_url) {
            return Err(WorkflowError::InvalidConfig(format!(
                "API URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.download_dir.as_os_str().is_empty() {
            return Err(WorkflowError::InvalidConfig(
                "Download directory must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Check if the input string looks like an HTTP(S) URL with a host part.
pub fn is_http_url(input: &str) -> bool {
    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"));
    matches!(rest, Some(host) if !host.is_empty())
}
