//! Client configuration.

use crate::error::{ApiError, ApiResult};
use std::time::Duration;
use url::Url;

/// Default backend address.
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8787/";
/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_BACKEND_URL: &str = "PDFINK_BACKEND_URL";
pub const ENV_TIMEOUT_SECS: &str = "PDFINK_TIMEOUT_SECS";

/// Where and how to reach the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL; always ends with `/` so endpoints join below it.
    pub base_url: Url,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BACKEND_URL).expect("default backend URL is valid"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: format!("pdfink/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Config pointing at `base_url`, other fields default.
    pub fn new(base_url: &str) -> ApiResult<Self> {
        Ok(Self {
            base_url: normalize_base(Url::parse(base_url)?),
            ..Self::default()
        })
    }

    /// Read overrides from `PDFINK_BACKEND_URL` and `PDFINK_TIMEOUT_SECS`.
    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let mut config = match lookup(ENV_BACKEND_URL) {
            Some(url) => Self::new(&url)?,
            None => Self::default(),
        };
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config.timeout_secs = raw.trim().parse().map_err(|_| {
                ApiError::Config(format!("{} must be a whole number of seconds, got {:?}", ENV_TIMEOUT_SECS, raw))
            })?;
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// URL for `path` below the base, with `segment` appended as an escaped path segment.
    pub fn endpoint(&self, path: &str, segment: Option<&str>) -> ApiResult<Url> {
        let mut url = self.base_url.join(path)?;
        if let Some(segment) = segment {
            url.path_segments_mut()
                .map_err(|_| ApiError::Config(format!("{} cannot be a base URL", self.base_url)))?
                .push(segment);
        }
        Ok(url)
    }
}

fn normalize_base(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
