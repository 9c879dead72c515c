use std::future::Future;
use std::time::Duration;

use phonix_core::SheetPayload;
use reqwest::{header::ACCEPT, Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::{Config, SourceKind};
use crate::gviz::{sheet_url, unwrap_response, GvizError};

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) ",
    "AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
);
const PROXY_FALLBACK_MESSAGE: &str = "فشل في تحميل البيانات من جدول جوجل";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Request failed with status code {status}: {message}")]
    Status { status: u16, message: String },
    #[error(transparent)]
    Unwrap(#[from] GvizError),
    #[error("Invalid table payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Somewhere a record table can be fetched from.
pub trait TableSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<SheetPayload, FetchError>> + Send;
}

fn build_client(timeout: Duration) -> Result<Client, FetchError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?)
}

/// Reads the published sheet's query endpoint directly.
#[derive(Debug, Clone)]
pub struct UpstreamSource {
    client: Client,
    url: String,
}

impl UpstreamSource {
    pub fn new(
        sheet_id: &str,
        sheet_name: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        Self::with_url(sheet_url(sheet_id, sheet_name)?.to_string(), timeout)
    }

    pub fn with_url(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self { client: build_client(timeout)?, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The unwrapped JSON payload, as served by the proxy route.
    pub async fn fetch_raw(&self) -> Result<Value, FetchError> {
        tracing::debug!(url = %self.url, "fetching sheet");
        let resp = self.client.get(&self.url).header(ACCEPT, "*/*").send().await?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("error").to_string(),
            });
        }

        let text = resp.text().await?;
        Ok(unwrap_response(&text)?)
    }
}

impl TableSource for UpstreamSource {
    async fn fetch(&self) -> Result<SheetPayload, FetchError> {
        let value = self.fetch_raw().await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProxyErrorBody {
    error: Option<String>,
    details: Option<String>,
}

/// Reads already-unwrapped JSON from a proxy such as `/api/google-sheets`.
#[derive(Debug, Clone)]
pub struct ProxySource {
    client: Client,
    url: String,
}

impl ProxySource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Ok(Self { client: build_client(timeout)?, url: url.into() })
    }
}

impl TableSource for ProxySource {
    async fn fetch(&self) -> Result<SheetPayload, FetchError> {
        tracing::debug!(url = %self.url, "fetching sheet through proxy");
        let resp = self.client.get(&self.url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(proxy_failure(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn proxy_failure(status: StatusCode, body: &str) -> FetchError {
    let body: ProxyErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = body
        .details
        .filter(|d| !d.is_empty())
        .or(body.error.filter(|e| !e.is_empty()))
        .unwrap_or_else(|| PROXY_FALLBACK_MESSAGE.to_string());
    FetchError::Status { status: status.as_u16(), message }
}

/// The source chosen by configuration.
#[derive(Debug, Clone)]
pub enum HttpTableSource {
    Upstream(UpstreamSource),
    Proxy(ProxySource),
}

impl HttpTableSource {
    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        let timeout = config.fetch_timeout();
        Ok(match config.source {
            SourceKind::Upstream => Self::Upstream(UpstreamSource::new(
                &config.sheet_id,
                config.sheet_name.as_deref(),
                timeout,
            )?),
            SourceKind::Proxy => {
                Self::Proxy(ProxySource::new(config.proxy_url.clone(), timeout)?)
            }
        })
    }
}

impl TableSource for HttpTableSource {
    async fn fetch(&self) -> Result<SheetPayload, FetchError> {
        match self {
            Self::Upstream(source) => source.fetch().await,
            Self::Proxy(source) => source.fetch().await,
        }
    }
}
