//! Favicon lookup for saved items.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::time::Duration;
use url::Url;

const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons";

/// A fetched favicon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Favicon {
    /// Base64 encoded image bytes.
    pub image: String,
}

#[async_trait]
pub trait FaviconFetcher: Send + Sync {
    async fn fetch_favicon(&self, url: &str) -> Result<Favicon>;
}

/// Fetches favicons through Google's s2 service.
#[derive(Debug, Clone, Default)]
pub struct HttpFaviconFetcher {
    client: reqwest::Client,
}

impl HttpFaviconFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FaviconFetcher for HttpFaviconFetcher {
    async fn fetch_favicon(&self, url: &str) -> Result<Favicon> {
        let favicon_url = favicon_request_url(url)?;
        let response = self
            .client
            .get(favicon_url)
            .send()
            .await
            .with_context(|| format!("Failed to request favicon for {url}"))?
            .error_for_status()?;
        let bytes = response.bytes().await.context("Failed to read favicon body")?;
        if bytes.is_empty() {
            bail!("Empty favicon for {url}");
        }
        Ok(Favicon {
            image: STANDARD.encode(&bytes),
        })
    }
}

/// The s2 request for `url`, with the item URL query-encoded.
pub fn favicon_request_url(url: &str) -> Result<Url> {
    Url::parse_with_params(FAVICON_SERVICE, &[("domain_url", url), ("sz", "64")])
        .with_context(|| format!("Failed to build favicon request for {url}"))
}

/// Fetcher that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFavicon;

#[async_trait]
impl FaviconFetcher for NoFavicon {
    async fn fetch_favicon(&self, url: &str) -> Result<Favicon> {
        bail!("Favicon lookup disabled for {url}")
    }
}

/// Fetch a favicon, giving up after `timeout`. Failures are logged and
/// yield `None`.
pub async fn fetch_with_timeout(
    fetcher: &dyn FaviconFetcher,
    url: &str,
    timeout: Duration,
) -> Option<String> {
    match tokio::time::timeout(timeout, fetcher.fetch_favicon(url)).await {
        Ok(Ok(favicon)) => Some(favicon.image),
        Ok(Err(e)) => {
            tracing::warn!("Favicon fetch failed: {:#}", e);
            None
        }
        Err(_) => {
            tracing::warn!("Favicon fetch for {} timed out after {:?}", url, timeout);
            None
        }
    }
}
