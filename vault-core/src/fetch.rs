use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, ORIGIN};
use reqwest::{redirect, Client, ClientBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::asset::{AssetUrl, CachedAsset};
use crate::config::FetchConfig;
use crate::error::AssetError;

/// Network side of the vault: one GET per asset.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &AssetUrl) -> Result<CachedAsset, AssetError>;
}

pub fn build_client(config: &FetchConfig) -> Result<Client, AssetError> {
    let client = ClientBuilder::new()
        .redirect(redirect::Policy::limited(config.max_redirects))
        .user_agent(config.user_agent.clone())
        .build()?;
    Ok(client)
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(client: Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    async fn fetch_once(&self, url: &Url) -> Result<CachedAsset, AssetError> {
        let mut request = self
            .client
            .get(url.clone())
            .timeout(self.config.request_timeout());
        if let Some(origin) = &self.config.origin {
            request = request.header(ORIGIN, origin.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetError::Conversion(e.to_string()))?;

        Ok(CachedAsset::new(bytes, content_type))
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &AssetUrl) -> Result<CachedAsset, AssetError> {
        let parsed = Url::parse(url.as_str())
            .map_err(|e| AssetError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AssetError::InvalidUrl(format!(
                "{url}: unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let mut attempt = 0u8;
        loop {
            match self.fetch_once(&parsed).await {
                Ok(asset) => {
                    debug!(url = %url, bytes = asset.len(), "fetched asset");
                    return Ok(asset);
                }
                Err(err) if err.is_transient() && attempt < self.config.retry_attempts => {
                    attempt += 1;
                    warn!(url = %url, error = %err, attempt, "asset fetch failed, retrying");
                    let backoff = self.config.retry_backoff() * u32::from(attempt);
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
