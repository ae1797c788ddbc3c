//! Image downloads and request pacing

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::ItemError;

/// Downloads a record's primary image to local storage
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Fetch `image_url` and write the body verbatim to `dest`.
    async fn download(&self, image_url: &str, dest: &Path) -> Result<(), ItemError>;
}

/// Resolve absolute, scheme-relative and relative image URLs against the source origin.
pub fn resolve_image_url(base: &Url, image_url: &str) -> Result<Url, ItemError> {
    base.join(image_url.trim()).map_err(|e| ItemError::InvalidUrl {
        url: image_url.to_string(),
        reason: e.to_string(),
    })
}

/// Plain HTTP GET downloader
pub struct HttpDownloader {
    client: Client,
    base_url: Url,
}

impl HttpDownloader {
    pub fn new(client: Client, base_url: &str) -> Result<Self, ItemError> {
        let base_url = Url::parse(base_url).map_err(|e| ItemError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl ImageDownloader for HttpDownloader {
    async fn download(&self, image_url: &str, dest: &Path) -> Result<(), ItemError> {
        let url = resolve_image_url(&self.base_url, image_url)?;
        let url_str = url.as_str().to_string();
        debug!("Downloading {}", url_str);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ItemError::transport(&url_str, &e))?;

        if !response.status().is_success() {
            return Err(ItemError::HttpStatus {
                url: url_str,
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ItemError::transport(&url_str, &e))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| ItemError::Write {
                path: dest.to_path_buf(),
                reason: e.to_string(),
            })
    }
}

/// Delay policy applied after each download attempt
pub trait Pacing: Send {
    fn next_delay(&mut self) -> Duration;
}

/// Constant pause between requests
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl Pacing for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.0
    }
}

/// No pause at all
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Pacing for NoDelay {
    fn next_delay(&mut self) -> Duration {
        Duration::ZERO
    }
}
