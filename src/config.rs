//! Run configuration.
//!
//! Everything the pipeline reads from the environment is resolved once, here,
//! into a [`HarvestConfig`] value that is passed down explicitly. Tests build
//! configs through [`HarvestConfig::with_enrichment_from_lookup`] instead of mutating the
//! process environment.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::HarvestError;

/// Environment variable holding the background-removal API token.
pub const TOKEN_VAR: &str = "REPLICATE_API_TOKEN";
pub const API_BASE_VAR: &str = "REPLICATE_API_BASE";
pub const MODEL_VERSION_VAR: &str = "REPLICATE_MODEL_VERSION";

pub const DEFAULT_API_BASE: &str = "https://api.replicate.com/v1";
/// lucataco/remove-bg
pub const DEFAULT_MODEL_VERSION: &str =
    "95fcc2a26d3899cd6c2691c900465aaeff466285a65c14638cc5f36f34befaf1";

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Output table format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Csv,
    Xlsx,
}

impl TableFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }
}

/// How downloaded and processed image files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingScheme {
    #[default]
    SequentialId,
    SanitizedTitle,
}

/// Headless browser scrolling parameters
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// How long to wait for the page root element
    pub root_timeout: Duration,
    /// Pixels scrolled per step
    pub scroll_step_px: u32,
    /// Pause after each scroll so lazy-loaded content can materialize
    pub scroll_pause: Duration,
    /// Hard cap on scroll steps for pages that never stabilize
    pub max_scroll_steps: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            root_timeout: Duration::from_secs(20),
            scroll_step_px: 800,
            scroll_pause: Duration::from_secs(1),
            max_scroll_steps: 30,
        }
    }
}

/// Hosted background-removal model settings
#[derive(Debug, Clone)]
pub struct EnrichSettings {
    pub api_token: String,
    pub api_base: String,
    pub model_version: String,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

/// Configuration for one invocation of the harvester
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Root directory; each collection gets its own subdirectory
    pub output_dir: PathBuf,
    pub format: TableFormat,
    pub naming: NamingScheme,
    /// Append a timestamp to the table filename
    pub timestamped: bool,
    pub download_images: bool,
    /// `None` disables background removal
    pub enrich: Option<EnrichSettings>,
    /// Delay inserted after each image download
    pub download_delay: Duration,
    pub request_timeout: Duration,
    pub browser: BrowserSettings,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("scraped_data"),
            format: TableFormat::default(),
            naming: NamingScheme::default(),
            timestamped: false,
            download_images: true,
            enrich: None,
            download_delay: Duration::from_millis(100),
            request_timeout: Duration::from_secs(30),
            browser: BrowserSettings::default(),
        }
    }
}

impl HarvestConfig {
    /// Resolve enrichment settings from the process environment.
    pub fn with_enrichment_from_env(self) -> Result<Self, HarvestError> {
        self.with_enrichment_from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve enrichment settings through `lookup`.
    ///
    /// A missing or blank token is fatal: enrichment was requested and cannot
    /// run without it.
    pub fn with_enrichment_from_lookup<F>(mut self, lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.enrich = Some(EnrichSettings::from_lookup(lookup)?);
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.browser.scroll_step_px == 0 {
            return Err(HarvestError::InvalidConfig(
                "scroll step must be at least 1px".to_string(),
            ));
        }
        if self.browser.max_scroll_steps == 0 {
            return Err(HarvestError::InvalidConfig(
                "max scroll steps must be at least 1".to_string(),
            ));
        }
        if self.enrich.is_some() && !self.download_images {
            warn!("Background removal needs downloaded images; it will not run with downloads disabled");
        }
        Ok(())
    }
}

impl EnrichSettings {
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HarvestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = lookup(TOKEN_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| HarvestError::MissingCredential {
                name: TOKEN_VAR.to_string(),
            })?;

        let api_base = lookup(API_BASE_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model_version = lookup(MODEL_VERSION_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string());

        Ok(Self {
            api_token,
            api_base,
            model_version,
            poll_interval: Duration::from_secs(1),
            max_polls: 120,
        })
    }
}
