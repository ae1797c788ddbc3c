//! Error types for a harvest run.
//!
//! [`HarvestError`] aborts the run for a collection (nothing was fetched, the
//! table could not be written, a credential is missing). [`ItemError`] is
//! scoped to a single record: it is logged, counted and the driver moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors. Returned as `Err(HarvestError)` from the driver and startup code.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// A required credential is absent from the environment.
    #[error("{name} is not set\nAdd it to your environment or .env file, or pass --no-enrich.")]
    MissingCredential { name: String },

    /// Raw content for the collection could not be retrieved.
    #[error("Failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The headless browser could not be launched or driven.
    #[error("Browser error: {0}")]
    Browser(String),

    /// A configured CSS selector does not parse.
    #[error("Failed to parse selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    /// The category list file is missing or malformed.
    #[error("Failed to load categories from '{path}': {reason}")]
    CategoriesUnreadable { path: PathBuf, reason: String },

    /// Interactive input ended or could not be read.
    #[error("Failed to read input: {0}")]
    Input(String),

    /// Output directory or table could not be written.
    #[error("Failed to write '{path}': {reason}")]
    OutputWriteFailed { path: PathBuf, reason: String },

    /// Configuration value out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A non-fatal error for one record's download or enrichment.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ItemError {
    /// The URL could not be parsed or resolved against the source origin.
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The local input image is missing or not a file.
    #[error("invalid input '{path}': {reason}")]
    InvalidInput { path: PathBuf, reason: String },

    /// The server answered with a non-2xx status.
    #[error("HTTP {status} for '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// Connection, timeout or body read failure.
    #[error("request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    /// The background-removal service reported an error.
    #[error("background removal service error: {0}")]
    Service(String),

    /// The downloaded image could not be decoded or re-encoded.
    #[error("image conversion failed for '{path}': {reason}")]
    ImageConversion { path: PathBuf, reason: String },

    /// Writing the result to disk failed.
    #[error("failed to write '{path}': {reason}")]
    Write { path: PathBuf, reason: String },
}

impl ItemError {
    /// Short tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::InvalidInput { .. } => "invalid_input",
            Self::HttpStatus { .. } => "http_status",
            Self::Transport { .. } => "transport",
            Self::Service(_) => "service",
            Self::ImageConversion { .. } => "image_conversion",
            Self::Write { .. } => "write",
        }
    }

    pub(crate) fn transport(url: &str, err: &reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}
