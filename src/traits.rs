//! Traits and interfaces for site-agnostic harvesting

use async_trait::async_trait;
use scraper::Selector;

use crate::error::HarvestError;
use crate::models::{Collection, ProductRecord, RawContent};

/// Configuration for a source adapter
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Display name for the website
    pub name: String,
    /// Origin that relative image URLs are resolved against
    pub base_url: String,
    /// Search/collection URL pattern with {query} placeholder
    pub search_url_pattern: String,
    /// CSS selectors, for HTML sources
    pub selectors: Option<SiteSelectors>,
}

/// CSS selectors for different parts of a product listing
#[derive(Debug, Clone)]
pub struct SiteSelectors {
    /// Element that must be attached before scrolling starts
    pub page_root: String,
    /// Container selector for individual products
    pub product_container: String,
    /// Title/name selector within product container
    pub title: String,
    /// Price selector within product container
    pub price: String,
    /// Brand selector within product container (optional)
    pub brand: Option<String>,
    /// Retailer selector within product container (optional)
    pub retailer: Option<String>,
    /// Product link selector within product container (optional)
    pub link: Option<String>,
    /// Image selector within product container
    pub image: String,
}

/// Trait for site-specific source adapters.
///
/// An adapter pairs a fetcher (network or browser I/O) with a pure extractor.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Get the configuration for this adapter
    fn config(&self) -> &ScraperConfig;

    /// Retrieve raw content for a collection
    ///
    /// # Returns
    /// * `Result<RawContent, HarvestError>` - HTML or JSON, or `FetchFailed`
    async fn fetch(&self, collection: &Collection) -> Result<RawContent, HarvestError>;

    /// Map raw content to records in source order.
    ///
    /// Never fails: content without recognizable products yields an empty vector.
    fn extract(&self, raw: &RawContent) -> Vec<ProductRecord>;

    /// Process a search term to create the search URL
    ///
    /// # Arguments
    /// * `search_term` - The term to search for
    ///
    /// # Returns
    /// * `String` - The complete search URL
    fn build_search_url(&self, search_term: &str) -> String {
        let encoded_term = urlencoding::encode(search_term);
        self.config().search_url_pattern.replace("{query}", &encoded_term)
    }

    /// URLs to fetch for a collection. Identifiers that are already URLs pass through.
    fn collection_urls(&self, collection: &Collection) -> Vec<String> {
        if is_url(&collection.identifier) {
            vec![collection.identifier.clone()]
        } else {
            vec![self.build_search_url(&collection.identifier)]
        }
    }
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Parse a configured selector, mapping failures to [`HarvestError::InvalidSelector`].
pub fn parse_selector(selector: &str) -> Result<Selector, HarvestError> {
    Selector::parse(selector).map_err(|e| HarvestError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

/// Normalize a scheme-relative URL (`//cdn...`) to https.
pub fn normalize_scheme(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}
