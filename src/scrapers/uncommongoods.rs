//! Uncommon Goods internal search endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::info;

use crate::error::HarvestError;
use crate::fetch::JsonFetcher;
use crate::models::{Collection, ProductRecord, RawContent};
use crate::scrapers::{min_price, non_empty_str};
use crate::traits::{ScraperConfig, SourceAdapter, normalize_scheme};

const SEARCH_URL_PATTERN: &str = "https://www.uncommongoods.com/br/search/?account_id=5343&auth_key=&domain_key=uncommongoods&request_type=search&search_type=keyword&fl=pid%2Ctitle%2Cthumb_image%2Curl%2Cprice_range&q={query}&rows=120&start=0&sort=seven_day_sales%20desc";

/// Scraper implementation for uncommongoods.com search results
pub struct UncommonGoodsScraper {
    fetcher: JsonFetcher,
    config: ScraperConfig,
}

impl UncommonGoodsScraper {
    pub fn new(client: Client) -> Self {
        let config = ScraperConfig {
            name: "Uncommon Goods".to_string(),
            base_url: "https://www.uncommongoods.com".to_string(),
            search_url_pattern: SEARCH_URL_PATTERN.to_string(),
            selectors: None,
        };

        Self {
            fetcher: JsonFetcher::new(client),
            config,
        }
    }
}

/// Map a search response (`response.docs[]`) to records.
///
/// Missing keys never abort: title defaults to empty, price to zero.
pub fn extract_docs(value: &Value) -> Vec<ProductRecord> {
    let Some(docs) = value.pointer("/response/docs").and_then(Value::as_array) else {
        return Vec::new();
    };

    docs.iter()
        .enumerate()
        .map(|(idx, doc)| {
            let mut record = ProductRecord::new(idx + 1);
            record.title = non_empty_str(&doc["title"]).unwrap_or_default();
            record.price = Some(
                doc["price_range"]
                    .as_array()
                    .and_then(|range| min_price(range))
                    .unwrap_or(0.0),
            );
            record.image_url = non_empty_str(&doc["thumb_image"]).map(|u| normalize_scheme(&u));
            record.url = non_empty_str(&doc["url"]);
            record
        })
        .collect()
}

#[async_trait]
impl SourceAdapter for UncommonGoodsScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn fetch(&self, collection: &Collection) -> Result<RawContent, HarvestError> {
        info!("Searching for '{}' on {}", collection.identifier, self.config.name);

        let url = self
            .collection_urls(collection)
            .into_iter()
            .next()
            .unwrap_or_default();
        let value = self.fetcher.get_json(&url).await?;
        Ok(RawContent::Json(value))
    }

    fn extract(&self, raw: &RawContent) -> Vec<ProductRecord> {
        match raw {
            RawContent::Json(value) => extract_docs(value),
            RawContent::Html(_) => Vec::new(),
        }
    }
}
