//! Tres Colori storefront search (hosted Shopify search service)

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use crate::error::HarvestError;
use crate::fetch::JsonFetcher;
use crate::models::{Collection, ProductRecord, RawContent};
use crate::scrapers::{min_price, non_empty_str};
use crate::traits::{ScraperConfig, SourceAdapter, is_url, normalize_scheme};

const COLLECTION_URL_PATTERN: &str = "https://svc-1000-usf.hotyon.com/search?q=&apiKey=20524fb1-c9b3-44ff-a4ff-ac7a0af066cf&country=US&locale=en&getProductDescription=0&collection={query}&skip=0&take=100";

/// Scraper implementation for trescolori.com collections
pub struct TresColoriScraper {
    fetcher: JsonFetcher,
    config: ScraperConfig,
}

impl TresColoriScraper {
    pub fn new(client: Client) -> Self {
        let config = ScraperConfig {
            name: "Tres Colori".to_string(),
            base_url: "https://trescolori.com".to_string(),
            search_url_pattern: COLLECTION_URL_PATTERN.to_string(),
            selectors: None,
        };

        Self {
            fetcher: JsonFetcher::new(client),
            config,
        }
    }

    /// Map a search response (`data.items[]`) to records.
    ///
    /// The price is the cheapest variant; the image is the first one listed.
    pub fn extract_items(&self, value: &Value) -> Vec<ProductRecord> {
        let Some(items) = value.pointer("/data/items").and_then(Value::as_array) else {
            return Vec::new();
        };

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let mut record = ProductRecord::new(idx + 1);
                record.title = non_empty_str(&item["title"]).unwrap_or_default();
                record.price = item["variants"]
                    .as_array()
                    .and_then(|variants| min_price(variants.iter().map(|v| &v["price"])));
                record.image_url = item["images"]
                    .as_array()
                    .and_then(|images| images.first())
                    .and_then(|image| non_empty_str(&image["url"]))
                    .map(|u| normalize_scheme(&u));
                record.url = non_empty_str(&item["urlName"])
                    .map(|handle| format!("{}/products/{}", self.config.base_url, handle));
                record
            })
            .collect()
    }
}

/// Split a comma-joined identifier list.
///
/// A comma inside a URL (its query string) stays part of that URL; only a
/// following piece that is itself a URL starts a new entry.
fn split_collections(identifier: &str) -> Vec<String> {
    let mut parts: Vec<String> = Vec::new();

    for piece in identifier.split(',') {
        match parts.last_mut() {
            Some(last) if is_url(last) && !is_url(piece.trim()) => {
                last.push(',');
                last.push_str(piece);
            }
            _ => parts.push(piece.trim().to_string()),
        }
    }

    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

#[async_trait]
impl SourceAdapter for TresColoriScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Several collections may be joined with commas; their items are merged in order.
    fn collection_urls(&self, collection: &Collection) -> Vec<String> {
        split_collections(&collection.identifier)
            .into_iter()
            .map(|part| {
                if is_url(&part) {
                    part
                } else {
                    self.build_search_url(&part)
                }
            })
            .collect()
    }

    async fn fetch(&self, collection: &Collection) -> Result<RawContent, HarvestError> {
        let urls = self.collection_urls(collection);
        info!(
            "Fetching {} collection page(s) for {} on {}",
            urls.len(),
            collection.name,
            self.config.name
        );

        let bodies = self.fetcher.get_all(&urls).await?;
        let items: Vec<Value> = bodies
            .iter()
            .filter_map(|body| body.pointer("/data/items").and_then(Value::as_array))
            .flatten()
            .cloned()
            .collect();

        Ok(RawContent::Json(json!({ "data": { "items": items } })))
    }

    fn extract(&self, raw: &RawContent) -> Vec<ProductRecord> {
        match raw {
            RawContent::Json(value) => self.extract_items(value),
            RawContent::Html(_) => Vec::new(),
        }
    }
}
