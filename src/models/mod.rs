//! Data models for scraped products and run accounting

use std::path::PathBuf;

use serde_json::Value;

use crate::error::ItemError;

/// A product listing extracted from a source
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRecord {
    /// 1-based position within the run
    pub id: usize,
    pub title: String,
    /// Lowest observed price, if the source exposes one
    pub price: Option<f64>,
    pub image_url: Option<String>,
    pub url: Option<String>,
    pub brand: Option<String>,
    pub retailer: Option<String>,
}

impl ProductRecord {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            title: String::new(),
            price: None,
            image_url: None,
            url: None,
            brand: None,
            retailer: None,
        }
    }
}

/// Raw content as returned by a source fetcher
#[derive(Debug, Clone)]
pub enum RawContent {
    Html(String),
    Json(Value),
}

/// A named scope of products to scrape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    /// Filesystem-safe name used for output paths
    pub name: String,
    /// URL or search term handed to the source adapter
    pub identifier: String,
}

impl Collection {
    /// Derive the collection name from an identifier.
    ///
    /// URLs use their last non-empty path segment, anything else the term
    /// itself.
    pub fn from_identifier(identifier: &str) -> Self {
        let identifier = identifier.trim();
        let raw_name = match url::Url::parse(identifier) {
            Ok(parsed) if parsed.has_host() => parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
                .map(|s| s.to_string())
                .unwrap_or_else(|| parsed.host_str().unwrap_or_default().to_string()),
            _ => identifier.to_string(),
        };

        Self {
            name: sanitize_name(&raw_name),
            identifier: identifier.to_string(),
        }
    }
}

fn sanitize_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' => Some(c),
            ' ' => Some('-'),
            _ => None,
        })
        .collect();

    if name.is_empty() {
        "collection".to_string()
    } else {
        name
    }
}

/// Aggregate counters for one run. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    pub downloaded: usize,
    pub download_failed: usize,
    pub enriched: usize,
    pub enrich_failed: usize,
}

impl RunResult {
    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::NoImage => {}
            ItemOutcome::DownloadFailed(_) => self.download_failed += 1,
            ItemOutcome::Downloaded { .. } => self.downloaded += 1,
            ItemOutcome::Enriched { .. } => {
                self.downloaded += 1;
                self.enriched += 1;
            }
            ItemOutcome::EnrichFailed { .. } => {
                self.downloaded += 1;
                self.enrich_failed += 1;
            }
        }
    }

    pub fn download_attempts(&self) -> usize {
        self.downloaded + self.download_failed
    }

    pub fn enrich_attempts(&self) -> usize {
        self.enriched + self.enrich_failed
    }
}

/// What happened to one record after extraction
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// The record had no image URL; nothing was attempted
    NoImage,
    DownloadFailed(ItemError),
    /// Downloaded with enrichment disabled
    Downloaded { original: PathBuf },
    Enriched { original: PathBuf, processed: PathBuf },
    EnrichFailed { original: PathBuf, error: ItemError },
}

/// Everything the driver knows after a run over one collection
#[derive(Debug, Clone)]
pub struct RunReport {
    pub collection: String,
    pub table_path: PathBuf,
    pub total_records: usize,
    pub records_with_image: usize,
    pub result: RunResult,
    /// One entry per record, in record order
    pub outcomes: Vec<(usize, ItemOutcome)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_from_url_uses_last_segment() {
        let c = Collection::from_identifier("https://www.shopstyle.com/browse/men/gucci/");
        assert_eq!(c.name, "gucci");
        assert_eq!(c.identifier, "https://www.shopstyle.com/browse/men/gucci/");
    }

    #[test]
    fn collection_name_from_term_is_sanitized() {
        let c = Collection::from_identifier("  gifts for dad! ");
        assert_eq!(c.name, "gifts-for-dad");
        assert_eq!(c.identifier, "gifts for dad!");
    }

    #[test]
    fn collection_name_never_empty() {
        assert_eq!(Collection::from_identifier("???").name, "collection");
    }

    #[test]
    fn counters_follow_outcomes() {
        let mut result = RunResult::default();
        let failure = ItemError::HttpStatus {
            url: "u".into(),
            status: 404,
        };

        result.record(&ItemOutcome::NoImage);
        result.record(&ItemOutcome::DownloadFailed(failure.clone()));
        result.record(&ItemOutcome::Enriched {
            original: "a.jpg".into(),
            processed: "a.png".into(),
        });
        result.record(&ItemOutcome::EnrichFailed {
            original: "b.jpg".into(),
            error: failure,
        });

        assert_eq!(
            result,
            RunResult {
                downloaded: 2,
                download_failed: 1,
                enriched: 1,
                enrich_failed: 1,
            }
        );
        assert_eq!(result.download_attempts(), 3);
        assert_eq!(result.enrich_attempts(), result.downloaded);
    }
}
