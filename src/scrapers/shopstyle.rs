//! ShopStyle browse pages, rendered in a headless browser

use async_trait::async_trait;
use tracing::info;

use crate::config::BrowserSettings;
use crate::error::HarvestError;
use crate::fetch::browser::{DriverLauncher, render_page};
use crate::models::{Collection, ProductRecord, RawContent};
use crate::scrapers::html::{CompiledSelectors, extract_cells};
use crate::traits::{ScraperConfig, SiteSelectors, SourceAdapter};

/// Scraper implementation for ShopStyle brand and category pages
pub struct ShopStyleScraper {
    config: ScraperConfig,
    selectors: CompiledSelectors,
    browser: BrowserSettings,
    launcher: Box<dyn DriverLauncher>,
}

impl ShopStyleScraper {
    pub fn new(
        browser: BrowserSettings,
        launcher: Box<dyn DriverLauncher>,
    ) -> Result<Self, HarvestError> {
        let site_selectors = SiteSelectors {
            page_root: "web-root".to_string(),
            product_container: "web-product-cell-r".to_string(),
            title: r#"span[data-test="product-cell__product-name"]"#.to_string(),
            price: r#"span[data-test="product-cell__price"]"#.to_string(),
            brand: Some("span.ss-t-text-ellipsis.ss-w-full".to_string()),
            retailer: Some(r#"span[data-test="product-cell__retailer-link"]"#.to_string()),
            link: Some("a".to_string()),
            image: "img.product-cell__image".to_string(),
        };
        let selectors = CompiledSelectors::compile(&site_selectors)?;

        let config = ScraperConfig {
            name: "ShopStyle".to_string(),
            base_url: "https://www.shopstyle.com".to_string(),
            search_url_pattern: "https://www.shopstyle.com/browse?fts={query}".to_string(),
            selectors: Some(site_selectors),
        };

        Ok(Self {
            config,
            selectors,
            browser,
            launcher,
        })
    }

    fn page_root(&self) -> &str {
        self.config
            .selectors
            .as_ref()
            .map_or("body", |s| s.page_root.as_str())
    }
}

#[async_trait]
impl SourceAdapter for ShopStyleScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn fetch(&self, collection: &Collection) -> Result<RawContent, HarvestError> {
        let url = self
            .collection_urls(collection)
            .into_iter()
            .next()
            .unwrap_or_default();
        info!("Scraping {} on {}", collection.name, self.config.name);

        let mut driver = self.launcher.launch().await?;
        let html = render_page(driver.as_mut(), &url, self.page_root(), &self.browser).await?;
        Ok(RawContent::Html(html))
    }

    fn extract(&self, raw: &RawContent) -> Vec<ProductRecord> {
        match raw {
            // Lazy-loaded cells carry a placeholder until the real JPEG arrives
            RawContent::Html(html) => extract_cells(html, &self.selectors, |src| src.ends_with(".jpg")),
            RawContent::Json(_) => Vec::new(),
        }
    }
}
