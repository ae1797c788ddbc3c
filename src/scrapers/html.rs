//! Selector-driven extraction of product cells from rendered HTML

use scraper::{ElementRef, Html, Selector};

use crate::error::HarvestError;
use crate::models::ProductRecord;
use crate::scrapers::parse_price_text;
use crate::traits::{SiteSelectors, normalize_scheme, parse_selector};

/// [`SiteSelectors`] parsed once, up front
#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub product: Selector,
    pub title: Selector,
    pub price: Selector,
    pub image: Selector,
    pub brand: Option<Selector>,
    pub retailer: Option<Selector>,
    pub link: Option<Selector>,
}

impl CompiledSelectors {
    pub fn compile(selectors: &SiteSelectors) -> Result<Self, HarvestError> {
        let optional = |s: &Option<String>| s.as_deref().map(parse_selector).transpose();

        Ok(Self {
            product: parse_selector(&selectors.product_container)?,
            title: parse_selector(&selectors.title)?,
            price: parse_selector(&selectors.price)?,
            image: parse_selector(&selectors.image)?,
            brand: optional(&selectors.brand)?,
            retailer: optional(&selectors.retailer)?,
            link: optional(&selectors.link)?,
        })
    }
}

fn first_text(cell: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    cell.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

fn first_attr(cell: &ElementRef<'_>, selector: &Selector, attrs: &[&str]) -> Option<String> {
    let element = cell.select(selector).next()?;
    attrs
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(normalize_scheme)
}

/// Extract one record per product cell, in document order.
///
/// Each field is best-effort. A cell where nothing matched is dropped; ids
/// are assigned to emitted records only, starting at 1. `keep_image` filters
/// image sources (lazy-load placeholders and the like).
pub fn extract_cells(
    html: &str,
    selectors: &CompiledSelectors,
    keep_image: impl Fn(&str) -> bool,
) -> Vec<ProductRecord> {
    let document = Html::parse_document(html);
    let mut records = Vec::new();

    for cell in document.select(&selectors.product) {
        let mut record = ProductRecord::new(records.len() + 1);
        let title = first_text(&cell, &selectors.title);
        let price_text = first_text(&cell, &selectors.price);

        record.image_url = first_attr(&cell, &selectors.image, &["src", "data-src"])
            .filter(|src| keep_image(src));
        record.brand = selectors
            .brand
            .as_ref()
            .and_then(|sel| first_text(&cell, sel));
        record.retailer = selectors
            .retailer
            .as_ref()
            .and_then(|sel| first_text(&cell, sel));
        record.url = selectors
            .link
            .as_ref()
            .and_then(|sel| first_attr(&cell, sel, &["href"]));
        record.price = price_text.as_deref().and_then(parse_price_text);

        let found_any = title.is_some()
            || price_text.is_some()
            || record.image_url.is_some()
            || record.brand.is_some()
            || record.retailer.is_some()
            || record.url.is_some();
        if !found_any {
            continue;
        }

        record.title = title.unwrap_or_default();
        records.push(record);
    }

    records
}
