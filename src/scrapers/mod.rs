//! Source adapters, one per supported site

pub mod html;
pub mod shopstyle;
pub mod trescolori;
pub mod uncommongoods;

use reqwest::Client;
use serde_json::Value;

use crate::config::BrowserSettings;
use crate::error::HarvestError;
use crate::fetch::browser::ChromeLauncher;
use crate::traits::SourceAdapter;

/// Tag selecting which adapter handles a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    ShopStyle,
    UncommonGoods,
    TresColori,
}

/// Build the adapter for `kind`.
pub fn build_source(
    kind: SourceKind,
    client: Client,
    browser: BrowserSettings,
) -> Result<Box<dyn SourceAdapter>, HarvestError> {
    Ok(match kind {
        SourceKind::ShopStyle => Box::new(shopstyle::ShopStyleScraper::new(
            browser,
            Box::new(ChromeLauncher),
        )?),
        SourceKind::UncommonGoods => Box::new(uncommongoods::UncommonGoodsScraper::new(client)),
        SourceKind::TresColori => Box::new(trescolori::TresColoriScraper::new(client)),
    })
}

/// Parse a displayed price such as `$1,250.00` or `$12 - $18`.
///
/// Returns the lowest number present, `None` when there is none.
pub fn parse_price_text(text: &str) -> Option<f64> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .map(|token| token.replace(',', ""))
        .map(|token| token.trim_matches('.').to_string())
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .reduce(f64::min)
}

/// Read a JSON price that may be a number or a numeric string.
pub fn json_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

/// Minimum of a JSON array of prices, ignoring non-numeric entries.
pub fn min_price<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<f64> {
    values.into_iter().filter_map(json_price).reduce(f64::min)
}

/// A string field, `None` when missing or blank.
pub fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
