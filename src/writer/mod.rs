//! Tabular output for extracted records.
//!
//! Column order is fixed whatever fields a source fills in. CSV keeps prices
//! raw; XLSX renders them as currency text. An empty record set still
//! produces a header-only file.

use std::path::Path;

use rust_xlsxwriter::Workbook;
use tracing::info;

use crate::config::TableFormat;
use crate::error::HarvestError;
use crate::models::ProductRecord;

pub const COLUMNS: [&str; 7] = ["id", "title", "price", "brand", "retailer", "image_url", "url"];

fn raw_price(price: Option<f64>) -> String {
    // Debug keeps the decimal point for whole numbers (12.0, not 12)
    price.map(|p| format!("{p:?}")).unwrap_or_default()
}

fn currency_price(price: Option<f64>) -> String {
    price.map(|p| format!("${p:.2}")).unwrap_or_default()
}

fn row(record: &ProductRecord, price: String) -> [String; 7] {
    [
        record.id.to_string(),
        record.title.clone(),
        price,
        record.brand.clone().unwrap_or_default(),
        record.retailer.clone().unwrap_or_default(),
        record.image_url.clone().unwrap_or_default(),
        record.url.clone().unwrap_or_default(),
    ]
}

fn write_failed(path: &Path, e: impl std::fmt::Display) -> HarvestError {
    HarvestError::OutputWriteFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

/// Write `records` to `path` in the given format.
pub fn write_table(
    records: &[ProductRecord],
    path: &Path,
    format: TableFormat,
) -> Result<(), HarvestError> {
    match format {
        TableFormat::Csv => write_csv(records, path)?,
        TableFormat::Xlsx => write_xlsx(records, path)?,
    }
    info!("Saved {} records to {}", records.len(), path.display());
    Ok(())
}

fn write_csv(records: &[ProductRecord], path: &Path) -> Result<(), HarvestError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| write_failed(path, e))?;

    writer
        .write_record(COLUMNS)
        .map_err(|e| write_failed(path, e))?;
    for record in records {
        writer
            .write_record(row(record, raw_price(record.price)))
            .map_err(|e| write_failed(path, e))?;
    }

    writer.flush().map_err(|e| write_failed(path, e))
}

fn write_xlsx(records: &[ProductRecord], path: &Path) -> Result<(), HarvestError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (col, name) in COLUMNS.iter().enumerate() {
        sheet
            .write_string(0, col as u16, *name)
            .map_err(|e| write_failed(path, e))?;
    }

    for (idx, record) in records.iter().enumerate() {
        let row_num = (idx + 1) as u32;
        for (col, cell) in row(record, currency_price(record.price)).into_iter().enumerate() {
            sheet
                .write_string(row_num, col as u16, cell)
                .map_err(|e| write_failed(path, e))?;
        }
    }

    workbook.save(path).map_err(|e| write_failed(path, e))
}
