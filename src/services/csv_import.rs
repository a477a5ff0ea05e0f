// src/services/csv_import.rs
//! Header-driven CSV parsing for sale and product uploads.
//!
//! Column names are matched case-insensitively after trimming. Numeric cells
//! may carry a currency symbol or thousands separators; cells that still do
//! not parse read as zero instead of rejecting the row.

use std::collections::HashMap;
use std::io::Read;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::models::product::VatStatus;

const CURRENCY_SYMBOLS: &[char] = &['£', '$', '€', '¥'];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];

// ==================== Errors ====================

#[derive(Debug, Error)]
pub enum CsvImportError {
    #[error("CSV is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
}

// ==================== Cell parsing ====================

pub fn parse_amount(raw: &str) -> f64 {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn parse_quantity(raw: &str) -> i32 {
    let value = parse_amount(raw).round();
    if value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
        value as i32
    } else {
        0
    }
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "yes" | "y" | "1")
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // Exports often append a time to the date.
    let day = raw.split(['T', ' ']).next().unwrap_or(raw);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

// ==================== Header lookup ====================

struct Columns {
    index: HashMap<String, usize>,
}

impl Columns {
    fn new(headers: &csv::StringRecord) -> Self {
        let index = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();
        Columns { index }
    }

    fn find(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.index.get(*n).copied())
    }

    fn require(&self, label: &'static str, names: &[&str]) -> Result<usize, CsvImportError> {
        self.find(names).ok_or(CsvImportError::MissingColumn(label))
    }
}

fn cell<'r>(record: &'r csv::StringRecord, column: Option<usize>) -> Option<&'r str> {
    column
        .and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

// ==================== Sales ====================

#[derive(Debug, Clone, PartialEq)]
pub struct ImportedSale {
    pub sale_date: NaiveDate,
    pub platform: String,
    pub sku: String,
    pub listing_title: Option<String>,
    pub quantity: i32,
    pub total_price: f64,
    pub promoted: bool,
}

#[derive(Debug, Default)]
pub struct SaleImport {
    pub rows: Vec<ImportedSale>,
    pub skipped: Vec<SkippedRow>,
}

pub fn parse_sales<R: Read>(input: R, default_date: NaiveDate) -> Result<SaleImport, CsvImportError> {
    let mut rdr = reader(input);
    let columns = Columns::new(rdr.headers()?);

    let sku_col = columns.require("SKU", &["sku"])?;
    let quantity = columns.require("Quantity", &["quantity", "qty"])?;
    let total_price = columns.require("Total Price", &["total price", "total"])?;
    let date = columns.find(&["date", "sale date", "order date"]);
    let platform = columns.find(&["platform", "channel", "marketplace"]);
    let title = columns.find(&["listing title", "title", "product name"]);
    let promoted = columns.find(&["promoted"]);

    let mut out = SaleImport::default();
    for (n, record) in rdr.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(n as u64 + 2, |p| p.line());

        let Some(sku) = cell(&record, Some(sku_col)) else {
            out.skipped.push(SkippedRow { line, reason: "missing SKU".to_string() });
            continue;
        };

        out.rows.push(ImportedSale {
            sale_date: cell(&record, date).and_then(parse_date).unwrap_or(default_date),
            platform: cell(&record, platform).unwrap_or("Unknown").to_string(),
            sku: sku.to_string(),
            listing_title: cell(&record, title).map(str::to_string),
            quantity: cell(&record, Some(quantity)).map_or(0, parse_quantity),
            total_price: cell(&record, Some(total_price)).map_or(0.0, parse_amount),
            promoted: cell(&record, promoted).is_some_and(parse_flag),
        });
    }
    Ok(out)
}

// ==================== Products ====================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportedProduct {
    pub sku: String,
    pub listing_title: Option<String>,
    pub stock_quantity: Option<i32>,
    pub low_stock_threshold: Option<i32>,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub supplier: Option<String>,
    pub warehouse_location: Option<String>,
    pub weight_kg: Option<f64>,
    pub vat_status: Option<VatStatus>,
    pub promoted_listing_percentage: Option<f64>,
}

#[derive(Debug, Default)]
pub struct ProductImport {
    pub rows: Vec<ImportedProduct>,
    pub skipped: Vec<SkippedRow>,
}

pub fn parse_products<R: Read>(input: R) -> Result<ProductImport, CsvImportError> {
    let mut rdr = reader(input);
    let columns = Columns::new(rdr.headers()?);

    let sku_col = columns.require("SKU", &["sku"])?;
    let title = columns.find(&["listing title", "title", "product name"]);
    let stock = columns.find(&["stock quantity", "stock", "quantity"]);
    let threshold = columns.find(&["low stock threshold"]);
    let product_cost = columns.find(&["product cost", "cost"]);
    let packaging = columns.find(&["packaging cost"]);
    let making_up = columns.find(&["making up cost", "making-up cost"]);
    let additional = columns.find(&["additional costs", "additional cost"]);
    let supplier = columns.find(&["supplier"]);
    let location = columns.find(&["warehouse location", "location"]);
    let weight = columns.find(&["weight", "weight (kg)"]);
    let vat = columns.find(&["vat status", "vat"]);
    let promoted_pct = columns.find(&["promoted listing percentage", "promoted %"]);

    let mut out = ProductImport::default();
    for (n, record) in rdr.records().enumerate() {
        let record = record?;
        let line = record.position().map_or(n as u64 + 2, |p| p.line());

        let Some(sku) = cell(&record, Some(sku_col)) else {
            out.skipped.push(SkippedRow { line, reason: "missing SKU".to_string() });
            continue;
        };

        let text = |col| cell(&record, col).map(str::to_string);
        let number = |col| cell(&record, col).map(parse_amount);
        let count = |col| cell(&record, col).map(parse_quantity);

        out.rows.push(ImportedProduct {
            sku: sku.to_string(),
            listing_title: text(title),
            stock_quantity: count(stock),
            low_stock_threshold: count(threshold),
            product_cost: number(product_cost),
            packaging_cost: number(packaging),
            making_up_cost: number(making_up),
            additional_costs: number(additional),
            supplier: text(supplier),
            warehouse_location: text(location),
            weight_kg: number(weight),
            vat_status: cell(&record, vat).and_then(VatStatus::parse),
            promoted_listing_percentage: number(promoted_pct),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn currency_symbols_and_separators_are_stripped() {
        assert_eq!(parse_amount("£1,234.50"), 1234.5);
        assert_eq!(parse_amount(" $ 12.00 "), 12.0);
        assert_eq!(parse_amount("€-3.5"), -3.5);
        assert_eq!(parse_amount("n/a"), 0.0);
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_quantity("2.0"), 2);
        assert_eq!(parse_quantity("lots"), 0);
    }

    #[test]
    fn dates_accept_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9);
        assert_eq!(parse_date("2024-03-09"), expected);
        assert_eq!(parse_date("09/03/2024"), expected);
        assert_eq!(parse_date("2024-03-09T14:22:00Z"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn sales_headers_match_case_insensitively() {
        let csv = "\
 sku ,QUANTITY,Total price,Date,Platform,Listing Title,Promoted
MUG-01,2,£19.98,2024-05-02,eBay,Blue mug,yes
MUG-02,1,not-a-number,,Amazon,,no
";
        let parsed = parse_sales(csv.as_bytes(), today()).unwrap();
        assert_eq!(parsed.rows.len(), 2);
        let first = &parsed.rows[0];
        assert_eq!(first.sku, "MUG-01");
        assert_eq!(first.quantity, 2);
        assert!((first.total_price - 19.98).abs() < 1e-9);
        assert_eq!(first.sale_date, NaiveDate::from_ymd_opt(2024, 5, 2).unwrap());
        assert!(first.promoted);
        assert_eq!(first.listing_title.as_deref(), Some("Blue mug"));

        let second = &parsed.rows[1];
        assert_eq!(second.total_price, 0.0);
        assert_eq!(second.sale_date, today());
        assert_eq!(second.listing_title, None);
        assert!(!second.promoted);
    }

    #[test]
    fn rows_without_sku_are_skipped() {
        let csv = "SKU,Quantity,Total Price\n,1,5.00\nA,1,5.00\n";
        let parsed = parse_sales(csv.as_bytes(), today()).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped.len(), 1);
        assert_eq!(parsed.skipped[0].line, 2);
    }

    #[test]
    fn missing_required_column_is_an_error() {
        let csv = "SKU,Quantity\nA,1\n";
        let err = parse_sales(csv.as_bytes(), today()).unwrap_err();
        assert!(matches!(err, CsvImportError::MissingColumn("Total Price")));
        assert_eq!(err.to_string(), "CSV is missing required column 'Total Price'");
    }

    #[test]
    fn product_rows_keep_blank_cells_unset() {
        let csv = "\
SKU,Listing Title,Stock Quantity,Product Cost,Packaging Cost,VAT Status
CUP,Tea cup,12,£2.10,,Zero
";
        let parsed = parse_products(csv.as_bytes()).unwrap();
        let row = &parsed.rows[0];
        assert_eq!(row.stock_quantity, Some(12));
        assert_eq!(row.product_cost, Some(2.1));
        assert_eq!(row.packaging_cost, None);
        assert_eq!(row.vat_status, Some(VatStatus::Zero));
    }
}
