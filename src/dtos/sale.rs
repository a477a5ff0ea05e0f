use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::services::aggregation::{DateRange, RangePreset};
use crate::services::csv_import::SkippedRow;
use crate::services::profitability::{CostBreakdown, Profitability};

#[derive(Debug, Deserialize)]
pub struct CreateSaleRequest {
    pub sale_date: Option<NaiveDate>, // Defaults to today
    pub platform: String,
    pub sku: String,
    pub listing_title: Option<String>, // Defaults to the product's title
    pub quantity: i32,
    pub total_price: f64,
    #[serde(default)]
    pub promoted: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSaleRequest {
    pub sale_date: Option<NaiveDate>,
    pub platform: Option<String>,
    pub sku: Option<String>,
    pub listing_title: Option<String>,
    pub quantity: Option<i32>,
    pub total_price: Option<f64>,
    pub promoted: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct SaleFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub range: Option<RangePreset>,
    pub platform: Option<String>,
    pub sku: Option<String>,
}

impl SaleFilter {
    /// Explicit dates take precedence over the preset's bounds.
    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        let preset = self.range.map(|r| r.resolve(today)).unwrap_or_default();
        DateRange::new(self.start_date.or(preset.start), self.end_date.or(preset.end))
    }
}

#[derive(Debug, Serialize)]
pub struct ComputeResponse {
    #[serde(flatten)]
    pub costs: CostBreakdown,
    #[serde(flatten)]
    pub profitability: Profitability,
}

#[derive(Debug, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub created_products: u64,
    pub skipped: Vec<SkippedRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dates_override_preset() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let filter = SaleFilter {
            range: Some(RangePreset::ThisMonth),
            end_date: NaiveDate::from_ymd_opt(2024, 5, 10),
            ..SaleFilter::default()
        };
        let range = filter.date_range(today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 5, 10));
        assert_eq!(SaleFilter::default().date_range(today), DateRange::default());
    }
}
