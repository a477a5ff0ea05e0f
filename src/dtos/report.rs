// src/dtos/report.rs
use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::dtos::sale::SaleFilter;
use crate::services::aggregation::{DateRange, RangePreset, Totals};

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    #[default]
    Quantity,
    Profit,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub range: Option<RangePreset>,
    pub platform: Option<String>,
    pub sku: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub by: Ranking,
}

impl ReportQuery {
    pub fn filter(&self) -> SaleFilter {
        SaleFilter {
            start_date: self.start_date,
            end_date: self.end_date,
            range: self.range,
            platform: self.platform.clone(),
            sku: self.sku.clone(),
        }
    }

    // Cache key for the report view.
    pub fn cache_key(&self, report: &str, today: NaiveDate) -> String {
        let range = self.filter().date_range(today);
        format!(
            "{report}|{:?}|{:?}|{}|{}|{:?}|{:?}",
            range.start,
            range.end,
            self.platform.as_deref().unwrap_or(""),
            self.sku.as_deref().unwrap_or(""),
            self.limit,
            self.by,
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TotalsResponse {
    pub sale_count: i64,
    pub quantity: i64,
    pub revenue: f64,
    pub gross_profit: f64,
    pub profit_margin: f64,
}

impl From<Totals> for TotalsResponse {
    fn from(t: Totals) -> Self {
        Self {
            sale_count: t.sale_count,
            quantity: t.quantity,
            revenue: t.revenue,
            gross_profit: t.profit,
            profit_margin: t.margin(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub range: DateRange,
    #[serde(flatten)]
    pub totals: TotalsResponse,
    pub best_product: Option<ProductRanking>, // Highest gross profit
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub totals: TotalsResponse,
}

#[derive(Debug, Serialize)]
pub struct ProductRanking {
    pub sku: String,
    pub listing_title: String,
    #[serde(flatten)]
    pub totals: TotalsResponse,
}

#[derive(Debug, Serialize)]
pub struct PlatformBreakdown {
    pub platform: String,
    #[serde(flatten)]
    pub totals: TotalsResponse,
}
