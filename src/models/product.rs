use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};

use crate::services::stock;

pub const DEFAULT_LOW_STOCK_THRESHOLD: i32 = 20;

// Stored as TEXT; NULL or unrecognised values read back as no status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatStatus {
    Standard,
    Reduced,
    Zero,
    Exempt,
}

impl VatStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VatStatus::Standard => "standard",
            VatStatus::Reduced => "reduced",
            VatStatus::Zero => "zero",
            VatStatus::Exempt => "exempt",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(VatStatus::Standard),
            "reduced" => Some(VatStatus::Reduced),
            "zero" => Some(VatStatus::Zero),
            "exempt" => Some(VatStatus::Exempt),
            _ => None,
        }
    }

    pub fn from_db(value: Option<&str>) -> Option<Self> {
        value.and_then(Self::parse)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Product {
    pub sku: String,
    pub listing_title: String,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub initial_stock: i32,
    pub initial_stock_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub warehouse_location: Option<String>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub shipping_service_id: Option<i64>,
    pub picking_fee_name: Option<String>,
    pub vat_status: Option<String>,
    pub promoted_listing_percentage: Option<f64>,
    pub is_bundle: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Sum of the cost components that are set.
    pub fn unit_cost(&self) -> f64 {
        [
            self.product_cost,
            self.packaging_cost,
            self.making_up_cost,
            self.additional_costs,
        ]
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .sum()
    }

    pub fn vat(&self) -> Option<VatStatus> {
        VatStatus::from_db(self.vat_status.as_deref())
    }

    pub fn is_low_stock(&self) -> bool {
        stock::is_low_stock(i64::from(self.stock_quantity), i64::from(self.low_stock_threshold))
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BundleComponent {
    pub bundle_sku: String,
    pub component_sku: String,
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vat_status_parses_case_insensitively() {
        assert_eq!(VatStatus::parse(" Standard "), Some(VatStatus::Standard));
        assert_eq!(VatStatus::parse("EXEMPT"), Some(VatStatus::Exempt));
        assert_eq!(VatStatus::parse("20%"), None);
        assert_eq!(VatStatus::from_db(None), None);
        assert_eq!(VatStatus::from_db(Some("20%")), None);
        assert_eq!(VatStatus::from_db(Some("zero")), Some(VatStatus::Zero));
    }
}
