use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, FromRow)]
pub struct Sale {
    pub id: i64,
    pub sale_date: NaiveDate,
    pub platform: String,
    pub sku: String,
    pub listing_title: String,
    pub quantity: i32,
    pub total_price: f64,
    pub promoted: bool,
    pub verified: bool,
    pub created_at: Option<DateTime<Utc>>,
}

// Sale joined with the product settings the cost resolver needs.
#[derive(Debug, Clone, FromRow)]
pub struct SaleCostRow {
    pub id: i64,
    pub sale_date: NaiveDate,
    pub platform: String,
    pub sku: String,
    pub listing_title: String,
    pub quantity: i32,
    pub total_price: f64,
    pub promoted: bool,
    pub verified: bool,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub vat_status: Option<String>,
    pub promoted_listing_percentage: Option<f64>,
    pub shipping_service_id: Option<i64>,
    pub picking_fee_name: Option<String>,
}
