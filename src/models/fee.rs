use serde::Serialize;
use sqlx::FromRow;
use chrono::NaiveDate;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlatformFee {
    pub id: i64,
    pub platform: String,
    pub percentage: f64,
    pub flat_fee: f64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShippingService {
    pub id: i64,
    pub courier: String,
    pub service_name: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ShippingRate {
    pub id: i64,
    pub shipping_service_id: i64,
    pub price: f64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PickingFee {
    pub id: i64,
    pub name: String,
    pub fee: f64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProductCost {
    pub id: i64,
    pub sku: String,
    pub unit_cost: f64,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}
