// src/dtos/fee.rs
use serde::Deserialize;
use chrono::NaiveDate;

#[derive(Debug, Default, Deserialize)]
pub struct FeeHistoryQuery {
    #[serde(default)]
    pub current_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlatformFeeRequest {
    pub platform: String,
    pub percentage: f64,
    #[serde(default)]
    pub flat_fee: f64,
    pub effective_from: Option<NaiveDate>, // Defaults to today
}

#[derive(Debug, Deserialize)]
pub struct CreateShippingServiceRequest {
    pub courier: String,
    pub service_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateShippingRateRequest {
    pub shipping_service_id: i64,
    pub price: f64,
    pub effective_from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePickingFeeRequest {
    pub name: String,
    pub fee: f64,
    pub effective_from: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProductCostRequest {
    pub sku: String,
    pub unit_cost: f64,
    pub effective_from: Option<NaiveDate>,
}
