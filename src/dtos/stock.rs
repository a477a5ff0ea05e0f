// src/dtos/stock.rs
use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::models::stock::{StockAdjustment, StockCheck};
use crate::services::stock::Variance;

// ==================== Stock Adjustments ====================

#[derive(Debug, Deserialize)]
pub struct CreateStockAdjustmentRequest {
    pub sku: String,
    pub quantity: i32, // Signed delta
    pub note: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockAdjustmentQuery {
    pub sku: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockAdjustmentResponse {
    pub adjustment: StockAdjustment,
    pub stock_quantity: i32,
}

// ==================== Stock Checks ====================

#[derive(Debug, Deserialize)]
pub struct CreateStockCheckRequest {
    pub name: String,
    pub check_date: Option<NaiveDate>, // Defaults to today
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertStockCheckItemRequest {
    pub sku: String,
    pub counted_quantity: i32,
    pub observed_cost: Option<f64>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockCheckItemView {
    pub id: i64,
    pub sku: String,
    pub listing_title: Option<String>,
    pub counted_quantity: i32,
    pub expected_quantity: i64,
    pub variance: i64,
    pub observed_cost: Option<f64>,
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StockCheckResponse {
    #[serde(flatten)]
    pub check: StockCheck,
    pub items: Vec<StockCheckItemView>,
}

#[derive(Debug, Serialize)]
pub struct CompleteStockCheckResponse {
    #[serde(flatten)]
    pub check: StockCheck,
    pub adjustments: Vec<Variance>,
}
