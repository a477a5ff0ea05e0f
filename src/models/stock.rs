use serde::Serialize;
use sqlx::FromRow;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StockAdjustment {
    pub id: i64,
    pub sku: String,
    pub quantity: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StockCheck {
    pub id: i64,
    pub name: String,
    pub check_date: NaiveDate,
    pub notes: Option<String>,
    pub completed: bool,
    pub created_at: Option<DateTime<Utc>>,
}
