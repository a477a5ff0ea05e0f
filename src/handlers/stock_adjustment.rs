// src/handlers/stock_adjustment.rs
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};

use crate::dtos::stock::*;
use crate::error::AppError;
use crate::handlers::stock_sync::refresh_stock;
use crate::models::stock::StockAdjustment;
use crate::services::invalidation::Entity;
use crate::state::AppState;

const ADJUSTMENT_COLUMNS: &str = "id, sku, quantity, note, created_at";

// GET /stock-adjustments?sku=
#[instrument(skip(state))]
pub async fn list_adjustments(
    State(state): State<AppState>,
    Query(query): Query<StockAdjustmentQuery>,
) -> Result<Json<Vec<StockAdjustment>>, AppError> {
    let adjustments = sqlx::query_as::<_, StockAdjustment>(&format!(
        "SELECT {ADJUSTMENT_COLUMNS} FROM stock_adjustments
         WHERE ($1::TEXT IS NULL OR sku = $1)
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(query.sku.as_deref().filter(|s| !s.is_empty()))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(adjustments))
}

// POST /stock-adjustments
#[instrument(skip(state, req))]
pub async fn create_adjustment(
    State(state): State<AppState>,
    Json(req): Json<CreateStockAdjustmentRequest>,
) -> Result<(StatusCode, Json<StockAdjustmentResponse>), AppError> {
    let sku = req.sku.trim();
    if sku.is_empty() {
        return Err(AppError::validation("SKU is required"));
    }
    if req.quantity == 0 {
        return Err(AppError::validation("Adjustment quantity cannot be zero"));
    }

    let mut tx = state.db_pool.begin().await?;

    let is_bundle: bool = sqlx::query_scalar("SELECT is_bundle FROM products WHERE sku = $1 FOR UPDATE")
        .bind(sku)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Product {sku} not found")))?;
    if is_bundle {
        return Err(AppError::validation("Adjust the bundle's components instead"));
    }

    let adjustment = sqlx::query_as::<_, StockAdjustment>(&format!(
        "INSERT INTO stock_adjustments (sku, quantity, note) VALUES ($1, $2, $3)
         RETURNING {ADJUSTMENT_COLUMNS}"
    ))
    .bind(sku)
    .bind(req.quantity)
    .bind(req.note.as_deref().map(str::trim).filter(|n| !n.is_empty()))
    .fetch_one(&mut *tx)
    .await?;

    refresh_stock(&mut tx, &[sku.to_string()]).await?;
    let stock_quantity: i32 = sqlx::query_scalar("SELECT stock_quantity FROM products WHERE sku = $1")
        .bind(sku)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    state.committed(&[Entity::StockAdjustment]).await;
    info!(sku = %sku, delta = req.quantity, stock_quantity, "Stock adjusted");
    Ok((
        StatusCode::CREATED,
        Json(StockAdjustmentResponse {
            adjustment,
            stock_quantity,
        }),
    ))
}
