// src/handlers/stock_check.rs
use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sqlx::{PgConnection, Row};
use tracing::{info, instrument};

use crate::dtos::stock::*;
use crate::error::AppError;
use crate::handlers::stock_sync::refresh_stock;
use crate::models::stock::StockCheck;
use crate::services::invalidation::Entity;
use crate::services::stock::variances;
use crate::state::AppState;

const CHECK_COLUMNS: &str = "id, name, check_date, notes, completed, created_at";

async fn fetch_check(conn: &mut PgConnection, id: i64, lock: bool) -> Result<StockCheck, AppError> {
    let sql = format!(
        "SELECT {CHECK_COLUMNS} FROM stock_checks WHERE id = $1{}",
        if lock { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, StockCheck>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found("Stock check not found"))
}

// Items with the stock the system currently expects for each SKU.
async fn fetch_items(conn: &mut PgConnection, id: i64) -> Result<Vec<StockCheckItemView>, AppError> {
    let rows = sqlx::query(
        r#"SELECT i.id, i.sku, p.listing_title, i.counted_quantity,
                  COALESCE(p.stock_quantity, 0)::BIGINT AS expected_quantity,
                  (i.observed_cost)::FLOAT8 AS observed_cost, i.location
           FROM stock_check_items i
           LEFT JOIN products p ON p.sku = i.sku
           WHERE i.stock_check_id = $1
           ORDER BY i.sku"#,
    )
    .bind(id)
    .fetch_all(conn)
    .await?;

    rows.into_iter()
        .map(|row| -> Result<StockCheckItemView, AppError> {
            let counted_quantity: i32 = row.try_get("counted_quantity")?;
            let expected_quantity: i64 = row.try_get("expected_quantity")?;
            Ok(StockCheckItemView {
                id: row.try_get("id")?,
                sku: row.try_get("sku")?,
                listing_title: row.try_get("listing_title")?,
                counted_quantity,
                expected_quantity,
                variance: i64::from(counted_quantity) - expected_quantity,
                observed_cost: row.try_get("observed_cost")?,
                location: row.try_get("location")?,
            })
        })
        .collect()
}

// GET /stock-checks
#[instrument(skip(state))]
pub async fn list_checks(State(state): State<AppState>) -> Result<Json<Vec<StockCheck>>, AppError> {
    let checks = sqlx::query_as::<_, StockCheck>(&format!(
        "SELECT {CHECK_COLUMNS} FROM stock_checks ORDER BY check_date DESC, id DESC"
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(checks))
}

// POST /stock-checks
#[instrument(skip(state, req))]
pub async fn create_check(
    State(state): State<AppState>,
    Json(req): Json<CreateStockCheckRequest>,
) -> Result<(StatusCode, Json<StockCheck>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Stock check name is required"));
    }

    let check = sqlx::query_as::<_, StockCheck>(&format!(
        "INSERT INTO stock_checks (name, check_date, notes) VALUES ($1, $2, $3)
         RETURNING {CHECK_COLUMNS}"
    ))
    .bind(name)
    .bind(req.check_date.unwrap_or_else(|| Utc::now().date_naive()))
    .bind(&req.notes)
    .fetch_one(&state.db_pool)
    .await?;

    state.committed(&[Entity::StockCheck]).await;
    info!(id = check.id, "Stock check opened");
    Ok((StatusCode::CREATED, Json(check)))
}

// GET /stock-checks/{id}
#[instrument(skip(state))]
pub async fn get_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StockCheckResponse>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    let check = fetch_check(&mut conn, id, false).await?;
    let items = fetch_items(&mut conn, id).await?;
    Ok(Json(StockCheckResponse { check, items }))
}

// PUT /stock-checks/{id}/items - insert or replace counts by SKU
#[instrument(skip(state, items))]
pub async fn upsert_items(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(items): Json<Vec<UpsertStockCheckItemRequest>>,
) -> Result<Json<StockCheckResponse>, AppError> {
    for item in &items {
        if item.counted_quantity < 0 {
            return Err(AppError::validation(format!("Counted quantity for {} cannot be negative", item.sku)));
        }
        if item.observed_cost.is_some_and(|c| !c.is_finite() || c < 0.0) {
            return Err(AppError::validation(format!("Observed cost for {} must be non-negative", item.sku)));
        }
    }

    let mut tx = state.db_pool.begin().await?;
    let check = fetch_check(&mut tx, id, true).await?;
    if check.completed {
        return Err(AppError::conflict("Stock check is already completed"));
    }

    for item in &items {
        let sku = item.sku.trim();
        let is_bundle: bool = sqlx::query_scalar("SELECT is_bundle FROM products WHERE sku = $1")
            .bind(sku)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Product {sku} not found")))?;
        if is_bundle {
            return Err(AppError::validation(format!("{sku} is a bundle; count its components")));
        }

        sqlx::query(
            "INSERT INTO stock_check_items (stock_check_id, sku, counted_quantity, observed_cost, location)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (stock_check_id, sku) DO UPDATE SET
                counted_quantity = EXCLUDED.counted_quantity,
                observed_cost = EXCLUDED.observed_cost,
                location = EXCLUDED.location",
        )
        .bind(id)
        .bind(sku)
        .bind(item.counted_quantity)
        .bind(item.observed_cost)
        .bind(&item.location)
        .execute(&mut *tx)
        .await?;
    }

    let items = fetch_items(&mut tx, id).await?;
    tx.commit().await?;

    state.committed(&[Entity::StockCheck]).await;
    Ok(Json(StockCheckResponse { check, items }))
}

// POST /stock-checks/{id}/complete - books every variance as an adjustment
#[instrument(skip(state))]
pub async fn complete_check(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CompleteStockCheckResponse>, AppError> {
    let mut tx = state.db_pool.begin().await?;
    let check = fetch_check(&mut tx, id, true).await?;
    if check.completed {
        return Err(AppError::conflict("Stock check is already completed"));
    }

    let items = fetch_items(&mut tx, id).await?;
    let expected: HashMap<String, i64> = items
        .iter()
        .map(|i| (i.sku.clone(), i.expected_quantity))
        .collect();
    let adjustments: Vec<_> = variances(
        items.iter().map(|i| (i.sku.as_str(), i64::from(i.counted_quantity))),
        &expected,
    )
    .into_iter()
    .filter(|v| v.variance != 0)
    .collect();

    let note = format!("Stock check: {}", check.name);
    for v in &adjustments {
        let delta = i32::try_from(v.variance)
            .map_err(|_| AppError::validation(format!("Variance for {} is out of range", v.sku)))?;
        sqlx::query("INSERT INTO stock_adjustments (sku, quantity, note) VALUES ($1, $2, $3)")
            .bind(&v.sku)
            .bind(delta)
            .bind(&note)
            .execute(&mut *tx)
            .await?;
    }

    let check = sqlx::query_as::<_, StockCheck>(&format!(
        "UPDATE stock_checks SET completed = TRUE WHERE id = $1 RETURNING {CHECK_COLUMNS}"
    ))
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    let skus: Vec<String> = adjustments.iter().map(|v| v.sku.clone()).collect();
    refresh_stock(&mut tx, &skus).await?;
    tx.commit().await?;

    state.committed(&[Entity::StockCheck, Entity::StockAdjustment]).await;
    info!(id, adjusted = adjustments.len(), "Stock check completed");
    Ok(Json(CompleteStockCheckResponse { check, adjustments }))
}
