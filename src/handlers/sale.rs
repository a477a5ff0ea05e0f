// src/handlers/sale.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, instrument, warn};

use crate::dtos::sale::*;
use crate::error::AppError;
use crate::handlers::fee::load_fee_book;
use crate::handlers::stock_sync::{ensure_products, refresh_stock};
use crate::models::sale::{Sale, SaleCostRow};
use crate::services::csv_import;
use crate::services::invalidation::Entity;
use crate::services::profitability::{evaluate, SaleInput, SaleProfitability};
use crate::state::AppState;

const SALE_COLUMNS: &str = "id, sale_date, platform, sku, listing_title, quantity,
    total_price::FLOAT8 AS total_price, promoted, verified, created_at";

const SALE_COST_SELECT: &str = r#"SELECT
    s.id, s.sale_date, s.platform, s.sku, s.listing_title, s.quantity,
    (s.total_price)::FLOAT8 AS total_price, s.promoted, s.verified,
    (p.product_cost)::FLOAT8 AS product_cost,
    (p.packaging_cost)::FLOAT8 AS packaging_cost,
    (p.making_up_cost)::FLOAT8 AS making_up_cost,
    (p.additional_costs)::FLOAT8 AS additional_costs,
    p.vat_status,
    (p.promoted_listing_percentage)::FLOAT8 AS promoted_listing_percentage,
    p.shipping_service_id, p.picking_fee_name
FROM sales s
LEFT JOIN products p ON p.sku = s.sku"#;

// ==================== Shared loaders ====================

/// Sales matching `filter`, priced with the fee history in force on each sale date.
pub async fn load_sales(db_pool: &PgPool, filter: &SaleFilter) -> Result<Vec<SaleProfitability>, AppError> {
    let range = filter.date_range(Utc::now().date_naive());

    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(SALE_COST_SELECT);
    query.push(" WHERE 1=1");
    if let Some(start) = range.start {
        query.push(" AND s.sale_date >= ").push_bind(start);
    }
    if let Some(end) = range.end {
        query.push(" AND s.sale_date <= ").push_bind(end);
    }
    if let Some(platform) = filter.platform.as_deref().filter(|p| !p.is_empty()) {
        query.push(" AND LOWER(s.platform) = LOWER(").push_bind(platform.to_string()).push(")");
    }
    if let Some(sku) = filter.sku.as_deref().filter(|s| !s.is_empty()) {
        query.push(" AND s.sku = ").push_bind(sku.to_string());
    }
    query.push(" ORDER BY s.sale_date DESC, s.id DESC");

    let rows = query.build_query_as::<SaleCostRow>().fetch_all(db_pool).await?;
    let book = load_fee_book(db_pool).await?;
    Ok(rows.iter().map(|row| book.price(row)).collect())
}

async fn fetch_sale_by_id(db_pool: &PgPool, id: i64) -> Result<SaleProfitability, AppError> {
    let row = sqlx::query_as::<_, SaleCostRow>(&format!("{SALE_COST_SELECT} WHERE s.id = $1"))
        .bind(id)
        .fetch_optional(db_pool)
        .await?
        .ok_or_else(|| AppError::not_found("Sale not found"))?;
    let book = load_fee_book(db_pool).await?;
    Ok(book.price(&row))
}

fn validate_line(sku: &str, quantity: i32, total_price: f64) -> Result<(), AppError> {
    if sku.trim().is_empty() {
        return Err(AppError::validation("SKU is required"));
    }
    if quantity <= 0 {
        return Err(AppError::validation("Quantity must be greater than 0"));
    }
    if !total_price.is_finite() {
        return Err(AppError::validation("Total price must be a number"));
    }
    Ok(())
}

// ==================== Queries ====================

#[instrument(skip(state))]
pub async fn list_sales(
    State(state): State<AppState>,
    Query(filter): Query<SaleFilter>,
) -> Result<Json<Vec<SaleProfitability>>, AppError> {
    let sales = load_sales(&state.db_pool, &filter).await?;
    Ok(Json(sales))
}

#[instrument(skip(state))]
pub async fn get_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SaleProfitability>, AppError> {
    fetch_sale_by_id(&state.db_pool, id).await.map(Json)
}

// Pure calculation; touches no stored data.
pub async fn compute_profitability(Json(input): Json<SaleInput>) -> Json<ComputeResponse> {
    let (costs, profitability) = evaluate(&input);
    Json(ComputeResponse { costs, profitability })
}

// ==================== Mutations ====================

#[instrument(skip(state, req))]
pub async fn create_sale(
    State(state): State<AppState>,
    Json(req): Json<CreateSaleRequest>,
) -> Result<(StatusCode, Json<SaleProfitability>), AppError> {
    validate_line(&req.sku, req.quantity, req.total_price)?;
    let sku = req.sku.trim().to_string();
    let platform = req.platform.trim();
    if platform.is_empty() {
        return Err(AppError::validation("Platform is required"));
    }

    let mut tx = state.db_pool.begin().await?;

    // First sale of an unknown SKU creates a placeholder product
    ensure_products(&mut tx, &[(sku.clone(), req.listing_title.clone())]).await?;

    let listing_title = match req.listing_title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => title.to_string(),
        None => sqlx::query_scalar::<_, String>("SELECT listing_title FROM products WHERE sku = $1")
            .bind(&sku)
            .fetch_one(&mut *tx)
            .await?,
    };

    let sale = sqlx::query_as::<_, Sale>(&format!(
        "INSERT INTO sales (sale_date, platform, sku, listing_title, quantity, total_price, promoted)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING {SALE_COLUMNS}"
    ))
    .bind(req.sale_date.unwrap_or_else(|| Utc::now().date_naive()))
    .bind(platform)
    .bind(&sku)
    .bind(&listing_title)
    .bind(req.quantity)
    .bind(req.total_price)
    .bind(req.promoted)
    .fetch_one(&mut *tx)
    .await?;

    refresh_stock(&mut tx, &[sku]).await?;
    tx.commit().await?;

    state.committed(&[Entity::Sale, Entity::Product]).await;
    info!(id = sale.id, sku = %sale.sku, "Sale recorded");
    Ok((StatusCode::CREATED, Json(fetch_sale_by_id(&state.db_pool, sale.id).await?)))
}

#[instrument(skip(state, req))]
pub async fn update_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateSaleRequest>,
) -> Result<Json<SaleProfitability>, AppError> {
    let mut tx = state.db_pool.begin().await?;

    let existing = sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 FOR UPDATE"))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Sale not found"))?;

    let sku = req.sku.as_deref().map(str::trim).unwrap_or(&existing.sku).to_string();
    validate_line(
        &sku,
        req.quantity.unwrap_or(existing.quantity),
        req.total_price.unwrap_or(existing.total_price),
    )?;
    if sku != existing.sku {
        ensure_products(&mut tx, &[(sku.clone(), req.listing_title.clone())]).await?;
    }

    sqlx::query(
        "UPDATE sales SET
         sale_date = COALESCE($2, sale_date),
         platform = COALESCE($3, platform),
         sku = $4,
         listing_title = COALESCE($5, listing_title),
         quantity = COALESCE($6, quantity),
         total_price = COALESCE($7, total_price),
         promoted = COALESCE($8, promoted)
         WHERE id = $1",
    )
    .bind(id)
    .bind(req.sale_date)
    .bind(req.platform.as_deref().map(str::trim))
    .bind(&sku)
    .bind(req.listing_title.as_deref().map(str::trim))
    .bind(req.quantity)
    .bind(req.total_price)
    .bind(req.promoted)
    .execute(&mut *tx)
    .await?;

    let mut touched = vec![existing.sku.clone()];
    if sku != existing.sku {
        touched.push(sku);
    }
    refresh_stock(&mut tx, &touched).await?;
    tx.commit().await?;

    state.committed(&[Entity::Sale]).await;
    fetch_sale_by_id(&state.db_pool, id).await.map(Json)
}

#[instrument(skip(state))]
pub async fn toggle_verified(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SaleProfitability>, AppError> {
    let result = sqlx::query("UPDATE sales SET verified = NOT verified WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Sale not found"));
    }

    state.committed(&[Entity::Sale]).await;
    fetch_sale_by_id(&state.db_pool, id).await.map(Json)
}

#[instrument(skip(state))]
pub async fn delete_sale(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let mut tx = state.db_pool.begin().await?;
    let sku: String = sqlx::query_scalar("DELETE FROM sales WHERE id = $1 RETURNING sku")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Sale not found"))?;

    refresh_stock(&mut tx, &[sku]).await?;
    tx.commit().await?;

    state.committed(&[Entity::Sale]).await;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, req))]
pub async fn bulk_delete_sales(
    State(state): State<AppState>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, AppError> {
    if req.ids.is_empty() {
        return Err(AppError::validation("No sales selected"));
    }

    let mut tx = state.db_pool.begin().await?;
    let mut skus: Vec<String> = sqlx::query_scalar("DELETE FROM sales WHERE id = ANY($1) RETURNING sku")
        .bind(&req.ids)
        .fetch_all(&mut *tx)
        .await?;
    let deleted = skus.len() as u64;
    skus.sort();
    skus.dedup();

    refresh_stock(&mut tx, &skus).await?;
    tx.commit().await?;

    if deleted < req.ids.len() as u64 {
        warn!(requested = req.ids.len(), deleted, "Some sales were already gone");
    }
    state.committed(&[Entity::Sale]).await;
    Ok(Json(BulkDeleteResponse { deleted }))
}

// ==================== CSV Import ====================

#[instrument(skip(state, body))]
pub async fn import_sales(
    State(state): State<AppState>,
    body: String,
) -> Result<(StatusCode, Json<ImportSummary>), AppError> {
    let parsed = csv_import::parse_sales(body.as_bytes(), Utc::now().date_naive())?;
    if parsed.rows.is_empty() {
        return Err(AppError::validation("CSV contains no sale rows"));
    }

    let mut tx = state.db_pool.begin().await?;

    let mut products: Vec<(String, Option<String>)> = parsed
        .rows
        .iter()
        .map(|r| (r.sku.clone(), r.listing_title.clone()))
        .collect();
    products.sort_by(|a, b| a.0.cmp(&b.0));
    products.dedup_by(|a, b| a.0 == b.0);
    let created_products = ensure_products(&mut tx, &products).await?;

    for row in &parsed.rows {
        sqlx::query(
            "INSERT INTO sales (sale_date, platform, sku, listing_title, quantity, total_price, promoted)
             VALUES ($1, $2, $3, COALESCE($4, (SELECT listing_title FROM products WHERE sku = $3)), $5, $6, $7)",
        )
        .bind(row.sale_date)
        .bind(&row.platform)
        .bind(&row.sku)
        .bind(row.listing_title.as_deref())
        .bind(row.quantity)
        .bind(row.total_price)
        .bind(row.promoted)
        .execute(&mut *tx)
        .await?;
    }

    let skus: Vec<String> = products.into_iter().map(|(sku, _)| sku).collect();
    refresh_stock(&mut tx, &skus).await?;
    tx.commit().await?;

    state.committed(&[Entity::Sale, Entity::Product]).await;
    info!(
        imported = parsed.rows.len(),
        created_products,
        skipped = parsed.skipped.len(),
        "Sales CSV imported"
    );

    Ok((
        StatusCode::CREATED,
        Json(ImportSummary {
            imported: parsed.rows.len(),
            created_products,
            skipped: parsed.skipped,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sale_lines_need_sku_and_positive_quantity() {
        assert!(validate_line("MUG-01", 1, 9.99).is_ok());
        assert!(validate_line("  ", 1, 9.99).is_err());
        assert!(validate_line("MUG-01", 0, 9.99).is_err());
        assert!(validate_line("MUG-01", 1, f64::NAN).is_err());
        // Refunds carry a negative price
        assert!(validate_line("MUG-01", 1, -9.99).is_ok());
    }
}
