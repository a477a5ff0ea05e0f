// src/handlers/product.rs
use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use sqlx::PgConnection;
use tracing::{error, info, instrument};

use crate::dtos::product::*;
use crate::error::AppError;
use crate::handlers::stock_sync::{load_components, refresh_bundles, refresh_stock};
use crate::models::product::{BundleComponent, Product, DEFAULT_LOW_STOCK_THRESHOLD};
use crate::services::csv_import::{self, ImportedProduct};
use crate::services::invalidation::Entity;
use crate::state::AppState;

const PRODUCT_COLUMNS: &str = "sku, listing_title, stock_quantity, low_stock_threshold,
    initial_stock, initial_stock_date, supplier, warehouse_location,
    length_cm::FLOAT8 AS length_cm, width_cm::FLOAT8 AS width_cm,
    height_cm::FLOAT8 AS height_cm, weight_kg::FLOAT8 AS weight_kg,
    product_cost::FLOAT8 AS product_cost, packaging_cost::FLOAT8 AS packaging_cost,
    making_up_cost::FLOAT8 AS making_up_cost, additional_costs::FLOAT8 AS additional_costs,
    shipping_service_id, picking_fee_name, vat_status,
    promoted_listing_percentage::FLOAT8 AS promoted_listing_percentage,
    is_bundle, created_at";

const MANUAL_EDIT_NOTE: &str = "Manual stock edit";

async fn fetch_product(conn: &mut PgConnection, sku: &str) -> Result<Product, AppError> {
    sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1"))
        .bind(sku)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Product {sku} not found")))
}

fn check_non_negative(label: &str, value: Option<f64>) -> Result<(), AppError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => {
            Err(AppError::validation(format!("{label} must be a non-negative number")))
        }
        _ => Ok(()),
    }
}

fn validate_costs(
    product_cost: Option<f64>,
    packaging_cost: Option<f64>,
    making_up_cost: Option<f64>,
    additional_costs: Option<f64>,
    promoted_listing_percentage: Option<f64>,
) -> Result<(), AppError> {
    check_non_negative("Product cost", product_cost)?;
    check_non_negative("Packaging cost", packaging_cost)?;
    check_non_negative("Making-up cost", making_up_cost)?;
    check_non_negative("Additional costs", additional_costs)?;
    check_non_negative("Promoted listing percentage", promoted_listing_percentage)?;
    if promoted_listing_percentage.is_some_and(|p| p > 100.0) {
        return Err(AppError::validation("Promoted listing percentage cannot exceed 100"));
    }
    Ok(())
}

/// Records the difference between `target` and the current stock as an adjustment.
async fn adjust_to(
    conn: &mut PgConnection,
    product: &Product,
    target: i32,
    note: &str,
) -> Result<bool, AppError> {
    let delta = i64::from(target) - i64::from(product.stock_quantity);
    if delta == 0 {
        return Ok(false);
    }
    let delta = i32::try_from(delta).map_err(|_| AppError::validation("Stock change is too large"))?;
    sqlx::query("INSERT INTO stock_adjustments (sku, quantity, note) VALUES ($1, $2, $3)")
        .bind(&product.sku)
        .bind(delta)
        .bind(note)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

// ==================== Queries ====================

// GET /products
#[instrument(skip(state))]
pub async fn list_products(State(state): State<AppState>) -> Result<Json<Vec<ProductResponse>>, AppError> {
    match sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY sku"))
        .fetch_all(&state.db_pool)
        .await
    {
        Ok(products) => Ok(Json(products.into_iter().map(ProductResponse::from).collect())),
        Err(e) => {
            error!(?e, "Failed to fetch products");
            Err(e.into())
        }
    }
}

// GET /products/{sku}
#[instrument(skip(state))]
pub async fn get_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<Json<ProductResponse>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    let product = fetch_product(&mut conn, &sku).await?;
    Ok(Json(ProductResponse::from(product)))
}

// GET /products/low-stock
#[instrument(skip(state))]
pub async fn low_stock_products(State(state): State<AppState>) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products
         WHERE stock_quantity <= low_stock_threshold
         ORDER BY stock_quantity, sku"
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

// ==================== Mutations ====================

// POST /products
#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    let sku = payload.sku.trim();
    if sku.is_empty() {
        return Err(AppError::validation("SKU is required"));
    }
    validate_costs(
        payload.product_cost,
        payload.packaging_cost,
        payload.making_up_cost,
        payload.additional_costs,
        payload.promoted_listing_percentage,
    )?;
    if payload.is_bundle && payload.stock_quantity.is_some() {
        return Err(AppError::validation("Bundle stock is derived from its components"));
    }
    let initial_stock = payload.stock_quantity.unwrap_or(0);
    let since = payload.initial_stock_date.unwrap_or_else(|| Utc::now().date_naive());
    let listing_title = payload
        .listing_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(sku);

    let product = sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO products (
            sku, listing_title, stock_quantity, initial_stock, low_stock_threshold,
            supplier, warehouse_location, length_cm, width_cm, height_cm, weight_kg,
            product_cost, packaging_cost, making_up_cost, additional_costs,
            shipping_service_id, picking_fee_name, vat_status, promoted_listing_percentage, is_bundle,
            initial_stock_date)
         VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
         RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(sku)
    .bind(listing_title)
    .bind(initial_stock)
    .bind(payload.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD))
    .bind(&payload.supplier)
    .bind(&payload.warehouse_location)
    .bind(payload.length_cm)
    .bind(payload.width_cm)
    .bind(payload.height_cm)
    .bind(payload.weight_kg)
    .bind(payload.product_cost)
    .bind(payload.packaging_cost)
    .bind(payload.making_up_cost)
    .bind(payload.additional_costs)
    .bind(payload.shipping_service_id)
    .bind(&payload.picking_fee_name)
    .bind(payload.vat_status.map(|v| v.as_str()))
    .bind(payload.promoted_listing_percentage)
    .bind(payload.is_bundle)
    .bind(since)
    .fetch_one(&state.db_pool)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict(format!("Product {sku} already exists")),
        other => other,
    })?;

    state.committed(&[Entity::Product]).await;
    info!(sku = %product.sku, "Product created");
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

// PATCH /products/{sku}
#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    validate_costs(
        payload.product_cost,
        payload.packaging_cost,
        payload.making_up_cost,
        payload.additional_costs,
        payload.promoted_listing_percentage,
    )?;

    if payload.stock_quantity.is_some() && payload.initial_stock.is_some() {
        return Err(AppError::validation(
            "Set either stock_quantity or initial_stock, not both",
        ));
    }
    let rebase_date = payload.rebase_date(Utc::now().date_naive());

    let mut tx = state.db_pool.begin().await?;
    let product = fetch_product(&mut tx, &sku).await?;
    if product.is_bundle && payload.touches_derived_fields() {
        return Err(AppError::validation(
            "Bundle stock and cost are derived from its components",
        ));
    }

    let mut entities = vec![Entity::Product];
    if let Some(target) = payload.stock_quantity {
        if adjust_to(&mut tx, &product, target, MANUAL_EDIT_NOTE).await? {
            entities.push(Entity::StockAdjustment);
        }
    }

    sqlx::query(
        "UPDATE products SET
         listing_title = COALESCE($2, listing_title),
         low_stock_threshold = COALESCE($3, low_stock_threshold),
         supplier = COALESCE($4, supplier),
         warehouse_location = COALESCE($5, warehouse_location),
         length_cm = COALESCE($6, length_cm),
         width_cm = COALESCE($7, width_cm),
         height_cm = COALESCE($8, height_cm),
         weight_kg = COALESCE($9, weight_kg),
         product_cost = COALESCE($10, product_cost),
         packaging_cost = COALESCE($11, packaging_cost),
         making_up_cost = COALESCE($12, making_up_cost),
         additional_costs = COALESCE($13, additional_costs),
         shipping_service_id = COALESCE($14, shipping_service_id),
         picking_fee_name = COALESCE($15, picking_fee_name),
         vat_status = COALESCE($16, vat_status),
         promoted_listing_percentage = COALESCE($17, promoted_listing_percentage),
         initial_stock = COALESCE($18, initial_stock),
         initial_stock_date = COALESCE($19, initial_stock_date)
         WHERE sku = $1",
    )
    .bind(&sku)
    .bind(payload.listing_title.as_deref().map(str::trim).filter(|t| !t.is_empty()))
    .bind(payload.low_stock_threshold)
    .bind(&payload.supplier)
    .bind(&payload.warehouse_location)
    .bind(payload.length_cm)
    .bind(payload.width_cm)
    .bind(payload.height_cm)
    .bind(payload.weight_kg)
    .bind(payload.product_cost)
    .bind(payload.packaging_cost)
    .bind(payload.making_up_cost)
    .bind(payload.additional_costs)
    .bind(payload.shipping_service_id)
    .bind(&payload.picking_fee_name)
    .bind(payload.vat_status.map(|v| v.as_str()))
    .bind(payload.promoted_listing_percentage)
    .bind(payload.initial_stock)
    .bind(rebase_date)
    .execute(&mut *tx)
    .await?;

    refresh_stock(&mut tx, &[sku.clone()]).await?;
    let updated = fetch_product(&mut tx, &sku).await?;
    tx.commit().await?;

    state.committed(&entities).await;
    Ok(Json(ProductResponse::from(updated)))
}

// POST /products/import
#[instrument(skip(state, body))]
pub async fn import_products(
    State(state): State<AppState>,
    body: String,
) -> Result<Json<ProductImportSummary>, AppError> {
    let parsed = csv_import::parse_products(body.as_bytes())?;

    let today = Utc::now().date_naive();
    let mut tx = state.db_pool.begin().await?;
    let mut created = 0;
    let mut updated = 0;
    let mut touched = Vec::with_capacity(parsed.rows.len());

    for row in &parsed.rows {
        let existing = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE sku = $1 FOR UPDATE"
        ))
        .bind(&row.sku)
        .fetch_optional(&mut *tx)
        .await?;

        match existing {
            Some(product) => {
                if !product.is_bundle {
                    if let Some(target) = row.stock_quantity {
                        adjust_to(&mut tx, &product, target, "CSV import").await?;
                    }
                }
                apply_import_row(&mut tx, row).await?;
                updated += 1;
            }
            None => {
                insert_import_row(&mut tx, row, today).await?;
                created += 1;
            }
        }
        touched.push(row.sku.clone());
    }

    refresh_stock(&mut tx, &touched).await?;
    tx.commit().await?;

    state.committed(&[Entity::Product, Entity::StockAdjustment]).await;
    info!(created, updated, skipped = parsed.skipped.len(), "Products CSV imported");
    Ok(Json(ProductImportSummary {
        created,
        updated,
        skipped: parsed.skipped,
    }))
}

async fn insert_import_row(
    conn: &mut PgConnection,
    row: &ImportedProduct,
    since: NaiveDate,
) -> Result<(), AppError> {
    let stock = row.stock_quantity.unwrap_or(0);
    sqlx::query(
        "INSERT INTO products (
            sku, listing_title, stock_quantity, initial_stock, low_stock_threshold,
            product_cost, packaging_cost, making_up_cost, additional_costs,
            supplier, warehouse_location, weight_kg, vat_status, promoted_listing_percentage,
            initial_stock_date)
         VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
    )
    .bind(&row.sku)
    .bind(row.listing_title.as_deref().unwrap_or(&row.sku))
    .bind(stock)
    .bind(row.low_stock_threshold.unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD))
    .bind(row.product_cost)
    .bind(row.packaging_cost)
    .bind(row.making_up_cost)
    .bind(row.additional_costs)
    .bind(&row.supplier)
    .bind(&row.warehouse_location)
    .bind(row.weight_kg)
    .bind(row.vat_status.map(|v| v.as_str()))
    .bind(row.promoted_listing_percentage)
    .bind(since)
    .execute(conn)
    .await?;
    Ok(())
}

async fn apply_import_row(conn: &mut PgConnection, row: &ImportedProduct) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE products SET
         listing_title = COALESCE($2, listing_title),
         low_stock_threshold = COALESCE($3, low_stock_threshold),
         product_cost = CASE WHEN is_bundle THEN product_cost ELSE COALESCE($4, product_cost) END,
         packaging_cost = CASE WHEN is_bundle THEN packaging_cost ELSE COALESCE($5, packaging_cost) END,
         making_up_cost = CASE WHEN is_bundle THEN making_up_cost ELSE COALESCE($6, making_up_cost) END,
         additional_costs = CASE WHEN is_bundle THEN additional_costs ELSE COALESCE($7, additional_costs) END,
         supplier = COALESCE($8, supplier),
         warehouse_location = COALESCE($9, warehouse_location),
         weight_kg = COALESCE($10, weight_kg),
         vat_status = COALESCE($11, vat_status),
         promoted_listing_percentage = COALESCE($12, promoted_listing_percentage)
         WHERE sku = $1",
    )
    .bind(&row.sku)
    .bind(&row.listing_title)
    .bind(row.low_stock_threshold)
    .bind(row.product_cost)
    .bind(row.packaging_cost)
    .bind(row.making_up_cost)
    .bind(row.additional_costs)
    .bind(&row.supplier)
    .bind(&row.warehouse_location)
    .bind(row.weight_kg)
    .bind(row.vat_status.map(|v| v.as_str()))
    .bind(row.promoted_listing_percentage)
    .execute(conn)
    .await?;
    Ok(())
}

// ==================== Bundles ====================

// GET /products/{sku}/components
#[instrument(skip(state))]
pub async fn get_components(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<Json<BundleResponse>, AppError> {
    let mut conn = state.db_pool.acquire().await?;
    let bundle = fetch_product(&mut conn, &sku).await?;
    let components = sqlx::query_as::<_, BundleComponent>(
        "SELECT bundle_sku, component_sku, quantity FROM bundle_components
         WHERE bundle_sku = $1 ORDER BY component_sku",
    )
    .bind(&sku)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(BundleResponse {
        bundle: ProductResponse::from(bundle),
        components,
    }))
}

fn validate_components(sku: &str, components: &[ComponentRequest]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for c in components {
        if c.component_sku == sku {
            return Err(AppError::validation("A bundle cannot contain itself"));
        }
        if c.quantity <= 0 {
            return Err(AppError::validation(format!(
                "Quantity for {} must be greater than 0",
                c.component_sku
            )));
        }
        if !seen.insert(c.component_sku.as_str()) {
            return Err(AppError::validation(format!("{} is listed twice", c.component_sku)));
        }
    }
    Ok(())
}

// PUT /products/{sku}/components - replaces the component list
#[instrument(skip(state, payload))]
pub async fn set_components(
    State(state): State<AppState>,
    Path(sku): Path<String>,
    Json(payload): Json<SetComponentsRequest>,
) -> Result<Json<BundleResponse>, AppError> {
    validate_components(&sku, &payload.components)?;

    let mut tx = state.db_pool.begin().await?;
    fetch_product(&mut tx, &sku).await?;
    for c in &payload.components {
        fetch_product(&mut tx, &c.component_sku).await?;
    }

    // Units previously consumed through this bundle must be returned to stock too
    let previous = load_components(&mut tx).await?;
    let mut touched: Vec<String> = crate::services::bundles::leaf_components(&sku, &previous);

    sqlx::query("DELETE FROM bundle_components WHERE bundle_sku = $1")
        .bind(&sku)
        .execute(&mut *tx)
        .await?;
    for c in &payload.components {
        sqlx::query("INSERT INTO bundle_components (bundle_sku, component_sku, quantity) VALUES ($1, $2, $3)")
            .bind(&sku)
            .bind(&c.component_sku)
            .bind(c.quantity)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("UPDATE products SET is_bundle = $2 WHERE sku = $1")
        .bind(&sku)
        .bind(!payload.components.is_empty())
        .execute(&mut *tx)
        .await?;

    // Cycles surface here as a validation error and roll the transaction back
    touched.push(sku.clone());
    refresh_stock(&mut tx, &touched).await?;

    let bundle = fetch_product(&mut tx, &sku).await?;
    let components = load_components(&mut tx)
        .await?
        .into_iter()
        .filter(|c| c.bundle_sku == sku)
        .collect();
    tx.commit().await?;

    state.committed(&[Entity::BundleComponent, Entity::Product]).await;
    info!(sku = %sku, count = payload.components.len(), "Bundle components replaced");
    Ok(Json(BundleResponse {
        bundle: ProductResponse::from(bundle),
        components,
    }))
}

// POST /products/recalculate
#[instrument(skip(state))]
pub async fn recalculate_stock(State(state): State<AppState>) -> Result<Json<RecalculateResponse>, AppError> {
    let mut tx = state.db_pool.begin().await?;
    let plain: Vec<String> = sqlx::query_scalar("SELECT sku FROM products WHERE NOT is_bundle ORDER BY sku")
        .fetch_all(&mut *tx)
        .await?;
    refresh_stock(&mut tx, &plain).await?;
    let components = load_components(&mut tx).await?;
    let bundles_refreshed = refresh_bundles(&mut tx, &components).await?;
    tx.commit().await?;

    state.committed(&[Entity::Product]).await;
    info!(products = plain.len(), bundles = bundles_refreshed, "Stock recalculated");
    Ok(Json(RecalculateResponse {
        products_refreshed: plain.len(),
        bundles_refreshed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(sku: &str, quantity: i32) -> ComponentRequest {
        ComponentRequest {
            component_sku: sku.to_string(),
            quantity,
        }
    }

    #[test]
    fn component_lists_are_checked_before_writing() {
        assert!(validate_components("GIFT-SET", &[component("MUG", 2), component("COASTER", 4)]).is_ok());
        assert!(validate_components("GIFT-SET", &[component("GIFT-SET", 1)]).is_err());
        assert!(validate_components("GIFT-SET", &[component("MUG", 0)]).is_err());
        assert!(validate_components("GIFT-SET", &[component("MUG", 1), component("MUG", 2)]).is_err());
        assert!(validate_components("GIFT-SET", &[]).is_ok());
    }

    #[test]
    fn costs_must_be_non_negative() {
        assert!(validate_costs(Some(1.5), None, Some(0.0), None, Some(12.0)).is_ok());
        assert!(validate_costs(Some(-1.0), None, None, None, None).is_err());
        assert!(validate_costs(None, Some(f64::NAN), None, None, None).is_err());
        assert!(validate_costs(None, None, None, None, Some(150.0)).is_err());
    }
}
