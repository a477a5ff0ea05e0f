// src/handlers/fee.rs
use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};

use crate::dtos::fee::*;
use crate::error::AppError;
use crate::models::fee::{PickingFee, PlatformFee, ProductCost, ShippingRate, ShippingService};
use crate::services::fees::FeeBook;
use crate::services::invalidation::Entity;
use crate::state::AppState;

const PLATFORM_FEE_COLUMNS: &str = "id, platform, percentage::FLOAT8 AS percentage, flat_fee::FLOAT8 AS flat_fee, effective_from, effective_to";
const SHIPPING_RATE_COLUMNS: &str = "id, shipping_service_id, price::FLOAT8 AS price, effective_from, effective_to";
const PICKING_FEE_COLUMNS: &str = "id, name, fee::FLOAT8 AS fee, effective_from, effective_to";
const PRODUCT_COST_COLUMNS: &str = "id, sku, unit_cost::FLOAT8 AS unit_cost, effective_from, effective_to";

// Effective-dated tables and the column that identifies a rate series.
#[derive(Debug, Clone, Copy)]
enum History {
    PlatformFees,
    ShippingRates,
    PickingFees,
    ProductCosts,
}

impl History {
    fn table(self) -> &'static str {
        match self {
            History::PlatformFees => "platform_fees",
            History::ShippingRates => "shipping_rates",
            History::PickingFees => "picking_fees",
            History::ProductCosts => "product_costs",
        }
    }

    fn key_column(self) -> &'static str {
        match self {
            History::PlatformFees => "platform",
            History::ShippingRates => "shipping_service_id",
            History::PickingFees => "name",
            History::ProductCosts => "sku",
        }
    }

    // Platform names are matched case-insensitively.
    fn key_predicate(self) -> String {
        match self {
            History::PlatformFees => "LOWER(platform) = LOWER($1)".to_string(),
            other => format!("{} = $1", other.key_column()),
        }
    }

    fn entity(self) -> Entity {
        match self {
            History::PlatformFees => Entity::PlatformFee,
            History::ShippingRates => Entity::ShippingRate,
            History::PickingFees => Entity::PickingFee,
            History::ProductCosts => Entity::ProductCost,
        }
    }
}

// ==================== Shared helpers ====================

pub async fn load_fee_book(db_pool: &PgPool) -> Result<FeeBook, AppError> {
    let platform_fees = sqlx::query_as::<_, PlatformFee>(&format!(
        "SELECT {PLATFORM_FEE_COLUMNS} FROM platform_fees"
    ))
    .fetch_all(db_pool)
    .await?;
    let shipping_rates = sqlx::query_as::<_, ShippingRate>(&format!(
        "SELECT {SHIPPING_RATE_COLUMNS} FROM shipping_rates"
    ))
    .fetch_all(db_pool)
    .await?;
    let picking_fees = sqlx::query_as::<_, PickingFee>(&format!(
        "SELECT {PICKING_FEE_COLUMNS} FROM picking_fees"
    ))
    .fetch_all(db_pool)
    .await?;
    let product_costs = sqlx::query_as::<_, ProductCost>(&format!(
        "SELECT {PRODUCT_COST_COLUMNS} FROM product_costs"
    ))
    .fetch_all(db_pool)
    .await?;

    Ok(FeeBook::new(platform_fees, shipping_rates, picking_fees, product_costs))
}

// Identifies one rate series within a history table.
#[derive(Debug, Clone, Copy)]
enum SeriesKey<'a> {
    Text(&'a str),
    Id(i64),
}

/// Closes the open record of a series so the new one becomes current.
/// Keeps exactly one open record per key.
async fn close_current(
    tx: &mut Transaction<'_, Postgres>,
    history: History,
    key: SeriesKey<'_>,
    effective_from: NaiveDate,
) -> Result<(), AppError> {
    let select = format!(
        "SELECT effective_from FROM {} WHERE {} AND effective_to IS NULL FOR UPDATE",
        history.table(),
        history.key_predicate()
    );
    let query = sqlx::query_scalar::<_, NaiveDate>(&select);
    let query = match key {
        SeriesKey::Text(k) => query.bind(k),
        SeriesKey::Id(k) => query.bind(k),
    };
    let current = query.fetch_optional(&mut **tx).await?;

    let Some(current_from) = current else {
        return Ok(());
    };
    if effective_from <= current_from {
        return Err(AppError::conflict(format!(
            "New rate must start after the current one (effective from {current_from})"
        )));
    }

    let update = format!(
        "UPDATE {} SET effective_to = $2 WHERE {} AND effective_to IS NULL",
        history.table(),
        history.key_predicate()
    );
    let query = sqlx::query(&update);
    let query = match key {
        SeriesKey::Text(k) => query.bind(k),
        SeriesKey::Id(k) => query.bind(k),
    };
    query.bind(effective_from).execute(&mut **tx).await?;
    Ok(())
}

fn where_current(current_only: bool) -> &'static str {
    if current_only {
        " WHERE effective_to IS NULL"
    } else {
        ""
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn validate_rate(value: f64, label: &str) -> Result<(), AppError> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::validation(format!("{label} must be a non-negative number")));
    }
    Ok(())
}

// ==================== Platform Fees ====================

#[instrument(skip(state))]
pub async fn list_platform_fees(
    State(state): State<AppState>,
    Query(query): Query<FeeHistoryQuery>,
) -> Result<Json<Vec<PlatformFee>>, AppError> {
    let fees = sqlx::query_as::<_, PlatformFee>(&format!(
        "SELECT {PLATFORM_FEE_COLUMNS} FROM platform_fees{} ORDER BY platform, effective_from DESC",
        where_current(query.current_only)
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(fees))
}

#[instrument(skip(state, payload))]
pub async fn create_platform_fee(
    State(state): State<AppState>,
    Json(payload): Json<CreatePlatformFeeRequest>,
) -> Result<(StatusCode, Json<PlatformFee>), AppError> {
    let platform = payload.platform.trim();
    if platform.is_empty() {
        return Err(AppError::validation("Platform is required"));
    }
    validate_rate(payload.percentage, "Percentage")?;
    validate_rate(payload.flat_fee, "Flat fee")?;
    let effective_from = payload.effective_from.unwrap_or_else(today);

    let mut tx = state.db_pool.begin().await?;
    close_current(&mut tx, History::PlatformFees, SeriesKey::Text(platform), effective_from).await?;
    let fee = sqlx::query_as::<_, PlatformFee>(&format!(
        "INSERT INTO platform_fees (platform, percentage, flat_fee, effective_from)
         VALUES ($1, $2, $3, $4) RETURNING {PLATFORM_FEE_COLUMNS}"
    ))
    .bind(platform)
    .bind(payload.percentage)
    .bind(payload.flat_fee)
    .bind(effective_from)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    state.committed(&[History::PlatformFees.entity()]).await;
    info!(platform = %fee.platform, %effective_from, "Platform fee superseded");
    Ok((StatusCode::CREATED, Json(fee)))
}

// ==================== Shipping ====================

#[instrument(skip(state))]
pub async fn list_shipping_services(
    State(state): State<AppState>,
) -> Result<Json<Vec<ShippingService>>, AppError> {
    let services = sqlx::query_as::<_, ShippingService>(
        "SELECT id, courier, service_name FROM shipping_services ORDER BY courier, service_name",
    )
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(services))
}

#[instrument(skip(state, payload))]
pub async fn create_shipping_service(
    State(state): State<AppState>,
    Json(payload): Json<CreateShippingServiceRequest>,
) -> Result<(StatusCode, Json<ShippingService>), AppError> {
    if payload.courier.trim().is_empty() || payload.service_name.trim().is_empty() {
        return Err(AppError::validation("Courier and service name are required"));
    }
    let service = sqlx::query_as::<_, ShippingService>(
        "INSERT INTO shipping_services (courier, service_name) VALUES ($1, $2)
         RETURNING id, courier, service_name",
    )
    .bind(payload.courier.trim())
    .bind(payload.service_name.trim())
    .fetch_one(&state.db_pool)
    .await?;

    state.committed(&[Entity::ShippingService]).await;
    info!(id = service.id, courier = %service.courier, "Shipping service created");
    Ok((StatusCode::CREATED, Json(service)))
}

#[instrument(skip(state))]
pub async fn list_shipping_rates(
    State(state): State<AppState>,
    Query(query): Query<FeeHistoryQuery>,
) -> Result<Json<Vec<ShippingRate>>, AppError> {
    let rates = sqlx::query_as::<_, ShippingRate>(&format!(
        "SELECT {SHIPPING_RATE_COLUMNS} FROM shipping_rates{} ORDER BY shipping_service_id, effective_from DESC",
        where_current(query.current_only)
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(rates))
}

#[instrument(skip(state, payload))]
pub async fn create_shipping_rate(
    State(state): State<AppState>,
    Json(payload): Json<CreateShippingRateRequest>,
) -> Result<(StatusCode, Json<ShippingRate>), AppError> {
    validate_rate(payload.price, "Price")?;
    let effective_from = payload.effective_from.unwrap_or_else(today);

    let mut tx = state.db_pool.begin().await?;
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shipping_services WHERE id = $1)")
        .bind(payload.shipping_service_id)
        .fetch_one(&mut *tx)
        .await?;
    if !exists {
        return Err(AppError::not_found("Shipping service not found"));
    }

    close_current(&mut tx, History::ShippingRates, SeriesKey::Id(payload.shipping_service_id), effective_from).await?;
    let rate = sqlx::query_as::<_, ShippingRate>(&format!(
        "INSERT INTO shipping_rates (shipping_service_id, price, effective_from)
         VALUES ($1, $2, $3) RETURNING {SHIPPING_RATE_COLUMNS}"
    ))
    .bind(payload.shipping_service_id)
    .bind(payload.price)
    .bind(effective_from)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    state.committed(&[History::ShippingRates.entity()]).await;
    Ok((StatusCode::CREATED, Json(rate)))
}

// ==================== Picking Fees ====================

#[instrument(skip(state))]
pub async fn list_picking_fees(
    State(state): State<AppState>,
    Query(query): Query<FeeHistoryQuery>,
) -> Result<Json<Vec<PickingFee>>, AppError> {
    let fees = sqlx::query_as::<_, PickingFee>(&format!(
        "SELECT {PICKING_FEE_COLUMNS} FROM picking_fees{} ORDER BY name, effective_from DESC",
        where_current(query.current_only)
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(fees))
}

#[instrument(skip(state, payload))]
pub async fn create_picking_fee(
    State(state): State<AppState>,
    Json(payload): Json<CreatePickingFeeRequest>,
) -> Result<(StatusCode, Json<PickingFee>), AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::validation("Name is required"));
    }
    validate_rate(payload.fee, "Fee")?;
    let effective_from = payload.effective_from.unwrap_or_else(today);

    let mut tx = state.db_pool.begin().await?;
    close_current(&mut tx, History::PickingFees, SeriesKey::Text(name), effective_from).await?;
    let fee = sqlx::query_as::<_, PickingFee>(&format!(
        "INSERT INTO picking_fees (name, fee, effective_from)
         VALUES ($1, $2, $3) RETURNING {PICKING_FEE_COLUMNS}"
    ))
    .bind(name)
    .bind(payload.fee)
    .bind(effective_from)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    state.committed(&[History::PickingFees.entity()]).await;
    Ok((StatusCode::CREATED, Json(fee)))
}

// ==================== Product Costs ====================

#[instrument(skip(state))]
pub async fn list_product_costs(
    State(state): State<AppState>,
    Query(query): Query<FeeHistoryQuery>,
) -> Result<Json<Vec<ProductCost>>, AppError> {
    let costs = sqlx::query_as::<_, ProductCost>(&format!(
        "SELECT {PRODUCT_COST_COLUMNS} FROM product_costs{} ORDER BY sku, effective_from DESC",
        where_current(query.current_only)
    ))
    .fetch_all(&state.db_pool)
    .await?;
    Ok(Json(costs))
}

#[instrument(skip(state, payload))]
pub async fn create_product_cost(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductCostRequest>,
) -> Result<(StatusCode, Json<ProductCost>), AppError> {
    let sku = payload.sku.trim();
    validate_rate(payload.unit_cost, "Unit cost")?;
    let effective_from = payload.effective_from.unwrap_or_else(today);

    let mut tx = state.db_pool.begin().await?;
    let is_bundle: Option<bool> = sqlx::query_scalar("SELECT is_bundle FROM products WHERE sku = $1")
        .bind(sku)
        .fetch_optional(&mut *tx)
        .await?;
    match is_bundle {
        None => return Err(AppError::not_found("Product not found")),
        Some(true) => return Err(AppError::validation("Bundle cost is derived from its components")),
        Some(false) => {}
    }

    close_current(&mut tx, History::ProductCosts, SeriesKey::Text(sku), effective_from).await?;
    let cost = sqlx::query_as::<_, ProductCost>(&format!(
        "INSERT INTO product_costs (sku, unit_cost, effective_from)
         VALUES ($1, $2, $3) RETURNING {PRODUCT_COST_COLUMNS}"
    ))
    .bind(sku)
    .bind(payload.unit_cost)
    .bind(effective_from)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    state.committed(&[History::ProductCosts.entity()]).await;
    Ok((StatusCode::CREATED, Json(cost)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_tables_map_to_their_entities() {
        assert_eq!(History::PlatformFees.table(), "platform_fees");
        assert_eq!(History::ShippingRates.key_column(), "shipping_service_id");
        assert_eq!(History::ProductCosts.entity(), Entity::ProductCost);
        assert_eq!(History::PlatformFees.key_predicate(), "LOWER(platform) = LOWER($1)");
        assert_eq!(History::PickingFees.key_predicate(), "name = $1");
    }

    #[test]
    fn negative_rates_are_rejected() {
        assert!(validate_rate(-0.01, "Fee").is_err());
        assert!(validate_rate(f64::NAN, "Fee").is_err());
        assert!(validate_rate(0.0, "Fee").is_ok());
    }
}
