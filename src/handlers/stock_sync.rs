// src/handlers/stock_sync.rs
//! Keeps `products.stock_quantity` (and bundle cost) in step with the ledger
//! after writes. Everything here runs inside the caller's transaction.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use sqlx::{PgConnection, Row};
use tracing::debug;

use crate::error::AppError;
use crate::models::product::BundleComponent;
use crate::services::bundles::{self, StockFigures};
use crate::services::stock::current_stock;

pub async fn load_components(conn: &mut PgConnection) -> Result<Vec<BundleComponent>, AppError> {
    let components = sqlx::query_as::<_, BundleComponent>(
        "SELECT bundle_sku, component_sku, quantity FROM bundle_components ORDER BY bundle_sku, component_sku",
    )
    .fetch_all(conn)
    .await?;
    Ok(components)
}

/// Creates placeholder products for unknown SKUs. Returns how many were created.
pub async fn ensure_products(
    conn: &mut PgConnection,
    items: &[(String, Option<String>)],
) -> Result<u64, AppError> {
    let mut created = 0;
    for (sku, title) in items {
        let result = sqlx::query(
            "INSERT INTO products (sku, listing_title, low_stock_threshold)
             VALUES ($1, $2, $3)
             ON CONFLICT (sku) DO NOTHING",
        )
        .bind(sku)
        .bind(title.as_deref().unwrap_or(sku))
        .bind(crate::models::product::DEFAULT_LOW_STOCK_THRESHOLD)
        .execute(&mut *conn)
        .await?;
        created += result.rows_affected();
    }
    if created > 0 {
        debug!(created, "Created placeholder products");
    }
    Ok(created)
}

/// Recomputes stock for `skus` (bundles expand to their components) and then
/// re-derives every bundle.
pub async fn refresh_stock(conn: &mut PgConnection, skus: &[String]) -> Result<(), AppError> {
    let components = load_components(conn).await?;
    let bundle_skus: HashSet<&str> = components.iter().map(|c| c.bundle_sku.as_str()).collect();

    let mut plain: Vec<String> = Vec::new();
    for sku in skus {
        if bundle_skus.contains(sku.as_str()) {
            plain.extend(bundles::leaf_components(sku, &components));
        } else {
            plain.push(sku.clone());
        }
    }
    plain.sort();
    plain.dedup();

    let locked = lock_products(conn, lock_order(&plain, &bundle_skus)).await?;
    debug!(locked, "Locked products for stock refresh");

    for sku in &plain {
        refresh_plain_product(conn, sku, &components).await?;
    }
    refresh_bundles(conn, &components).await?;
    Ok(())
}

/// Product rows a refresh writes, sorted by SKU.
fn lock_order(plain: &[String], bundle_skus: &HashSet<&str>) -> Vec<String> {
    let mut skus: Vec<String> = plain
        .iter()
        .cloned()
        .chain(bundle_skus.iter().map(|s| s.to_string()))
        .collect();
    skus.sort();
    skus.dedup();
    skus
}

// Rows are locked in SKU order; a concurrent refresh waits here until this
// transaction commits.
async fn lock_products(conn: &mut PgConnection, skus: Vec<String>) -> Result<usize, AppError> {
    if skus.is_empty() {
        return Ok(0);
    }
    let locked: Vec<String> = sqlx::query_scalar(
        "SELECT sku FROM products WHERE sku = ANY($1) ORDER BY sku FOR UPDATE",
    )
    .bind(&skus)
    .fetch_all(conn)
    .await?;
    Ok(locked.len())
}

async fn refresh_plain_product(
    conn: &mut PgConnection,
    sku: &str,
    components: &[BundleComponent],
) -> Result<(), AppError> {
    let product = sqlx::query("SELECT initial_stock, initial_stock_date, is_bundle FROM products WHERE sku = $1")
        .bind(sku)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(product) = product else {
        return Ok(());
    };
    if product.try_get::<bool, _>("is_bundle")? {
        return Ok(());
    }
    let initial_stock: i32 = product.try_get("initial_stock")?;
    let since: Option<NaiveDate> = product.try_get("initial_stock_date")?;

    let adjustments: Vec<(NaiveDate, i64)> = sqlx::query_as(
        "SELECT (created_at AT TIME ZONE 'UTC')::DATE, quantity::BIGINT FROM stock_adjustments WHERE sku = $1",
    )
    .bind(sku)
    .fetch_all(&mut *conn)
    .await?;

    // Units sold directly plus units consumed by bundle sales.
    let mut per_unit: HashMap<String, i64> = bundles::unit_requirements(sku, components);
    per_unit.insert(sku.to_string(), 1);
    let selling: Vec<String> = per_unit.keys().cloned().collect();
    let sales: Vec<(String, NaiveDate, i64)> = sqlx::query_as(
        "SELECT sku, sale_date, quantity::BIGINT FROM sales WHERE sku = ANY($1)",
    )
    .bind(&selling)
    .fetch_all(&mut *conn)
    .await?;
    let sold = sales
        .into_iter()
        .map(|(sold_sku, date, qty)| (date, qty * per_unit.get(&sold_sku).copied().unwrap_or(0)));

    let stock = current_stock(i64::from(initial_stock), since, adjustments, sold);
    sqlx::query("UPDATE products SET stock_quantity = $2 WHERE sku = $1")
        .bind(sku)
        .bind(clamp_i32(stock))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Derives stock and cost for every bundle from its components' current figures.
pub async fn refresh_bundles(
    conn: &mut PgConnection,
    components: &[BundleComponent],
) -> Result<usize, AppError> {
    if components.is_empty() {
        return Ok(0);
    }

    let rows: Vec<(String, i32, f64)> = sqlx::query_as(
        "SELECT sku, stock_quantity,
                (COALESCE(product_cost, 0) + COALESCE(packaging_cost, 0)
                 + COALESCE(making_up_cost, 0) + COALESCE(additional_costs, 0))::FLOAT8
         FROM products WHERE NOT is_bundle",
    )
    .fetch_all(&mut *conn)
    .await?;
    let figures: HashMap<String, StockFigures> = rows
        .into_iter()
        .map(|(sku, stock, unit_cost)| (sku, StockFigures { stock: i64::from(stock), unit_cost }))
        .collect();

    let derived = bundles::resolve_bundles(&figures, components)?;
    for (sku, f) in &derived {
        sqlx::query(
            "UPDATE products
             SET stock_quantity = $2, product_cost = $3,
                 packaging_cost = NULL, making_up_cost = NULL, additional_costs = NULL
             WHERE sku = $1 AND is_bundle",
        )
        .bind(sku)
        .bind(clamp_i32(f.stock))
        .bind(f.unit_cost)
        .execute(&mut *conn)
        .await?;
    }
    Ok(derived.len())
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_locks_plain_and_bundle_rows_once_in_sku_order() {
        let plain = vec!["MUG-01".to_string(), "CUP-02".to_string(), "BOX-SET".to_string()];
        let bundle_skus: HashSet<&str> = ["GIFT-SET", "BOX-SET"].into_iter().collect();
        assert_eq!(
            lock_order(&plain, &bundle_skus),
            vec!["BOX-SET", "CUP-02", "GIFT-SET", "MUG-01"]
        );
        assert!(lock_order(&[], &HashSet::new()).is_empty());
    }

    #[test]
    fn stock_is_clamped_to_column_range() {
        assert_eq!(clamp_i32(42), 42);
        assert_eq!(clamp_i32(-7), -7);
        assert_eq!(clamp_i32(i64::MAX), i32::MAX);
        assert_eq!(clamp_i32(i64::MIN), i32::MIN);
    }
}
