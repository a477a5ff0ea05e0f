// src/dtos/product.rs
use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::models::product::{BundleComponent, Product, VatStatus};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub listing_title: Option<String>, // Defaults to the SKU
    pub stock_quantity: Option<i32>,   // Becomes the initial stock
    pub initial_stock_date: Option<NaiveDate>, // Defaults to today
    pub low_stock_threshold: Option<i32>,
    pub supplier: Option<String>,
    pub warehouse_location: Option<String>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub shipping_service_id: Option<i64>,
    pub picking_fee_name: Option<String>,
    pub vat_status: Option<VatStatus>,
    pub promoted_listing_percentage: Option<f64>,
    #[serde(default)]
    pub is_bundle: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductRequest {
    pub listing_title: Option<String>,
    pub stock_quantity: Option<i32>, // Recorded as an adjustment
    pub initial_stock: Option<i32>,  // Rebases the stock count
    pub initial_stock_date: Option<NaiveDate>,
    pub low_stock_threshold: Option<i32>,
    pub supplier: Option<String>,
    pub warehouse_location: Option<String>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub shipping_service_id: Option<i64>,
    pub picking_fee_name: Option<String>,
    pub vat_status: Option<VatStatus>,
    pub promoted_listing_percentage: Option<f64>,
}

impl UpdateProductRequest {
    pub fn touches_derived_fields(&self) -> bool {
        self.stock_quantity.is_some()
            || self.initial_stock.is_some()
            || self.initial_stock_date.is_some()
            || self.product_cost.is_some()
            || self.packaging_cost.is_some()
            || self.making_up_cost.is_some()
            || self.additional_costs.is_some()
    }

    /// Date a rebase counts from. Setting `initial_stock` alone rebases to today.
    pub fn rebase_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        self.initial_stock_date
            .or_else(|| self.initial_stock.map(|_| today))
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub sku: String,
    pub listing_title: String,
    pub stock_quantity: i32,
    pub low_stock_threshold: i32,
    pub low_stock: bool,
    pub initial_stock: i32,
    pub initial_stock_date: Option<NaiveDate>,
    pub supplier: Option<String>,
    pub warehouse_location: Option<String>,
    pub length_cm: Option<f64>,
    pub width_cm: Option<f64>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub product_cost: Option<f64>,
    pub packaging_cost: Option<f64>,
    pub making_up_cost: Option<f64>,
    pub additional_costs: Option<f64>,
    pub unit_cost: f64,
    pub shipping_service_id: Option<i64>,
    pub picking_fee_name: Option<String>,
    pub vat_status: Option<VatStatus>,
    pub promoted_listing_percentage: Option<f64>,
    pub is_bundle: bool,
    pub created_at: Option<String>,
}

// Convert from Model to Response DTO
impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            low_stock: product.is_low_stock(),
            unit_cost: product.unit_cost(),
            vat_status: product.vat(),
            sku: product.sku,
            listing_title: product.listing_title,
            stock_quantity: product.stock_quantity,
            low_stock_threshold: product.low_stock_threshold,
            initial_stock: product.initial_stock,
            initial_stock_date: product.initial_stock_date,
            supplier: product.supplier,
            warehouse_location: product.warehouse_location,
            length_cm: product.length_cm,
            width_cm: product.width_cm,
            height_cm: product.height_cm,
            weight_kg: product.weight_kg,
            product_cost: product.product_cost,
            packaging_cost: product.packaging_cost,
            making_up_cost: product.making_up_cost,
            additional_costs: product.additional_costs,
            shipping_service_id: product.shipping_service_id,
            picking_fee_name: product.picking_fee_name,
            promoted_listing_percentage: product.promoted_listing_percentage,
            is_bundle: product.is_bundle,
            created_at: product.created_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ComponentRequest {
    pub component_sku: String,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct SetComponentsRequest {
    pub components: Vec<ComponentRequest>,
}

#[derive(Debug, Serialize)]
pub struct BundleResponse {
    pub bundle: ProductResponse,
    pub components: Vec<BundleComponent>,
}

#[derive(Debug, Serialize)]
pub struct RecalculateResponse {
    pub products_refreshed: usize,
    pub bundles_refreshed: usize,
}

#[derive(Debug, Serialize)]
pub struct ProductImportSummary {
    pub created: u64,
    pub updated: u64,
    pub skipped: Vec<crate::services::csv_import::SkippedRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 15).unwrap()
    }

    #[test]
    fn initial_stock_alone_rebases_to_today() {
        let patch = UpdateProductRequest {
            initial_stock: Some(40),
            ..UpdateProductRequest::default()
        };
        assert_eq!(patch.rebase_date(today()), Some(today()));
        assert!(patch.touches_derived_fields());
    }

    #[test]
    fn explicit_rebase_date_wins() {
        let since = NaiveDate::from_ymd_opt(2024, 4, 1);
        let patch = UpdateProductRequest {
            initial_stock: Some(40),
            initial_stock_date: since,
            ..UpdateProductRequest::default()
        };
        assert_eq!(patch.rebase_date(today()), since);

        let date_only = UpdateProductRequest {
            initial_stock_date: since,
            ..UpdateProductRequest::default()
        };
        assert_eq!(date_only.rebase_date(today()), since);
        assert_eq!(UpdateProductRequest::default().rebase_date(today()), None);
    }

    #[test]
    fn create_request_accepts_backdated_initial_stock() {
        let req: CreateProductRequest = serde_json::from_str(
            r#"{"sku": "MUG-01", "stock_quantity": 12, "initial_stock_date": "2024-03-01"}"#,
        )
        .unwrap();
        assert_eq!(req.initial_stock_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }
}
