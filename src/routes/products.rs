use axum::{
    routing::{get, post},
    Router,
};
use crate::handlers::product::{
    create_product, get_components, get_product, import_products, list_products, low_stock_products,
    recalculate_stock, set_components, update_product,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/low-stock", get(low_stock_products))
        .route("/products/import", post(import_products))
        .route("/products/recalculate", post(recalculate_stock))
        .route("/products/{sku}", get(get_product).patch(update_product))
        .route("/products/{sku}/components", get(get_components).put(set_components))
}
