use axum::{routing::get, Router};
use crate::handlers::fee;
use crate::state::AppState;

// Effective-dated fee and cost history
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/platform-fees", get(fee::list_platform_fees).post(fee::create_platform_fee))
        .route(
            "/shipping-services",
            get(fee::list_shipping_services).post(fee::create_shipping_service),
        )
        .route("/shipping-rates", get(fee::list_shipping_rates).post(fee::create_shipping_rate))
        .route("/picking-fees", get(fee::list_picking_fees).post(fee::create_picking_fee))
        .route("/product-costs", get(fee::list_product_costs).post(fee::create_product_cost))
}
