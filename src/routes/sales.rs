use axum::{
    routing::{get, patch, post},
    Router,
};
use crate::state::AppState;
use crate::handlers::sale;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sales", get(sale::list_sales).post(sale::create_sale))
        .route("/sales/bulk-delete", post(sale::bulk_delete_sales))
        .route("/sales/import", post(sale::import_sales))
        .route(
            "/sales/{id}",
            get(sale::get_sale).patch(sale::update_sale).delete(sale::delete_sale),
        )
        .route("/sales/{id}/verified", patch(sale::toggle_verified))
        // Pure calculation, nothing is stored
        .route("/profitability/compute", post(sale::compute_profitability))
}
