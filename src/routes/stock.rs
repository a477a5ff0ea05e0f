use axum::{
    routing::{get, post, put},
    Router,
};
use crate::handlers::{stock_adjustment, stock_check};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/stock-adjustments",
            get(stock_adjustment::list_adjustments).post(stock_adjustment::create_adjustment),
        )
        .route("/stock-checks", get(stock_check::list_checks).post(stock_check::create_check))
        .route("/stock-checks/{id}", get(stock_check::get_check))
        .route("/stock-checks/{id}/items", put(stock_check::upsert_items))
        .route("/stock-checks/{id}/complete", post(stock_check::complete_check))
}
