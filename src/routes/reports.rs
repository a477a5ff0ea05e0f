use axum::{routing::get, Router};
use crate::handlers::report;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reports/summary", get(report::summary))
        .route("/reports/daily", get(report::daily))
        .route("/reports/top-products", get(report::top_products))
        .route("/reports/platforms", get(report::platforms))
        .route("/reports/export", get(report::export_sales))
}
