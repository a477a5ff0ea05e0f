pub mod fees;
pub mod products;
pub mod reports;
pub mod sales;
pub mod stock;

use axum::{http::HeaderValue, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .merge(products::routes())
        .merge(sales::routes())
        .merge(stock::routes())
        .merge(fees::routes())
        .merge(reports::routes())
}

/// Full application under the `/api` base path.
pub fn create_app(state: AppState, cors_origin: Option<&str>) -> Router {
    let api = create_router()
        .route("/", get(|| async { "Stockroom API" }))
        .route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    match origin.map(|o| o.parse::<HeaderValue>()) {
        Some(Ok(origin)) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Invalid CORS_ORIGIN, allowing any origin");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    }
}

async fn health_check() -> &'static str {
    "OK"
}
