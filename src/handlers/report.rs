// src/handlers/report.rs
use std::future::Future;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::header;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::dtos::report::*;
use crate::error::AppError;
use crate::handlers::sale::load_sales;
use crate::services::aggregation::{self, by_profit, by_quantity};
use crate::services::export;
use crate::services::invalidation::View;
use crate::state::AppState;

const DEFAULT_TOP_LIMIT: usize = 10;
const MAX_TOP_LIMIT: usize = 100;

/// Serves a report from the view cache, building and storing it on a miss.
/// `build` is only polled on a miss.
async fn cached_report<T, Fut>(state: &AppState, key: String, build: Fut) -> Result<Json<Value>, AppError>
where
    T: Serialize,
    Fut: Future<Output = Result<T, AppError>>,
{
    if let Some(hit) = state.views.get(View::Reports, &key).await {
        debug!(%key, "Report cache hit");
        return Ok(Json(hit));
    }

    let generation = state.views.generation(View::Reports).await;
    let value = serde_json::to_value(build.await?)
        .map_err(|e| AppError::internal(format!("Failed to encode report: {e}")))?;
    state.views.put(View::Reports, &key, generation, value.clone()).await;
    Ok(Json(value))
}

// GET /reports/summary
#[instrument(skip(state))]
pub async fn summary(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, AppError> {
    let today = Utc::now().date_naive();
    let key = query.cache_key("summary", today);
    cached_report(&state, key, async {
        let filter = query.filter();
        let sales = load_sales(&state.db_pool, &filter).await?;
        let products = aggregation::by_product(&sales);
        let best_product = products
            .best_by(by_profit)
            .map(|((sku, listing_title), t)| ProductRanking {
                sku: sku.clone(),
                listing_title: listing_title.clone(),
                totals: (*t).into(),
            });
        Ok::<_, AppError>(SummaryResponse {
            range: filter.date_range(today),
            totals: aggregation::summarize(&sales).into(),
            best_product,
        })
    })
    .await
}

// GET /reports/daily
#[instrument(skip(state))]
pub async fn daily(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, AppError> {
    let key = query.cache_key("daily", Utc::now().date_naive());
    cached_report(&state, key, async {
        let sales = load_sales(&state.db_pool, &query.filter()).await?;
        let points: Vec<DailyPoint> = aggregation::daily(&sales)
            .into_iter()
            .map(|(date, totals)| DailyPoint {
                date,
                totals: totals.into(),
            })
            .collect();
        Ok::<_, AppError>(points)
    })
    .await
}

// GET /reports/top-products?by=quantity|profit&limit=
#[instrument(skip(state))]
pub async fn top_products(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT);
    if limit == 0 || limit > MAX_TOP_LIMIT {
        return Err(AppError::validation(format!("limit must be between 1 and {MAX_TOP_LIMIT}")));
    }

    let key = query.cache_key("top_products", Utc::now().date_naive());
    cached_report(&state, key, async {
        let sales = load_sales(&state.db_pool, &query.filter()).await?;
        let grouped = aggregation::by_product(&sales);
        let ranked = match query.by {
            Ranking::Quantity => grouped.top_by(limit, by_quantity),
            Ranking::Profit => grouped.top_by(limit, by_profit),
        };
        let products: Vec<ProductRanking> = ranked
            .into_iter()
            .map(|((sku, listing_title), totals)| ProductRanking {
                sku,
                listing_title,
                totals: totals.into(),
            })
            .collect();
        Ok::<_, AppError>(products)
    })
    .await
}

// GET /reports/platforms
#[instrument(skip(state))]
pub async fn platforms(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<Value>, AppError> {
    let key = query.cache_key("platforms", Utc::now().date_naive());
    cached_report(&state, key, async {
        let sales = load_sales(&state.db_pool, &query.filter()).await?;
        let grouped = aggregation::by_platform(&sales);
        let breakdown: Vec<PlatformBreakdown> = grouped
            .top_by(grouped.groups().len(), |t| t.revenue)
            .into_iter()
            .map(|(platform, totals)| PlatformBreakdown {
                platform,
                totals: totals.into(),
            })
            .collect();
        Ok::<_, AppError>(breakdown)
    })
    .await
}

// GET /reports/export - sales with profitability as CSV
#[instrument(skip(state))]
pub async fn export_sales(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let mut sales = load_sales(&state.db_pool, &query.filter()).await?;
    sales.reverse(); // oldest first

    let mut body = Vec::new();
    export::write_sales(&mut body, &sales)
        .map_err(|e| AppError::internal(format!("Failed to write CSV: {e}")))?;

    let filename = format!("sales-{}.csv", Utc::now().date_naive());
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    )
        .into_response())
}
