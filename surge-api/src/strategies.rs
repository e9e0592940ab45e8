use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use surge_core::PricingStrategy;
use surge_strategy::page_bounds;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListStrategiesQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct StrategyListResponse {
    pub items: Vec<PricingStrategy>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/strategies", get(list_strategies).post(save_strategy))
}

/// POST /v1/strategies
/// Creates when no id is given, updates otherwise
pub async fn save_strategy(
    State(state): State<AppState>,
    Json(strategy): Json<PricingStrategy>,
) -> Result<Json<PricingStrategy>, AppError> {
    let saved = state.pricing.save_strategy(&strategy).await?;
    Ok(Json(saved))
}

/// GET /v1/strategies?page=&page_size=
pub async fn list_strategies(
    State(state): State<AppState>,
    Query(query): Query<ListStrategiesQuery>,
) -> Result<Json<StrategyListResponse>, AppError> {
    let (page, page_size) = page_bounds(query.page.unwrap_or(1), query.page_size.unwrap_or(0));

    let (items, total) = state.pricing.list_strategies(page, page_size).await?;

    Ok(Json(StrategyListResponse {
        items,
        total,
        page,
        page_size,
    }))
}
