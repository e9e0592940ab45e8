use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use surge_core::{DynamicPrice, PriceRequest};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LatestPriceResponse {
    #[serde(flatten)]
    pub price: DynamicPrice,
    /// Whether the row is still inside its validity window right now
    pub is_valid: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/prices/calculate", post(calculate_price))
        .route("/v1/prices/{sku_id}/latest", get(latest_price))
}

/// POST /v1/prices/calculate
pub async fn calculate_price(
    State(state): State<AppState>,
    Json(req): Json<PriceRequest>,
) -> Result<Json<DynamicPrice>, AppError> {
    if req.sku_id.trim().is_empty() {
        return Err(AppError::ValidationError("sku_id is required".to_string()));
    }
    if !req.base_price.is_finite() || req.base_price < 0.0 {
        return Err(AppError::ValidationError(
            "base_price must be a non-negative number".to_string(),
        ));
    }

    info!("Calculating price for sku {}", req.sku_id);
    let price = state.pricing.calculate_price(&req).await?;
    Ok(Json(price))
}

/// GET /v1/prices/{sku_id}/latest
pub async fn latest_price(
    State(state): State<AppState>,
    Path(sku_id): Path<String>,
) -> Result<Json<LatestPriceResponse>, AppError> {
    let price = state.pricing.get_latest_price(&sku_id).await?;
    let is_valid = price.is_valid_at(Utc::now());

    Ok(Json(LatestPriceResponse { price, is_valid }))
}
