use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Which pricing algorithm a SKU is priced with
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    #[default]
    Dynamic,
    ProfitMaximization,
    Competitive,
    Fixed,
}

impl StrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyType::Dynamic => "dynamic",
            StrategyType::ProfitMaximization => "profit_maximization",
            StrategyType::Competitive => "competitive",
            StrategyType::Fixed => "fixed",
        }
    }
}

impl fmt::Display for StrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamic" => Ok(StrategyType::Dynamic),
            "profit_maximization" => Ok(StrategyType::ProfitMaximization),
            "competitive" => Ok(StrategyType::Competitive),
            "fixed" => Ok(StrategyType::Fixed),
            other => Err(format!("unknown strategy type: {}", other)),
        }
    }
}

/// Operator-managed pricing configuration. A row without `sku_id` is the default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingStrategy {
    /// Absent until the strategy has been persisted
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub sku_id: Option<String>,
    #[serde(default)]
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub min_price: f64,
    #[serde(default)]
    pub max_price: f64,
    #[serde(default = "default_inventory_threshold")]
    pub inventory_threshold: f64,
    #[serde(default)]
    pub demand_threshold: f64,
    #[serde(default)]
    pub competitor_price_offset: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_inventory_threshold() -> f64 { 0.3 }
fn default_enabled() -> bool { true }

impl PricingStrategy {
    /// Fallback used when a SKU has no stored strategy.
    pub fn default_for(sku_id: &str, base_price: f64) -> Self {
        Self {
            id: None,
            sku_id: Some(sku_id.to_string()),
            strategy_type: StrategyType::Dynamic,
            min_price: base_price * 0.5,
            max_price: base_price * 2.0,
            inventory_threshold: default_inventory_threshold(),
            demand_threshold: 0.0,
            competitor_price_offset: 0.0,
            enabled: true,
            created_at: None,
            updated_at: None,
        }
    }
}

/// A computed sale price, valid for a bounded window. Rows are never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DynamicPrice {
    pub id: Uuid,
    pub sku_id: String,
    pub base_price: f64,
    pub final_price: f64,
    pub price_adjustment: f64,
    pub inventory_factor: f64,
    pub demand_factor: f64,
    pub competitor_factor: f64,
    pub time_factor: f64,
    pub user_factor: f64,
    pub strategy_type: StrategyType,
    pub effective_time: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

impl DynamicPrice {
    /// True while `now` falls inside `[effective_time, expiry_time)`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.effective_time <= now && now < self.expiry_time
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_time
    }
}

/// `final / base`, pinned to 1.0 when there is no base to compare against.
pub fn price_adjustment(final_price: f64, base_price: f64) -> f64 {
    if base_price == 0.0 {
        return 1.0;
    }
    let ratio = final_price / base_price;
    if ratio.is_finite() { ratio } else { 1.0 }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceElasticity {
    pub sku_id: String,
    pub elasticity: f64,
    pub updated_at: DateTime<Utc>,
}

impl PriceElasticity {
    pub const DEFAULT: f64 = 1.0;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitorPrice {
    pub competitor: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

/// Snapshot of competitor prices for one SKU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitorPriceInfo {
    pub sku_id: String,
    pub competitors: Vec<CompetitorPrice>,
    pub captured_at: DateTime<Utc>,
}

impl CompetitorPriceInfo {
    /// Usable (finite, positive) prices in snapshot order.
    pub fn prices(&self) -> Vec<f64> {
        self.competitors
            .iter()
            .map(|c| c.price)
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect()
    }

    pub fn lowest_price(&self) -> Option<f64> {
        self.prices().into_iter().reduce(f64::min)
    }
}

/// Daily observed price and demand for a SKU
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceHistoryData {
    pub sku_id: String,
    pub date: NaiveDate,
    pub price: f64,
    pub demand: f64,
}

/// Input to the orchestrator's price calculation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRequest {
    pub sku_id: String,
    pub base_price: f64,
    #[serde(default)]
    pub current_stock: i64,
    #[serde(default)]
    pub total_stock: i64,
    #[serde(default)]
    pub daily_demand: f64,
    #[serde(default)]
    pub average_daily_demand: f64,
    #[serde(default)]
    pub competitor_price: Option<f64>,
    #[serde(default)]
    pub user_level: Option<String>,
}
