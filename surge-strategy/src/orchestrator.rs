use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use surge_core::models::{
    price_adjustment, DynamicPrice, PriceElasticity, PriceRequest, PricingStrategy, StrategyType,
};
use surge_core::repository::PricingRepository;
use surge_core::{CoreResult, PricingError};
use surge_pricing::demand::{DemandData, DemandEstimator};
use surge_pricing::engine::{default_bounds, CompetitiveStrategy, PricingEngine, PricingResult};
use surge_pricing::factors::{FactorPolicy, PricingFactors};

use crate::cache::{StrategyCache, StrategyTable};

/// Service-level constants around the engine
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServicePolicy {
    /// Unit cost assumed for profit maximization, as a share of base price
    pub cost_ratio: f64,
    /// How long a computed price stays authoritative
    pub validity_hours: i64,
    /// History points fed to the demand estimator
    pub history_limit: u32,
}

impl Default for ServicePolicy {
    fn default() -> Self {
        Self {
            cost_ratio: 0.7,
            validity_hours: 24,
            history_limit: 30,
        }
    }
}

/// Holiday lookup used by the time factor
pub trait HolidayCalendar: Send + Sync {
    fn is_holiday(&self, date: NaiveDate) -> bool;
}

/// Calendar with no holidays at all
pub struct NoHolidays;

impl HolidayCalendar for NoHolidays {
    fn is_holiday(&self, _date: NaiveDate) -> bool {
        false
    }
}

/// Loyalty tier name to ordinal. Diamond ranks above VIP.
pub fn tier_level(tier: Option<&str>) -> u32 {
    match tier.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
        Some("diamond") => 10,
        Some("vip") => 9,
        Some("gold") => 7,
        Some("silver") => 5,
        _ => 1,
    }
}

/// 0.5 scaled by today's demand relative to the average; 0.5 when there is no average.
pub fn demand_level(daily_demand: f64, average_daily_demand: f64) -> f64 {
    if average_daily_demand > 0.0 {
        let level = 0.5 * (daily_demand / average_daily_demand);
        if level.is_finite() {
            level.max(0.0)
        } else {
            0.5
        }
    } else {
        0.5
    }
}

/// Picks the algorithm per SKU, gathers its inputs, runs the engine and
/// persists the result.
pub struct PricingService {
    repo: Arc<dyn PricingRepository>,
    cache: Option<Arc<StrategyCache>>,
    calendar: Arc<dyn HolidayCalendar>,
    factor_policy: FactorPolicy,
    policy: ServicePolicy,
}

impl PricingService {
    pub fn new(repo: Arc<dyn PricingRepository>) -> Self {
        Self {
            repo,
            cache: None,
            calendar: Arc::new(NoHolidays),
            factor_policy: FactorPolicy::default(),
            policy: ServicePolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<StrategyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_calendar(mut self, calendar: Arc<dyn HolidayCalendar>) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_factor_policy(mut self, policy: FactorPolicy) -> Self {
        self.factor_policy = policy;
        self
    }

    pub fn with_policy(mut self, policy: ServicePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compute and persist a price valid from now.
    pub async fn calculate_price(&self, request: &PriceRequest) -> CoreResult<DynamicPrice> {
        self.calculate_price_at(request, Utc::now()).await
    }

    pub async fn calculate_price_at(
        &self,
        request: &PriceRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<DynamicPrice> {
        let sku_id = request.sku_id.as_str();
        let base_price = request.base_price;

        let strategy = self.resolve_strategy(sku_id, base_price).await?;
        let (min_price, max_price) = resolve_bounds(&strategy, base_price);

        let elasticity = self
            .repo
            .get_elasticity(sku_id)
            .await
            .map_err(PricingError::Repository)?
            .map(|e| e.elasticity)
            .unwrap_or(PriceElasticity::DEFAULT);

        let engine = PricingEngine::new(base_price, min_price, max_price, elasticity)?
            .with_policy(self.factor_policy.clone())
            .with_strategy_params(
                strategy.inventory_threshold,
                strategy.demand_threshold,
                strategy.competitor_price_offset,
            );

        let result = match strategy.strategy_type {
            StrategyType::ProfitMaximization => self.price_for_profit(&engine, sku_id).await?,
            StrategyType::Competitive => self.price_competitively(&engine, sku_id).await?,
            StrategyType::Dynamic => self.price_dynamically(&engine, request, now).await?,
            StrategyType::Fixed => engine.fixed_price(),
        };

        let price = DynamicPrice {
            id: Uuid::new_v4(),
            sku_id: sku_id.to_string(),
            base_price,
            final_price: result.final_price,
            price_adjustment: price_adjustment(result.final_price, base_price),
            inventory_factor: result.inventory_factor,
            demand_factor: result.demand_factor,
            competitor_factor: result.competitor_factor,
            time_factor: result.time_factor,
            user_factor: result.user_factor,
            strategy_type: strategy.strategy_type,
            effective_time: now,
            expiry_time: now + Duration::hours(self.policy.validity_hours.max(1)),
        };

        self.repo
            .save_dynamic_price(&price)
            .await
            .map_err(PricingError::Persistence)?;

        info!(
            sku_id,
            strategy = %price.strategy_type,
            base_price,
            final_price = price.final_price,
            "Dynamic price computed"
        );
        Ok(price)
    }

    /// Most recent persisted price, returned even when expired.
    pub async fn get_latest_price(&self, sku_id: &str) -> CoreResult<DynamicPrice> {
        let price = self
            .repo
            .latest_dynamic_price(sku_id)
            .await
            .map_err(PricingError::Repository)?
            .ok_or_else(|| PricingError::NotFound(format!("no price for sku {}", sku_id)))?;

        if price.is_expired_at(Utc::now()) {
            debug!(sku_id, expiry_time = %price.expiry_time, "Latest price has expired");
        }
        Ok(price)
    }

    pub async fn save_strategy(&self, strategy: &PricingStrategy) -> CoreResult<PricingStrategy> {
        validate_strategy(strategy)?;

        let stored = self
            .repo
            .save_strategy(strategy)
            .await
            .map_err(PricingError::Persistence)?;

        info!(
            strategy_id = ?stored.id,
            sku_id = ?stored.sku_id,
            strategy = %stored.strategy_type,
            "Pricing strategy saved"
        );

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.reload(self.repo.as_ref()).await {
                warn!("Strategy cache reload failed, keeping previous table: {}", e);
            }
        }

        Ok(stored)
    }

    /// Pages are normalized with [`page_bounds`].
    pub async fn list_strategies(
        &self,
        page: u32,
        page_size: u32,
    ) -> CoreResult<(Vec<PricingStrategy>, i64)> {
        let (page, page_size) = page_bounds(page, page_size);

        self.repo
            .list_strategies(page, page_size)
            .await
            .map_err(PricingError::Repository)
    }

    /// Rebuild the strategy cache from the repository.
    pub async fn reload_cache(&self) -> CoreResult<usize> {
        match &self.cache {
            Some(cache) => cache
                .reload(self.repo.as_ref())
                .await
                .map_err(PricingError::Repository),
            None => Ok(0),
        }
    }

    async fn resolve_strategy(&self, sku_id: &str, base_price: f64) -> CoreResult<PricingStrategy> {
        let snapshot = match &self.cache {
            Some(cache) => self.fresh_table(cache).await,
            None => None,
        };

        let stored = match snapshot {
            Some(table) => table.lookup(sku_id).cloned(),
            None => self
                .repo
                .get_strategy(sku_id)
                .await
                .map_err(PricingError::Repository)?,
        };

        match stored {
            Some(strategy) if strategy.enabled => Ok(strategy),
            _ => {
                debug!(sku_id, "No enabled strategy, using dynamic defaults");
                Ok(PricingStrategy::default_for(sku_id, base_price))
            }
        }
    }

    /// Cached table, reloaded first when missing or past its max age.
    async fn fresh_table(&self, cache: &StrategyCache) -> Option<Arc<StrategyTable>> {
        if let Some(table) = cache.fresh_snapshot() {
            return Some(table);
        }

        match cache.reload(self.repo.as_ref()).await {
            Ok(_) => cache.snapshot(),
            Err(e) => {
                warn!("Strategy cache reload failed, reading repository directly: {}", e);
                None
            }
        }
    }

    async fn price_for_profit(
        &self,
        engine: &PricingEngine,
        sku_id: &str,
    ) -> CoreResult<PricingResult> {
        let history: Vec<DemandData> = self
            .repo
            .recent_history(sku_id, self.policy.history_limit)
            .await
            .map_err(PricingError::Repository)?
            .into_iter()
            .map(|h| DemandData { price: h.price, demand: h.demand })
            .collect();

        let estimator = DemandEstimator::new(&history, engine.elasticity());
        let cost = engine.base_price() * self.policy.cost_ratio;
        let price = engine.optimal_price_for_profit(cost, estimator.as_fn());

        debug!(sku_id, cost, points = history.len(), price, "Profit search finished");
        Ok(PricingResult::neutral(price))
    }

    async fn price_competitively(
        &self,
        engine: &PricingEngine,
        sku_id: &str,
    ) -> CoreResult<PricingResult> {
        let prices = self
            .repo
            .get_competitor_info(sku_id)
            .await
            .map_err(PricingError::Repository)?
            .map(|info| info.prices())
            .unwrap_or_default();

        let price = engine.competitive_pricing(&prices, CompetitiveStrategy::Average);
        Ok(PricingResult::neutral(price))
    }

    async fn price_dynamically(
        &self,
        engine: &PricingEngine,
        request: &PriceRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<PricingResult> {
        let competitor_price = match request.competitor_price {
            Some(price) if price > 0.0 => price,
            _ => self
                .repo
                .get_competitor_info(&request.sku_id)
                .await
                .map_err(PricingError::Repository)?
                .and_then(|info| info.lowest_price())
                .unwrap_or(0.0),
        };

        let factors = PricingFactors {
            stock: request.current_stock,
            total_stock: request.total_stock,
            demand_level: demand_level(request.daily_demand, request.average_daily_demand),
            competitor_price,
            time_of_day: now.hour(),
            day_of_week: now.weekday().num_days_from_sunday(),
            is_holiday: self.calendar.is_holiday(now.date_naive()),
            user_level: tier_level(request.user_level.as_deref()),
            season_factor: 0.5,
        };

        Ok(engine.calculate_price(&factors))
    }
}

/// 1-based page and a page size where 0 means 20, capped at 100.
pub fn page_bounds(page: u32, page_size: u32) -> (u32, u32) {
    let page_size = match page_size {
        0 => 20,
        n => n.min(100),
    };
    (page.max(1), page_size)
}

/// Stored bounds, with non-positive values replaced by the half/double defaults.
pub fn resolve_bounds(strategy: &PricingStrategy, base_price: f64) -> (f64, f64) {
    let (default_min, default_max) = default_bounds(base_price);
    let min = if strategy.min_price > 0.0 {
        strategy.min_price
    } else {
        default_min
    };
    let max = if strategy.max_price > 0.0 {
        strategy.max_price
    } else {
        default_max
    };
    (min, max)
}

fn validate_strategy(strategy: &PricingStrategy) -> CoreResult<()> {
    let (min, max) = (strategy.min_price, strategy.max_price);
    let finite = min.is_finite() && max.is_finite();
    if !finite || (min > 0.0 && max > 0.0 && min > max) {
        return Err(PricingError::InvalidBounds { min, max });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use surge_core::models::{CompetitorPrice, CompetitorPriceInfo, PriceHistoryData};
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use surge_core::repository::RepoError;
    use surge_store::InMemoryPricingRepository;
    use tokio::sync::Notify;

    /// Wednesday, off-peak
    fn quiet_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap()
    }

    fn request(sku_id: &str, base_price: f64) -> PriceRequest {
        PriceRequest {
            sku_id: sku_id.to_string(),
            base_price,
            current_stock: 50,
            total_stock: 100,
            daily_demand: 100.0,
            average_daily_demand: 100.0,
            competitor_price: None,
            user_level: None,
        }
    }

    fn strategy(sku_id: &str, strategy_type: StrategyType, min: f64, max: f64) -> PricingStrategy {
        PricingStrategy {
            strategy_type,
            min_price: min,
            max_price: max,
            ..PricingStrategy::default_for(sku_id, 0.0)
        }
    }

    fn snapshot(sku_id: &str, prices: &[f64]) -> CompetitorPriceInfo {
        let now = quiet_time();
        CompetitorPriceInfo {
            sku_id: sku_id.to_string(),
            competitors: prices
                .iter()
                .enumerate()
                .map(|(i, p)| CompetitorPrice {
                    competitor: format!("shop-{}", i),
                    price: *p,
                    observed_at: now,
                })
                .collect(),
            captured_at: now,
        }
    }

    fn service(repo: &Arc<InMemoryPricingRepository>) -> PricingService {
        PricingService::new(repo.clone())
    }

    #[test]
    fn test_tier_levels() {
        assert_eq!(tier_level(Some("VIP")), 9);
        assert_eq!(tier_level(Some("Diamond")), 10);
        assert_eq!(tier_level(Some("Gold")), 7);
        assert_eq!(tier_level(Some("Silver")), 5);
        assert_eq!(tier_level(Some("bronze")), 1);
        assert_eq!(tier_level(None), 1);
        assert!(tier_level(Some("Diamond")) > tier_level(Some("VIP")));
    }

    #[test]
    fn test_demand_level() {
        assert_eq!(demand_level(150.0, 100.0), 0.75);
        assert_eq!(demand_level(150.0, 0.0), 0.5);
        assert_eq!(demand_level(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_resolve_bounds_defaults() {
        let unset = strategy("sku-1", StrategyType::Dynamic, 0.0, 0.0);
        assert_eq!(resolve_bounds(&unset, 100.0), (50.0, 200.0));

        let partial = strategy("sku-1", StrategyType::Dynamic, 80.0, 0.0);
        assert_eq!(resolve_bounds(&partial, 100.0), (80.0, 200.0));
    }

    #[tokio::test]
    async fn test_end_to_end_dynamic_scenario() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        service
            .save_strategy(&strategy("sku-tv", StrategyType::Dynamic, 5_000.0, 20_000.0))
            .await
            .unwrap();

        let req = PriceRequest {
            sku_id: "sku-tv".to_string(),
            base_price: 10_000.0,
            current_stock: 10,
            total_stock: 100,
            daily_demand: 150.0,
            average_daily_demand: 100.0,
            competitor_price: Some(11_000.0),
            user_level: Some("VIP".to_string()),
        };

        let price = service.calculate_price_at(&req, quiet_time()).await.unwrap();

        assert!(price.final_price > 10_000.0);
        assert!(price.final_price >= 5_000.0 && price.final_price <= 20_000.0);
        assert!(price.inventory_factor > 1.0);
        assert!(price.demand_factor > 1.0);
        assert!(price.competitor_factor > 1.0);
        assert!(price.user_factor < 1.0);
        assert_eq!(price.strategy_type, StrategyType::Dynamic);
        assert!((price.price_adjustment - price.final_price / 10_000.0).abs() < 1e-12);
        assert_eq!(price.expiry_time - price.effective_time, Duration::hours(24));

        let latest = service.get_latest_price("sku-tv").await.unwrap();
        assert_eq!(latest, price);
    }

    #[tokio::test]
    async fn test_missing_strategy_uses_dynamic_defaults() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let req = PriceRequest {
            current_stock: 0,
            total_stock: 100,
            daily_demand: 1_000.0,
            competitor_price: Some(10_000.0),
            ..request("sku-new", 100.0)
        };

        let price = service(&repo).calculate_price_at(&req, quiet_time()).await.unwrap();

        assert_eq!(price.strategy_type, StrategyType::Dynamic);
        assert!(price.final_price <= 200.0);
        assert!(price.final_price >= 50.0);
    }

    #[tokio::test]
    async fn test_zero_total_stock_is_neutral() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        service
            .save_strategy(&strategy("sku-1", StrategyType::Dynamic, 50.0, 200.0))
            .await
            .unwrap();

        let req = PriceRequest { current_stock: 0, total_stock: 0, ..request("sku-1", 100.0) };
        let price = service.calculate_price_at(&req, quiet_time()).await.unwrap();

        assert_eq!(price.inventory_factor, 1.0);
        assert_eq!(price.final_price, 100.0);
    }

    #[tokio::test]
    async fn test_disabled_strategy_is_ignored() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        let disabled = PricingStrategy {
            enabled: false,
            ..strategy("sku-1", StrategyType::Fixed, 10.0, 20.0)
        };
        service.save_strategy(&disabled).await.unwrap();

        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Dynamic);
        assert_eq!(price.final_price, 100.0);
    }

    #[tokio::test]
    async fn test_inverted_bounds_are_surfaced() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);

        let bad = strategy("sku-1", StrategyType::Dynamic, 300.0, 200.0);
        let err = service.save_strategy(&bad).await.unwrap_err();
        assert!(matches!(err, PricingError::InvalidBounds { .. }));

        // Bounds that only invert after defaulting are caught at pricing time
        repo.save_strategy(&strategy("sku-2", StrategyType::Dynamic, 500.0, 0.0))
            .await
            .unwrap();
        let err = service
            .calculate_price_at(&request("sku-2", 100.0), quiet_time())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PricingError::InvalidBounds { min, max } if min == 500.0 && max == 200.0
        ));
        assert!(repo.price_rows("sku-2").await.is_empty());
    }

    #[tokio::test]
    async fn test_profit_maximization_with_history() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        service
            .save_strategy(&strategy("sku-1", StrategyType::ProfitMaximization, 50.0, 200.0))
            .await
            .unwrap();

        let start = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        for (i, (price, demand)) in [(90.0, 110.0), (110.0, 90.0)].into_iter().enumerate() {
            repo.record_history(PriceHistoryData {
                sku_id: "sku-1".to_string(),
                date: start + Duration::days(i as i64),
                price,
                demand,
            })
            .await;
        }

        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();

        // Demand 200 - p with cost 70 peaks at 135
        assert!((price.final_price - 135.0).abs() < 0.01, "got {}", price.final_price);
        assert!(price.final_price >= 70.0);
        assert_eq!(price.strategy_type, StrategyType::ProfitMaximization);
        assert_eq!(price.inventory_factor, 1.0);
    }

    #[tokio::test]
    async fn test_profit_maximization_without_history_hits_max() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        service
            .save_strategy(&strategy("sku-1", StrategyType::ProfitMaximization, 50.0, 180.0))
            .await
            .unwrap();

        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.final_price, 180.0);
    }

    #[tokio::test]
    async fn test_competitive_uses_snapshot_average() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        service
            .save_strategy(&strategy("sku-1", StrategyType::Competitive, 50.0, 400.0))
            .await
            .unwrap();
        service
            .save_strategy(&strategy("sku-2", StrategyType::Competitive, 50.0, 400.0))
            .await
            .unwrap();
        repo.put_competitor_info(snapshot("sku-1", &[100.0, 200.0, 300.0])).await;

        let matched = service
            .calculate_price_at(&request("sku-1", 150.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(matched.final_price, 200.0);

        // No snapshot: base price, clamped
        let unmatched = service
            .calculate_price_at(&request("sku-2", 150.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(unmatched.final_price, 150.0);
    }

    #[tokio::test]
    async fn test_dynamic_falls_back_to_stored_lowest_price() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        repo.put_competitor_info(snapshot("sku-1", &[130.0, 120.0, 0.0])).await;

        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();

        let expected =
            surge_pricing::factors::competitor_factor(120.0, 100.0, &FactorPolicy::default());
        assert!((price.competitor_factor - expected).abs() < 1e-12);

        let explicit = PriceRequest { competitor_price: Some(90.0), ..request("sku-1", 100.0) };
        let price = service.calculate_price_at(&explicit, quiet_time()).await.unwrap();
        assert!(price.competitor_factor < 1.0);
    }

    #[tokio::test]
    async fn test_elasticity_is_read_per_sku() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        let req = PriceRequest { daily_demand: 150.0, ..request("sku-1", 100.0) };

        let default = service.calculate_price_at(&req, quiet_time()).await.unwrap();

        repo.put_elasticity(PriceElasticity {
            sku_id: "sku-1".to_string(),
            elasticity: 2.0,
            updated_at: quiet_time(),
        })
        .await;
        let elastic = service.calculate_price_at(&req, quiet_time()).await.unwrap();

        assert!(elastic.demand_factor > default.demand_factor);
    }

    #[tokio::test]
    async fn test_zero_base_price_adjustment() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let price = service(&repo)
            .calculate_price_at(&request("sku-free", 0.0), quiet_time())
            .await
            .unwrap();

        assert_eq!(price.final_price, 0.0);
        assert_eq!(price.price_adjustment, 1.0);
    }

    #[tokio::test]
    async fn test_expired_price_is_still_latest() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        let t0 = quiet_time();

        let price = service.calculate_price_at(&request("sku-1", 100.0), t0).await.unwrap();
        assert!(price.is_valid_at(t0));

        let later = t0 + Duration::hours(25);
        let latest = service.get_latest_price("sku-1").await.unwrap();
        assert_eq!(latest, price);
        assert!(!latest.is_valid_at(later));
        assert!(latest.is_expired_at(later));

        // Recomputing supersedes the expired row
        let fresh = service.calculate_price_at(&request("sku-1", 100.0), later).await.unwrap();
        assert_eq!(service.get_latest_price("sku-1").await.unwrap().id, fresh.id);
        assert_eq!(repo.price_rows("sku-1").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_sku_is_not_found() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let err = service(&repo).get_latest_price("ghost").await.unwrap_err();
        assert!(matches!(err, PricingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_strategies_pages() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo);
        for i in 0..3 {
            let sku = format!("sku-{}", i);
            service
                .save_strategy(&strategy(&sku, StrategyType::Fixed, 1.0, 2.0))
                .await
                .unwrap();
        }

        let (page, total) = service.list_strategies(0, 2).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        let (page, _) = service.list_strategies(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);

        let (page, _) = service.list_strategies(1, 0).await.unwrap();
        assert_eq!(page.len(), 3);
    }

    #[tokio::test]
    async fn test_cache_follows_saved_strategies() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let cache = Arc::new(StrategyCache::new());
        let service = PricingService::new(repo.clone()).with_cache(cache.clone());
        assert_eq!(service.reload_cache().await.unwrap(), 0);

        let saved = service
            .save_strategy(&strategy("sku-1", StrategyType::Fixed, 50.0, 200.0))
            .await
            .unwrap();
        let table = cache.snapshot().unwrap();
        assert_eq!(table.lookup("sku-1").unwrap().id, saved.id);

        // Writes behind the service's back stay invisible while the table is fresh
        repo.save_strategy(&PricingStrategy { strategy_type: StrategyType::Competitive, ..saved })
            .await
            .unwrap();
        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Fixed);

        service.reload_cache().await.unwrap();
        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Competitive);
    }

    #[tokio::test]
    async fn test_holiday_calendar_raises_time_factor() {
        struct EveryDay;
        impl HolidayCalendar for EveryDay {
            fn is_holiday(&self, _date: NaiveDate) -> bool {
                true
            }
        }

        let repo = Arc::new(InMemoryPricingRepository::new());
        let service = service(&repo).with_calendar(Arc::new(EveryDay));
        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert!((price.time_factor - 1.10).abs() < 1e-9);
    }

    /// Delegates reads, refuses writes
    struct ReadOnlyRepository(InMemoryPricingRepository);

    #[async_trait]
    impl PricingRepository for ReadOnlyRepository {
        async fn get_strategy(&self, sku_id: &str) -> Result<Option<PricingStrategy>, RepoError> {
            self.0.get_strategy(sku_id).await
        }

        async fn save_strategy(
            &self,
            _strategy: &PricingStrategy,
        ) -> Result<PricingStrategy, RepoError> {
            Err("database is read-only".into())
        }

        async fn list_strategies(
            &self,
            page: u32,
            page_size: u32,
        ) -> Result<(Vec<PricingStrategy>, i64), RepoError> {
            self.0.list_strategies(page, page_size).await
        }

        async fn all_strategies(&self) -> Result<Vec<PricingStrategy>, RepoError> {
            self.0.all_strategies().await
        }

        async fn get_elasticity(&self, sku_id: &str) -> Result<Option<PriceElasticity>, RepoError> {
            self.0.get_elasticity(sku_id).await
        }

        async fn get_competitor_info(
            &self,
            sku_id: &str,
        ) -> Result<Option<CompetitorPriceInfo>, RepoError> {
            self.0.get_competitor_info(sku_id).await
        }

        async fn recent_history(
            &self,
            sku_id: &str,
            limit: u32,
        ) -> Result<Vec<PriceHistoryData>, RepoError> {
            self.0.recent_history(sku_id, limit).await
        }

        async fn save_dynamic_price(&self, _price: &DynamicPrice) -> Result<(), RepoError> {
            Err("database is read-only".into())
        }

        async fn latest_dynamic_price(
            &self,
            sku_id: &str,
        ) -> Result<Option<DynamicPrice>, RepoError> {
            self.0.latest_dynamic_price(sku_id).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_is_surfaced() {
        let repo = Arc::new(ReadOnlyRepository(InMemoryPricingRepository::new()));
        let service = PricingService::new(repo.clone());

        let err = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::Persistence(_)));
        assert_eq!(err.to_string(), "Failed to persist: database is read-only");

        // Nothing was kept in memory either
        assert!(matches!(
            service.get_latest_price("sku-1").await.unwrap_err(),
            PricingError::NotFound(_)
        ));

        let err = service
            .save_strategy(&strategy("sku-1", StrategyType::Fixed, 1.0, 2.0))
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_disabled_sku_row_falls_back_to_default_row() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        repo.put_competitor_info(snapshot("sku-1", &[90.0, 130.0])).await;

        let plain = service(&repo);
        let cached = PricingService::new(repo.clone()).with_cache(Arc::new(StrategyCache::new()));

        let default_row = PricingStrategy {
            sku_id: None,
            ..strategy("unused", StrategyType::Competitive, 0.0, 0.0)
        };
        plain.save_strategy(&default_row).await.unwrap();
        let disabled = PricingStrategy {
            enabled: false,
            ..strategy("sku-1", StrategyType::Fixed, 10.0, 20.0)
        };
        plain.save_strategy(&disabled).await.unwrap();

        for service in [&plain, &cached] {
            let price = service
                .calculate_price_at(&request("sku-1", 100.0), quiet_time())
                .await
                .unwrap();
            assert_eq!(price.strategy_type, StrategyType::Competitive);
            assert_eq!(price.final_price, 110.0);
        }
    }

    #[tokio::test]
    async fn test_expired_cache_sees_writes_from_other_instances() {
        let repo = Arc::new(InMemoryPricingRepository::new());
        let writer = PricingService::new(repo.clone()).with_cache(Arc::new(StrategyCache::new()));
        let always_fresh = PricingService::new(repo.clone())
            .with_cache(Arc::new(StrategyCache::new().with_max_age(0)));
        let long_lived = PricingService::new(repo.clone())
            .with_cache(Arc::new(StrategyCache::new().with_max_age(3_600)));
        always_fresh.reload_cache().await.unwrap();
        long_lived.reload_cache().await.unwrap();

        writer
            .save_strategy(&strategy("sku-1", StrategyType::Fixed, 80.0, 90.0))
            .await
            .unwrap();

        let price = always_fresh
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Fixed);
        assert_eq!(price.final_price, 90.0);

        let price = long_lived
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Dynamic);
    }

    /// Holds the first armed `all_strategies` call until released
    struct GatedRepository {
        inner: InMemoryPricingRepository,
        armed: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PricingRepository for GatedRepository {
        async fn get_strategy(&self, sku_id: &str) -> Result<Option<PricingStrategy>, RepoError> {
            self.inner.get_strategy(sku_id).await
        }

        async fn save_strategy(
            &self,
            strategy: &PricingStrategy,
        ) -> Result<PricingStrategy, RepoError> {
            self.inner.save_strategy(strategy).await
        }

        async fn list_strategies(
            &self,
            page: u32,
            page_size: u32,
        ) -> Result<(Vec<PricingStrategy>, i64), RepoError> {
            self.inner.list_strategies(page, page_size).await
        }

        async fn all_strategies(&self) -> Result<Vec<PricingStrategy>, RepoError> {
            let rows = self.inner.all_strategies().await?;
            if self.armed.swap(false, AtomicOrdering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn get_elasticity(&self, sku_id: &str) -> Result<Option<PriceElasticity>, RepoError> {
            self.inner.get_elasticity(sku_id).await
        }

        async fn get_competitor_info(
            &self,
            sku_id: &str,
        ) -> Result<Option<CompetitorPriceInfo>, RepoError> {
            self.inner.get_competitor_info(sku_id).await
        }

        async fn recent_history(
            &self,
            sku_id: &str,
            limit: u32,
        ) -> Result<Vec<PriceHistoryData>, RepoError> {
            self.inner.recent_history(sku_id, limit).await
        }

        async fn save_dynamic_price(&self, price: &DynamicPrice) -> Result<(), RepoError> {
            self.inner.save_dynamic_price(price).await
        }

        async fn latest_dynamic_price(
            &self,
            sku_id: &str,
        ) -> Result<Option<DynamicPrice>, RepoError> {
            self.inner.latest_dynamic_price(sku_id).await
        }
    }

    #[tokio::test]
    async fn test_slow_reload_does_not_overwrite_newer_table() {
        let repo = Arc::new(GatedRepository {
            inner: InMemoryPricingRepository::new(),
            armed: AtomicBool::new(true),
            entered: Notify::new(),
            release: Notify::new(),
        });
        let cache = Arc::new(StrategyCache::new());
        let service = Arc::new(PricingService::new(repo.clone()).with_cache(cache));

        // First save reads the table, then stalls before installing it
        let first = tokio::spawn({
            let service = service.clone();
            async move {
                service
                    .save_strategy(&strategy("sku-1", StrategyType::Fixed, 80.0, 90.0))
                    .await
            }
        });
        repo.entered.notified().await;

        service
            .save_strategy(&strategy("sku-2", StrategyType::Competitive, 50.0, 200.0))
            .await
            .unwrap();
        repo.release.notify_one();
        first.await.unwrap().unwrap();

        let price = service
            .calculate_price_at(&request("sku-2", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Competitive);

        let price = service
            .calculate_price_at(&request("sku-1", 100.0), quiet_time())
            .await
            .unwrap();
        assert_eq!(price.strategy_type, StrategyType::Fixed);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(0, 0), (1, 20));
        assert_eq!(page_bounds(3, 500), (3, 100));
        assert_eq!(page_bounds(2, 15), (2, 15));
    }
}
