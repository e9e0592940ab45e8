use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use surge_core::models::{
    CompetitorPriceInfo, DynamicPrice, PriceElasticity, PriceHistoryData, PricingStrategy,
};
use surge_core::repository::{PricingRepository, RepoError};

/// Process-local repository, used in tests and when no database is configured.
#[derive(Default)]
pub struct InMemoryPricingRepository {
    strategies: RwLock<HashMap<Uuid, PricingStrategy>>,
    elasticities: RwLock<HashMap<String, PriceElasticity>>,
    competitors: RwLock<HashMap<String, CompetitorPriceInfo>>,
    history: RwLock<HashMap<String, Vec<PriceHistoryData>>>,
    prices: RwLock<HashMap<String, Vec<DynamicPrice>>>,
}

impl InMemoryPricingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_elasticity(&self, elasticity: PriceElasticity) {
        self.elasticities
            .write()
            .await
            .insert(elasticity.sku_id.clone(), elasticity);
    }

    /// Replaces any earlier snapshot for the SKU.
    pub async fn put_competitor_info(&self, info: CompetitorPriceInfo) {
        self.competitors.write().await.insert(info.sku_id.clone(), info);
    }

    pub async fn record_history(&self, point: PriceHistoryData) {
        self.history
            .write()
            .await
            .entry(point.sku_id.clone())
            .or_default()
            .push(point);
    }

    /// Every computed price for a SKU in insertion order.
    pub async fn price_rows(&self, sku_id: &str) -> Vec<DynamicPrice> {
        self.prices
            .read()
            .await
            .get(sku_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn sorted(strategies: &HashMap<Uuid, PricingStrategy>) -> Vec<PricingStrategy> {
    let mut rows: Vec<PricingStrategy> = strategies.values().cloned().collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    rows
}

#[async_trait]
impl PricingRepository for InMemoryPricingRepository {
    async fn get_strategy(
        &self,
        sku_id: &str,
    ) -> Result<Option<PricingStrategy>, RepoError> {
        let strategies = self.strategies.read().await;

        let specific = strategies
            .values()
            .find(|s| s.enabled && s.sku_id.as_deref() == Some(sku_id));
        if let Some(strategy) = specific {
            return Ok(Some(strategy.clone()));
        }

        Ok(strategies
            .values()
            .find(|s| s.enabled && s.sku_id.is_none())
            .cloned())
    }

    async fn save_strategy(
        &self,
        strategy: &PricingStrategy,
    ) -> Result<PricingStrategy, RepoError> {
        let mut strategies = self.strategies.write().await;
        let now = Utc::now();

        let clash = strategies
            .values()
            .any(|s| s.sku_id == strategy.sku_id && s.id != strategy.id);
        if clash {
            return Err(format!(
                "strategy already exists for sku {}",
                strategy.sku_id.as_deref().unwrap_or("<default>")
            )
            .into());
        }

        let stored = match strategy.id {
            None => PricingStrategy {
                id: Some(Uuid::new_v4()),
                created_at: Some(now),
                updated_at: Some(now),
                ..strategy.clone()
            },
            Some(id) => {
                let existing = strategies
                    .get(&id)
                    .ok_or_else(|| format!("strategy {} not found", id))?;
                PricingStrategy {
                    created_at: existing.created_at,
                    updated_at: Some(now),
                    ..strategy.clone()
                }
            }
        };

        if let Some(id) = stored.id {
            strategies.insert(id, stored.clone());
        }
        Ok(stored)
    }

    async fn list_strategies(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<PricingStrategy>, i64), RepoError> {
        let strategies = self.strategies.read().await;
        let total = strategies.len() as i64;

        let offset = (page.max(1) as usize - 1) * page_size as usize;
        let rows = sorted(&strategies)
            .into_iter()
            .skip(offset)
            .take(page_size as usize)
            .collect();

        Ok((rows, total))
    }

    async fn all_strategies(&self) -> Result<Vec<PricingStrategy>, RepoError> {
        Ok(sorted(&*self.strategies.read().await))
    }

    async fn get_elasticity(
        &self,
        sku_id: &str,
    ) -> Result<Option<PriceElasticity>, RepoError> {
        Ok(self.elasticities.read().await.get(sku_id).cloned())
    }

    async fn get_competitor_info(
        &self,
        sku_id: &str,
    ) -> Result<Option<CompetitorPriceInfo>, RepoError> {
        Ok(self.competitors.read().await.get(sku_id).cloned())
    }

    async fn recent_history(
        &self,
        sku_id: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryData>, RepoError> {
        let history = self.history.read().await;
        let mut points = history.get(sku_id).cloned().unwrap_or_default();
        points.sort_by(|a, b| b.date.cmp(&a.date));
        points.truncate(limit as usize);
        Ok(points)
    }

    async fn save_dynamic_price(
        &self,
        price: &DynamicPrice,
    ) -> Result<(), RepoError> {
        self.prices
            .write()
            .await
            .entry(price.sku_id.clone())
            .or_default()
            .push(price.clone());
        Ok(())
    }

    async fn latest_dynamic_price(
        &self,
        sku_id: &str,
    ) -> Result<Option<DynamicPrice>, RepoError> {
        let prices = self.prices.read().await;
        let latest = prices
            .get(sku_id)
            .and_then(|rows| rows.iter().max_by_key(|p| p.effective_time))
            .cloned();
        Ok(latest)
    }
}
