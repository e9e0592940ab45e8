use async_trait::async_trait;
use crate::models::{
    CompetitorPriceInfo, DynamicPrice, PriceElasticity, PriceHistoryData, PricingStrategy,
};

/// Backend error carried through unchanged from the storage layer
pub type RepoError = Box<dyn std::error::Error + Send + Sync>;

/// Storage contract the pricing service reads from and writes to.
///
/// Implementations own any per-SKU consistency guarantees; the service never
/// wraps reads and the final write in a transaction.
#[async_trait]
pub trait PricingRepository: Send + Sync {
    /// Enabled strategy for the SKU, else the enabled default row (no SKU).
    async fn get_strategy(
        &self,
        sku_id: &str,
    ) -> Result<Option<PricingStrategy>, RepoError>;

    /// Create when `id` is absent, update otherwise. Returns the stored row.
    async fn save_strategy(
        &self,
        strategy: &PricingStrategy,
    ) -> Result<PricingStrategy, RepoError>;

    /// One page of strategies (1-based) plus the total count.
    async fn list_strategies(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<PricingStrategy>, i64), RepoError>;

    /// Every stored strategy, used for whole-table cache reloads.
    async fn all_strategies(&self) -> Result<Vec<PricingStrategy>, RepoError>;

    async fn get_elasticity(
        &self,
        sku_id: &str,
    ) -> Result<Option<PriceElasticity>, RepoError>;

    async fn get_competitor_info(
        &self,
        sku_id: &str,
    ) -> Result<Option<CompetitorPriceInfo>, RepoError>;

    /// At most `limit` history points, newest first.
    async fn recent_history(
        &self,
        sku_id: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryData>, RepoError>;

    /// Append a computed price. Rows are never updated.
    async fn save_dynamic_price(
        &self,
        price: &DynamicPrice,
    ) -> Result<(), RepoError>;

    /// Most recent row by `effective_time`, expired or not.
    async fn latest_dynamic_price(
        &self,
        sku_id: &str,
    ) -> Result<Option<DynamicPrice>, RepoError>;
}
