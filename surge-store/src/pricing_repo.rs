use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use surge_core::models::{
    CompetitorPrice, CompetitorPriceInfo, DynamicPrice, PriceElasticity, PriceHistoryData,
    PricingStrategy, StrategyType,
};
use surge_core::repository::{PricingRepository, RepoError};

const STRATEGY_COLUMNS: &str = "id, sku_id, strategy_type, min_price, max_price, \
     inventory_threshold, demand_threshold, competitor_price_offset, enabled, created_at, \
     updated_at";

const PRICE_COLUMNS: &str = "id, sku_id, base_price, final_price, price_adjustment, \
     inventory_factor, demand_factor, competitor_factor, time_factor, user_factor, \
     strategy_type, effective_time, expiry_time";

pub struct PgPricingRepository {
    pool: PgPool,
}

impl PgPricingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StrategyRow {
    id: Uuid,
    sku_id: Option<String>,
    strategy_type: String,
    min_price: f64,
    max_price: f64,
    inventory_threshold: f64,
    demand_threshold: f64,
    competitor_price_offset: f64,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StrategyRow> for PricingStrategy {
    type Error = RepoError;

    fn try_from(row: StrategyRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Some(row.id),
            sku_id: row.sku_id,
            strategy_type: row.strategy_type.parse::<StrategyType>()?,
            min_price: row.min_price,
            max_price: row.max_price,
            inventory_threshold: row.inventory_threshold,
            demand_threshold: row.demand_threshold,
            competitor_price_offset: row.competitor_price_offset,
            enabled: row.enabled,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    sku_id: String,
    base_price: f64,
    final_price: f64,
    price_adjustment: f64,
    inventory_factor: f64,
    demand_factor: f64,
    competitor_factor: f64,
    time_factor: f64,
    user_factor: f64,
    strategy_type: String,
    effective_time: DateTime<Utc>,
    expiry_time: DateTime<Utc>,
}

impl TryFrom<PriceRow> for DynamicPrice {
    type Error = RepoError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            sku_id: row.sku_id,
            base_price: row.base_price,
            final_price: row.final_price,
            price_adjustment: row.price_adjustment,
            inventory_factor: row.inventory_factor,
            demand_factor: row.demand_factor,
            competitor_factor: row.competitor_factor,
            time_factor: row.time_factor,
            user_factor: row.user_factor,
            strategy_type: row.strategy_type.parse::<StrategyType>()?,
            effective_time: row.effective_time,
            expiry_time: row.expiry_time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ElasticityRow {
    sku_id: String,
    elasticity: f64,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    sku_id: String,
    competitors: Json<Vec<CompetitorPrice>>,
    captured_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    sku_id: String,
    date: NaiveDate,
    price: f64,
    demand: f64,
}

#[async_trait]
impl PricingRepository for PgPricingRepository {
    async fn get_strategy(
        &self,
        sku_id: &str,
    ) -> Result<Option<PricingStrategy>, RepoError> {
        // Enabled SKU row wins over the enabled default row
        let sql = format!(
            "SELECT {} FROM pricing_strategies WHERE (sku_id = $1 OR sku_id IS NULL) AND enabled \
             ORDER BY sku_id NULLS LAST LIMIT 1",
            STRATEGY_COLUMNS
        );
        let row = sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(sku_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PricingStrategy::try_from).transpose()
    }

    async fn save_strategy(
        &self,
        strategy: &PricingStrategy,
    ) -> Result<PricingStrategy, RepoError> {
        let row = match strategy.id {
            None => {
                let sql = format!(
                    r#"
                    INSERT INTO pricing_strategies (id, sku_id, strategy_type, min_price, max_price,
                        inventory_threshold, demand_threshold, competitor_price_offset, enabled)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING {}
                    "#,
                    STRATEGY_COLUMNS
                );
                sqlx::query_as::<_, StrategyRow>(&sql)
                    .bind(Uuid::new_v4())
                    .bind(strategy.sku_id.as_deref())
                    .bind(strategy.strategy_type.as_str())
                    .bind(strategy.min_price)
                    .bind(strategy.max_price)
                    .bind(strategy.inventory_threshold)
                    .bind(strategy.demand_threshold)
                    .bind(strategy.competitor_price_offset)
                    .bind(strategy.enabled)
                    .fetch_one(&self.pool)
                    .await?
            }
            Some(id) => {
                let sql = format!(
                    r#"
                    UPDATE pricing_strategies
                    SET sku_id = $2, strategy_type = $3, min_price = $4, max_price = $5,
                        inventory_threshold = $6, demand_threshold = $7,
                        competitor_price_offset = $8, enabled = $9, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    STRATEGY_COLUMNS
                );
                sqlx::query_as::<_, StrategyRow>(&sql)
                    .bind(id)
                    .bind(strategy.sku_id.as_deref())
                    .bind(strategy.strategy_type.as_str())
                    .bind(strategy.min_price)
                    .bind(strategy.max_price)
                    .bind(strategy.inventory_threshold)
                    .bind(strategy.demand_threshold)
                    .bind(strategy.competitor_price_offset)
                    .bind(strategy.enabled)
                    .fetch_optional(&self.pool)
                    .await?
                    .ok_or_else(|| format!("strategy {} not found", id))?
            }
        };

        PricingStrategy::try_from(row)
    }

    async fn list_strategies(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<PricingStrategy>, i64), RepoError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pricing_strategies")
            .fetch_one(&self.pool)
            .await?;

        let offset = (page.max(1) as i64 - 1) * page_size as i64;
        let sql = format!(
            "SELECT {} FROM pricing_strategies ORDER BY created_at, id LIMIT $1 OFFSET $2",
            STRATEGY_COLUMNS
        );
        let rows = sqlx::query_as::<_, StrategyRow>(&sql)
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let strategies = rows
            .into_iter()
            .map(PricingStrategy::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((strategies, total))
    }

    async fn all_strategies(&self) -> Result<Vec<PricingStrategy>, RepoError> {
        let sql = format!(
            "SELECT {} FROM pricing_strategies ORDER BY created_at, id",
            STRATEGY_COLUMNS
        );
        let rows = sqlx::query_as::<_, StrategyRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PricingStrategy::try_from).collect()
    }

    async fn get_elasticity(
        &self,
        sku_id: &str,
    ) -> Result<Option<PriceElasticity>, RepoError> {
        let row = sqlx::query_as::<_, ElasticityRow>(
            "SELECT sku_id, elasticity, updated_at FROM price_elasticities WHERE sku_id = $1",
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PriceElasticity {
            sku_id: r.sku_id,
            elasticity: r.elasticity,
            updated_at: r.updated_at,
        }))
    }

    async fn get_competitor_info(
        &self,
        sku_id: &str,
    ) -> Result<Option<CompetitorPriceInfo>, RepoError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT sku_id, competitors, captured_at
            FROM competitor_price_snapshots
            WHERE sku_id = $1
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(sku_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| CompetitorPriceInfo {
            sku_id: r.sku_id,
            competitors: r.competitors.0,
            captured_at: r.captured_at,
        }))
    }

    async fn recent_history(
        &self,
        sku_id: &str,
        limit: u32,
    ) -> Result<Vec<PriceHistoryData>, RepoError> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT sku_id, date, price, demand
            FROM price_history
            WHERE sku_id = $1
            ORDER BY date DESC
            LIMIT $2
            "#,
        )
        .bind(sku_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PriceHistoryData {
                sku_id: r.sku_id,
                date: r.date,
                price: r.price,
                demand: r.demand,
            })
            .collect())
    }

    async fn save_dynamic_price(
        &self,
        price: &DynamicPrice,
    ) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO dynamic_prices (id, sku_id, base_price, final_price, price_adjustment,
                inventory_factor, demand_factor, competitor_factor, time_factor, user_factor,
                strategy_type, effective_time, expiry_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(price.id)
        .bind(&price.sku_id)
        .bind(price.base_price)
        .bind(price.final_price)
        .bind(price.price_adjustment)
        .bind(price.inventory_factor)
        .bind(price.demand_factor)
        .bind(price.competitor_factor)
        .bind(price.time_factor)
        .bind(price.user_factor)
        .bind(price.strategy_type.as_str())
        .bind(price.effective_time)
        .bind(price.expiry_time)
        .execute(&self.pool)
        .await?;

        debug!(sku_id = %price.sku_id, price_id = %price.id, "Dynamic price stored");
        Ok(())
    }

    async fn latest_dynamic_price(
        &self,
        sku_id: &str,
    ) -> Result<Option<DynamicPrice>, RepoError> {
        let sql = format!(
            "SELECT {} FROM dynamic_prices WHERE sku_id = $1 ORDER BY effective_time DESC LIMIT 1",
            PRICE_COLUMNS
        );
        let row = sqlx::query_as::<_, PriceRow>(&sql)
            .bind(sku_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DynamicPrice::try_from).transpose()
    }
}
