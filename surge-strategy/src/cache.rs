use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use surge_core::models::PricingStrategy;
use surge_core::repository::{PricingRepository, RepoError};

/// Seconds a loaded table is trusted before the next lookup reloads it
pub const DEFAULT_MAX_AGE_SECS: u64 = 30;

/// Immutable strategy table, keyed by SKU (`None` is the default row)
#[derive(Debug)]
pub struct StrategyTable {
    strategies: HashMap<Option<String>, PricingStrategy>,
    loaded_at: DateTime<Utc>,
    generation: u64,
}

impl StrategyTable {
    pub fn from_strategies(strategies: Vec<PricingStrategy>, loaded_at: DateTime<Utc>) -> Self {
        let strategies = strategies
            .into_iter()
            .map(|s| (s.sku_id.clone(), s))
            .collect();
        Self {
            strategies,
            loaded_at,
            generation: 0,
        }
    }

    /// Enabled SKU row first, then the enabled default row.
    pub fn lookup(&self, sku_id: &str) -> Option<&PricingStrategy> {
        self.strategies
            .get(&Some(sku_id.to_string()))
            .filter(|s| s.enabled)
            .or_else(|| self.strategies.get(&None).filter(|s| s.enabled))
    }

    pub(crate) fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_stale(&self, max_age_secs: u64, now: DateTime<Utc>) -> bool {
        let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);
        (now - self.loaded_at).num_seconds() >= max_age
    }
}

/// Read-mostly strategy cache.
///
/// Readers take an `Arc` snapshot; `reload` builds a full replacement table and
/// swaps it in under a single write. Every reload draws a generation before it
/// reads the repository, and a table never replaces one from a later generation.
#[derive(Debug)]
pub struct StrategyCache {
    table: RwLock<Option<Arc<StrategyTable>>>,
    next_generation: AtomicU64,
    max_age_secs: u64,
}

impl Default for StrategyCache {
    fn default() -> Self {
        Self {
            table: RwLock::new(None),
            next_generation: AtomicU64::new(1),
            max_age_secs: DEFAULT_MAX_AGE_SECS,
        }
    }
}

impl StrategyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0 reloads on every lookup.
    pub fn with_max_age(mut self, max_age_secs: u64) -> Self {
        self.max_age_secs = max_age_secs;
        self
    }

    /// Current table, or `None` before the first successful reload.
    pub fn snapshot(&self) -> Option<Arc<StrategyTable>> {
        self.table
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current table if it was loaded within the max age.
    pub fn fresh_snapshot(&self) -> Option<Arc<StrategyTable>> {
        self.snapshot()
            .filter(|table| !table.is_stale(self.max_age_secs, Utc::now()))
    }

    /// Install `table` unless a newer generation is already in place.
    /// Returns whether the table was installed.
    pub fn replace(&self, mut table: StrategyTable) -> bool {
        if table.generation == 0 {
            table.generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        }

        let mut current = self
            .table
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = current.as_ref() {
            if existing.generation > table.generation {
                return false;
            }
        }
        *current = Some(Arc::new(table));
        true
    }

    pub async fn reload(&self, repo: &dyn PricingRepository) -> Result<usize, RepoError> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let strategies = repo.all_strategies().await?;

        let mut table = StrategyTable::from_strategies(strategies, Utc::now());
        table.generation = generation;
        let count = table.len();

        if self.replace(table) {
            info!(count, generation, "Strategy cache reloaded");
        } else {
            debug!(generation, "Discarded strategy table overtaken by a newer reload");
        }
        Ok(count)
    }
}
