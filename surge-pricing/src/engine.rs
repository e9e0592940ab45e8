use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use surge_core::{CoreResult, PricingError};
use tracing::warn;

use crate::demand::sanitize_elasticity;
use crate::factors::{self, FactorPolicy, PricingFactors};

/// Coarse grid resolution for the profit search
const GRID_STEPS: usize = 200;

/// Golden-section iterations used to refine the best grid cell
const REFINE_ITERATIONS: usize = 60;

/// Final price plus the multipliers that produced it
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricingResult {
    pub final_price: f64,
    pub inventory_factor: f64,
    pub demand_factor: f64,
    pub competitor_factor: f64,
    pub time_factor: f64,
    pub user_factor: f64,
}

impl PricingResult {
    /// A price with every factor at 1.0
    pub fn neutral(final_price: f64) -> Self {
        Self {
            final_price,
            inventory_factor: 1.0,
            demand_factor: 1.0,
            competitor_factor: 1.0,
            time_factor: 1.0,
            user_factor: 1.0,
        }
    }

    fn combined(&self) -> f64 {
        self.inventory_factor
            * self.demand_factor
            * self.competitor_factor
            * self.time_factor
            * self.user_factor
    }
}

/// How competitor prices are folded into one target price
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompetitiveStrategy {
    #[default]
    Average,
    Lowest,
    Median,
}

impl fmt::Display for CompetitiveStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompetitiveStrategy::Average => "average",
            CompetitiveStrategy::Lowest => "lowest",
            CompetitiveStrategy::Median => "median",
        };
        f.write_str(name)
    }
}

impl FromStr for CompetitiveStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" => Ok(CompetitiveStrategy::Average),
            "lowest" => Ok(CompetitiveStrategy::Lowest),
            "median" => Ok(CompetitiveStrategy::Median),
            other => Err(format!("unknown competitive strategy: {}", other)),
        }
    }
}

/// Bounded pricing for a single SKU.
///
/// Holds no mutable state; every operation ends by clamping into
/// `[min_price, max_price]`, and any non-finite intermediate falls back to the
/// clamped base price.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    base_price: f64,
    min_price: f64,
    max_price: f64,
    elasticity: f64,
    policy: FactorPolicy,
}

impl PricingEngine {
    pub fn new(
        base_price: f64,
        min_price: f64,
        max_price: f64,
        elasticity: f64,
    ) -> CoreResult<Self> {
        let finite = base_price.is_finite() && min_price.is_finite() && max_price.is_finite();
        if !finite || min_price > max_price {
            return Err(PricingError::InvalidBounds { min: min_price, max: max_price });
        }

        Ok(Self {
            base_price,
            min_price,
            max_price,
            elasticity: sanitize_elasticity(elasticity),
            policy: FactorPolicy::default(),
        })
    }

    /// Bounds of half and double the base price.
    pub fn with_default_bounds(base_price: f64, elasticity: f64) -> CoreResult<Self> {
        let (min, max) = default_bounds(base_price);
        Self::new(base_price, min, max, elasticity)
    }

    pub fn with_policy(mut self, policy: FactorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Apply the per-SKU knobs stored on a pricing strategy.
    pub fn with_strategy_params(
        mut self,
        inventory_threshold: f64,
        demand_threshold: f64,
        competitor_price_offset: f64,
    ) -> Self {
        if inventory_threshold.is_finite() && inventory_threshold > 0.0 {
            self.policy.inventory_threshold = inventory_threshold;
        }
        if demand_threshold.is_finite() && demand_threshold >= 0.0 {
            self.policy.demand_threshold = demand_threshold;
        }
        if competitor_price_offset.is_finite() {
            self.policy.competitor_price_offset = competitor_price_offset;
        }
        self
    }

    pub fn base_price(&self) -> f64 {
        self.base_price
    }

    pub fn min_price(&self) -> f64 {
        self.min_price
    }

    pub fn max_price(&self) -> f64 {
        self.max_price
    }

    pub fn elasticity(&self) -> f64 {
        self.elasticity
    }

    pub fn policy(&self) -> &FactorPolicy {
        &self.policy
    }

    /// Force a value into the configured bounds.
    pub fn clamp(&self, price: f64) -> f64 {
        price.max(self.min_price).min(self.max_price)
    }

    /// The clamped base price, used whenever a computation degenerates.
    pub fn fallback_price(&self) -> f64 {
        self.clamp(self.base_price)
    }

    /// Composite multi-factor price. Deterministic for identical inputs.
    pub fn calculate_price(&self, input: &PricingFactors) -> PricingResult {
        let policy = &self.policy;

        let result = PricingResult {
            final_price: 0.0,
            inventory_factor: factors::inventory_factor(input.stock, input.total_stock, policy),
            demand_factor: factors::demand_factor(input.demand_level, self.elasticity, policy),
            competitor_factor: factors::competitor_factor(
                input.competitor_price,
                self.base_price,
                policy,
            ),
            time_factor: factors::time_factor(
                input.time_of_day,
                input.day_of_week,
                input.is_holiday,
                input.season_factor,
                policy,
            ),
            user_factor: factors::user_factor(input.user_level, policy),
        };

        let raw = self.base_price * result.combined();
        if !raw.is_finite() {
            warn!(base_price = self.base_price, "Composite price was not finite, using base price");
            return PricingResult::neutral(self.fallback_price());
        }

        PricingResult {
            final_price: self.clamp(raw),
            ..result
        }
    }

    /// Price in `[min_price, max_price]` maximizing `(price - cost) * demand(price)`.
    ///
    /// Samples a fixed grid (ties go to the higher price), then refines around
    /// the best cell with a golden-section search.
    pub fn optimal_price_for_profit<F>(&self, cost: f64, demand_fn: F) -> f64
    where
        F: Fn(f64) -> f64,
    {
        let profit = |price: f64| (price - cost) * demand_fn(price);

        if self.max_price <= self.min_price {
            return self.min_price;
        }

        let span = self.max_price - self.min_price;
        let step = span / GRID_STEPS as f64;

        let mut best: Option<(f64, f64)> = None;
        for i in 0..=GRID_STEPS {
            let price = if i == GRID_STEPS {
                self.max_price
            } else {
                self.min_price + step * i as f64
            };
            let value = profit(price);
            if !value.is_finite() {
                continue;
            }
            match best {
                Some((_, best_value)) if value < best_value => {}
                _ => best = Some((price, value)),
            }
        }

        let Some((grid_price, grid_profit)) = best else {
            warn!(cost, "Profit curve had no finite samples, using base price");
            return self.fallback_price();
        };

        let lo = (grid_price - step).max(self.min_price);
        let hi = (grid_price + step).min(self.max_price);
        let (refined_price, refined_profit) = golden_section_max(&profit, lo, hi);

        let chosen = if refined_profit.is_finite() && refined_profit > grid_profit {
            refined_price
        } else {
            grid_price
        };

        if chosen.is_finite() {
            self.clamp(chosen)
        } else {
            self.fallback_price()
        }
    }

    /// Match the market using the given reduction of competitor prices.
    pub fn competitive_pricing(
        &self,
        competitor_prices: &[f64],
        strategy: CompetitiveStrategy,
    ) -> f64 {
        let mut prices: Vec<f64> = competitor_prices
            .iter()
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .collect();

        if prices.is_empty() {
            return self.fallback_price();
        }

        let target = match strategy {
            CompetitiveStrategy::Average => prices.iter().sum::<f64>() / prices.len() as f64,
            CompetitiveStrategy::Lowest => prices.iter().copied().fold(f64::INFINITY, f64::min),
            CompetitiveStrategy::Median => {
                prices.sort_by(|a, b| a.total_cmp(b));
                let mid = prices.len() / 2;
                if prices.len() % 2 == 0 {
                    (prices[mid - 1] + prices[mid]) / 2.0
                } else {
                    prices[mid]
                }
            }
        };

        if target.is_finite() {
            self.clamp(target)
        } else {
            self.fallback_price()
        }
    }

    /// Base price held steady, factors neutral.
    pub fn fixed_price(&self) -> PricingResult {
        PricingResult::neutral(self.fallback_price())
    }
}

/// Half and double the base price
pub fn default_bounds(base_price: f64) -> (f64, f64) {
    (base_price * 0.5, base_price * 2.0)
}

fn golden_section_max<F>(f: &F, mut a: f64, mut b: f64) -> (f64, f64)
where
    F: Fn(f64) -> f64,
{
    let inv_phi = (5f64.sqrt() - 1.0) / 2.0;

    let mut c = b - inv_phi * (b - a);
    let mut d = a + inv_phi * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);

    for _ in 0..REFINE_ITERATIONS {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - inv_phi * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + inv_phi * (b - a);
            fd = f(d);
        }
    }

    let x = (a + b) / 2.0;
    (x, f(x))
}
