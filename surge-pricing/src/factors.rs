use serde::{Deserialize, Serialize};

/// Raw signals for one pricing decision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingFactors {
    pub stock: i64,
    pub total_stock: i64,

    /// Demand ratio where 0.5 is baseline
    pub demand_level: f64,

    /// 0 means unknown
    pub competitor_price: f64,

    /// Hour of day, 0-23
    pub time_of_day: u32,

    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u32,

    pub is_holiday: bool,

    /// Loyalty ordinal, 1-10
    pub user_level: u32,

    /// 0-1, 0.5 is neutral
    pub season_factor: f64,
}

impl Default for PricingFactors {
    fn default() -> Self {
        Self {
            stock: 0,
            total_stock: 0,
            demand_level: 0.5,
            competitor_price: 0.0,
            time_of_day: 12,
            day_of_week: 3,
            is_holiday: false,
            user_level: 1,
            season_factor: 0.5,
        }
    }
}

/// Tuning knobs for the factor model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FactorPolicy {
    /// Stock ratio below which scarcity pricing kicks in
    pub inventory_threshold: f64,
    /// Extra multiplier reached when stock hits zero
    pub scarcity_premium: f64,

    /// Dead band around the 0.5 demand baseline
    pub demand_threshold: f64,
    pub demand_sensitivity: f64,
    pub demand_floor: f64,
    pub demand_ceiling: f64,

    /// Absolute amount added to the competitor price before pulling toward it
    pub competitor_price_offset: f64,
    pub competitor_pull: f64,
    pub competitor_max_swing: f64,

    pub peak_start_hour: u32,
    pub peak_end_hour: u32,
    pub peak_multiplier: f64,
    pub weekend_multiplier: f64,
    pub holiday_multiplier: f64,
    pub season_weight: f64,

    /// Discount per loyalty level above 1
    pub loyalty_step: f64,
}

impl Default for FactorPolicy {
    fn default() -> Self {
        Self {
            inventory_threshold: 0.3,
            scarcity_premium: 0.5,
            demand_threshold: 0.0,
            demand_sensitivity: 0.4,
            demand_floor: 0.7,
            demand_ceiling: 1.5,
            competitor_price_offset: 0.0,
            competitor_pull: 0.3,
            competitor_max_swing: 0.2,
            peak_start_hour: 18,
            peak_end_hour: 22,
            peak_multiplier: 1.05,
            weekend_multiplier: 1.0,
            holiday_multiplier: 1.10,
            season_weight: 0.1,
            loyalty_step: 0.005,
        }
    }
}

/// Scarcity premium: grows linearly as the stock ratio drops under the threshold.
pub fn inventory_factor(stock: i64, total_stock: i64, policy: &FactorPolicy) -> f64 {
    if total_stock <= 0 {
        return 1.0;
    }
    let threshold = policy.inventory_threshold;
    if !(threshold > 0.0) {
        return 1.0;
    }

    let ratio = (stock.max(0) as f64 / total_stock as f64).clamp(0.0, 1.0);
    if ratio >= threshold {
        return 1.0;
    }

    1.0 + policy.scarcity_premium * (threshold - ratio) / threshold
}

pub fn demand_factor(demand_level: f64, elasticity: f64, policy: &FactorPolicy) -> f64 {
    let deviation = demand_level - 0.5;
    if !deviation.is_finite() || deviation.abs() <= policy.demand_threshold {
        return 1.0;
    }

    let factor = 1.0 + deviation * elasticity * policy.demand_sensitivity;
    factor.max(policy.demand_floor).min(policy.demand_ceiling)
}

/// Pull toward `competitor_price + offset`, bounded to a symmetric swing.
pub fn competitor_factor(competitor_price: f64, base_price: f64, policy: &FactorPolicy) -> f64 {
    if !(competitor_price > 0.0) || !(base_price > 0.0) {
        return 1.0;
    }

    let target = competitor_price + policy.competitor_price_offset;
    let factor = 1.0 + policy.competitor_pull * (target / base_price - 1.0);
    factor
        .max(1.0 - policy.competitor_max_swing)
        .min(1.0 + policy.competitor_max_swing)
}

pub fn time_factor(
    time_of_day: u32,
    day_of_week: u32,
    is_holiday: bool,
    season_factor: f64,
    policy: &FactorPolicy,
) -> f64 {
    let mut factor = 1.0;

    if (policy.peak_start_hour..=policy.peak_end_hour).contains(&time_of_day) {
        factor *= policy.peak_multiplier;
    }
    if day_of_week == 0 || day_of_week == 6 {
        factor *= policy.weekend_multiplier;
    }
    if is_holiday {
        factor *= policy.holiday_multiplier;
    }

    let season = season_factor.clamp(0.0, 1.0);
    factor * (1.0 + policy.season_weight * (season - 0.5))
}

/// Loyalty discount; level 1 pays full price.
pub fn user_factor(user_level: u32, policy: &FactorPolicy) -> f64 {
    let level = user_level.clamp(1, 10);
    1.0 - policy.loyalty_step * (level - 1) as f64
}
