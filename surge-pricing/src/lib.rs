pub mod factors;
pub mod demand;
pub mod engine;

pub use factors::{FactorPolicy, PricingFactors};
pub use demand::{DemandData, DemandEstimator};
pub use engine::{CompetitiveStrategy, PricingEngine, PricingResult};
