pub mod models;
pub mod repository;

pub use models::{
    CompetitorPrice, CompetitorPriceInfo, DynamicPrice, PriceElasticity, PriceHistoryData,
    PriceRequest, PricingStrategy, StrategyType,
};
pub use repository::{PricingRepository, RepoError};

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid price bounds: min {min} exceeds max {max}")]
    InvalidBounds { min: f64, max: f64 },
    #[error("Failed to persist: {0}")]
    Persistence(#[source] RepoError),
    #[error("Repository lookup failed: {0}")]
    Repository(#[source] RepoError),
}

pub type CoreResult<T> = Result<T, PricingError>;
