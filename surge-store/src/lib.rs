pub mod database;
pub mod memory_repo;
pub mod pricing_repo;

pub use database::DbClient;
pub use memory_repo::InMemoryPricingRepository;
pub use pricing_repo::PgPricingRepository;
