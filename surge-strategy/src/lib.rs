pub mod cache;
pub mod orchestrator;

pub use cache::{StrategyCache, StrategyTable, DEFAULT_MAX_AGE_SECS};
pub use orchestrator::{page_bounds, HolidayCalendar, NoHolidays, PricingService, ServicePolicy};
