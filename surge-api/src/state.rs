use std::sync::Arc;
use surge_strategy::PricingService;

#[derive(Clone)]
pub struct AppState {
    pub pricing: Arc<PricingService>,
}

impl AppState {
    pub fn new(pricing: PricingService) -> Self {
        Self { pricing: Arc::new(pricing) }
    }
}
