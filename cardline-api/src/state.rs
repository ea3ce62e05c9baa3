use cardline_order::FulfillmentOrchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<FulfillmentOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: FulfillmentOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}
