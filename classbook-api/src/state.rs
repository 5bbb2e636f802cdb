use classbook_booking::CancellationOrchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CancellationOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<CancellationOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
