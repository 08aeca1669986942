use std::sync::Arc;

use crate::services::classifier::Classifier;
use crate::services::controller::JobController;
use crate::services::history::HistoryStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub controller: JobController,
    pub history: Arc<HistoryStore>,
    pub classifier: Arc<dyn Classifier>,
}

impl AppState {
    pub fn new(
        controller: JobController,
        history: Arc<HistoryStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            controller,
            history,
            classifier,
        }
    }
}
