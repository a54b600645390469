//! Application state shared across handlers.

use std::sync::Arc;

use worker::Pipeline;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Same pipeline the workers run items through
    pub pipeline: Arc<Pipeline>,
    /// Credential attached to gateway fetches made on behalf of API callers
    pub credential: Option<String>,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            credential: None,
        }
    }

    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }
}
