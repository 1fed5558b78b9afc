use std::sync::Arc;

use crate::pipeline::Pipeline;
use crate::worker::JobQueue;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub queue: JobQueue,
}
