use std::sync::Arc;

use crate::triage::service::InboxTriage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub triage: Arc<InboxTriage>,
}
