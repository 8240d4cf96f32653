//! Provider discovery endpoint.

use axum::{extract::State, Json};
use docbridge_shared::{DiscoveryDocument, DOCUMENTS_PATH, SESSION_PATH};

use crate::state::AppState;

pub const PROTOCOL_VERSION: &str = "1";

/// Loading this document is the client's "library load" step.
pub async fn provider_document(State(state): State<AppState>) -> Json<DiscoveryDocument> {
    let base_url = state.base_url();

    Json(DiscoveryDocument {
        provider: format!("docbridge-server/{}", env!("CARGO_PKG_VERSION")),
        protocol_version: PROTOCOL_VERSION.to_string(),
        session_endpoint: format!("{base_url}{SESSION_PATH}"),
        documents_endpoint: format!("{base_url}{DOCUMENTS_PATH}"),
    })
}
