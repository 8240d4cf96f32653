//! Bearer session extractor.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use docbridge_shared::parse_bearer;

use crate::db::session_is_live;
use crate::problem::Problem;
use crate::state::AppState;
use crate::tokens::hash_token;

/// A request carrying a live session token.
#[derive(Debug, Clone)]
pub struct Session {
    /// Aurora document id of the session row.
    pub doc_id: String,
    pub client_id: String,
    pub expires_at: DateTime<Utc>,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = Problem;

    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let app_state = AppState::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_bearer)
            .map(str::to_string);

        async move {
            let token = token.ok_or_else(|| Problem::unauthorized("missing bearer token"))?;
            let token_hash = hash_token(&token);

            let doc = app_state
                .db
                .query("sessions")
                .filter(|f| f.eq("token_hash", token_hash.clone()))
                .collect()
                .await
                .map_err(|e| Problem::internal("Database error", e))?
                .into_iter()
                .next()
                .ok_or_else(|| Problem::unauthorized("session token expired or revoked"))?;

            let field = |name: &str| {
                doc.data
                    .get(name)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string()
            };
            let revoked = field("revoked");
            let expires_at = field("expires_at");

            if !session_is_live(&revoked, &expires_at, Utc::now()) {
                tracing::debug!("Rejected dead session for client '{}'", field("client_id"));
                return Err(Problem::unauthorized("session token expired or revoked"));
            }

            let expires_at = DateTime::parse_from_rfc3339(&expires_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| Problem::internal("Corrupt session row", e))?;

            Ok(Session {
                doc_id: doc.id.clone(),
                client_id: field("client_id"),
                expires_at,
            })
        }
    }
}
