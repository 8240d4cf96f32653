//! Session routes: handshake, status and teardown.

use argon2::{
    password_hash::{PasswordHash, PasswordVerifier},
    Argon2,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use docbridge_shared::{ConnectRequest, ConnectResponse, SessionStatusResponse};

use crate::db::session_is_live;
use crate::middleware::Session;
use crate::problem::{ApiResult, Problem};
use crate::state::AppState;
use crate::tokens::{generate_token, hash_token};

const BAD_CREDENTIALS: &str = "invalid client credentials";

/// Verify the client's API key and open a session.
///
/// A still-live `cachedToken` belonging to the same client is resumed
/// instead of minting a new one.
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> ApiResult<Json<ConnectResponse>> {
    let client_id = payload.client_id.trim();
    if client_id.is_empty() || payload.api_key.trim().is_empty() {
        return Err(Problem::bad_request("clientId and apiKey are required"));
    }
    tracing::info!("Handshake from client '{}'", client_id);

    let client = state
        .db
        .query("clients")
        .filter(|f| f.eq("client_id", client_id.to_string()))
        .collect()
        .await
        .map_err(|e| Problem::internal("Database error", e))?
        .into_iter()
        .next()
        .ok_or_else(|| Problem::unauthorized(BAD_CREDENTIALS))?;

    let stored_hash = client
        .data
        .get("api_key_hash")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let parsed_hash =
        PasswordHash::new(&stored_hash).map_err(|e| Problem::internal("Invalid key hash", e))?;
    Argon2::default()
        .verify_password(payload.api_key.trim().as_bytes(), &parsed_hash)
        .map_err(|_| Problem::unauthorized(BAD_CREDENTIALS))?;

    if let Some(cached) = payload.cached_token.as_deref() {
        if let Some(expires_at) = resumable(&state, client_id, cached).await? {
            tracing::debug!("Resumed session for client '{}'", client_id);
            return Ok(Json(ConnectResponse {
                connected: true,
                token: cached.to_string(),
                expires_at,
            }));
        }
    }

    let token = generate_token();
    let now = Utc::now();
    let ttl = chrono::Duration::from_std(state.config.session_ttl)
        .map_err(|e| Problem::internal("Invalid session TTL", e))?;
    let expires_at = now + ttl;

    state
        .db
        .insert_into(
            "sessions",
            vec![
                ("token_hash", hash_token(&token).into()),
                ("client_id", client_id.to_string().into()),
                ("created_at", now.to_rfc3339().into()),
                ("expires_at", expires_at.to_rfc3339().into()),
                ("revoked", "false".into()),
            ],
        )
        .await
        .map_err(|e| Problem::internal("Database error", e))?;

    Ok(Json(ConnectResponse {
        connected: true,
        token,
        expires_at,
    }))
}

/// Expiry of `token` if it is a live session of `client_id`.
async fn resumable(state: &AppState, client_id: &str, token: &str) -> ApiResult<Option<DateTime<Utc>>> {
    let Some(doc) = state
        .db
        .query("sessions")
        .filter(|f| f.eq("token_hash", hash_token(token)))
        .collect()
        .await
        .map_err(|e| Problem::internal("Database error", e))?
        .into_iter()
        .next()
    else {
        return Ok(None);
    };

    let field = |name: &str| doc.data.get(name).and_then(|v| v.as_str()).unwrap_or("").to_string();
    if field("client_id") != client_id || !session_is_live(&field("revoked"), &field("expires_at"), Utc::now()) {
        return Ok(None);
    }
    Ok(DateTime::parse_from_rfc3339(&field("expires_at"))
        .ok()
        .map(|t| t.with_timezone(&Utc)))
}

/// The extractor already rejected dead sessions, so reaching here means connected.
pub async fn session_status(session: Session) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse {
        connected: true,
        expires_at: Some(session.expires_at),
    })
}

pub async fn delete_session(State(state): State<AppState>, session: Session) -> ApiResult<StatusCode> {
    state
        .db
        .update_document("sessions", &session.doc_id, vec![("revoked", "true".into())])
        .await
        .map_err(|e| Problem::internal("Database error", e))?;

    tracing::info!("Session revoked for client '{}'", session.client_id);
    Ok(StatusCode::NO_CONTENT)
}
