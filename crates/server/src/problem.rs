//! RFC7807 error responses.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use docbridge_shared::{ProblemDetails, PROBLEM_CONTENT_TYPE};

/// A failed `/api/*` request, rendered as `application/problem+json`.
#[derive(Debug)]
pub struct Problem(pub ProblemDetails);

pub type ApiResult<T> = Result<T, Problem>;

impl Problem {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::bad_request(detail))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::unauthorized(detail))
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self(ProblemDetails::not_found(detail))
    }

    /// Log the cause and answer with a generic 500.
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", context, err);
        Self(ProblemDetails::internal_error(context.to_string()))
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for Problem {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)], Json(self.0)).into_response()
    }
}
