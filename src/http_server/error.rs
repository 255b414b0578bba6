use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{DomainError, find_domain_error};

// A generic error report
// Produced via `Err(some_err).wrap_err("Some context")`
// or `Err(DomainError::..)?` inside a service
pub struct Report(color_eyre::Report);

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl<E> From<E> for Report
where
    E: Into<color_eyre::Report>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) => StatusCode::BAD_REQUEST,
        DomainError::Unauthorized => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Malformed request bodies, paths and query strings are the client's fault.
fn rejection_message(err: &color_eyre::Report) -> Option<String> {
    err.chain().find_map(|cause| {
        if let Some(rejection) = cause.downcast_ref::<JsonRejection>() {
            Some(rejection.body_text())
        } else if let Some(rejection) = cause.downcast_ref::<PathRejection>() {
            Some(rejection.body_text())
        } else {
            cause
                .downcast_ref::<QueryRejection>()
                .map(QueryRejection::body_text)
        }
    })
}

// Tell axum how to convert `Report` into a response.
impl IntoResponse for Report {
    fn into_response(self) -> Response {
        let err = self.0;

        if let Some(domain_error) = find_domain_error(&err) {
            let status = domain_status(domain_error);
            tracing::debug!(%status, "Request failed: {domain_error}");
            return error_response(status, domain_error.to_string());
        }

        if let Some(message) = rejection_message(&err) {
            tracing::debug!("Rejected request: {message}");
            return error_response(StatusCode::BAD_REQUEST, message);
        }

        tracing::error!("{err:?}");

        // Fallback
        error_response(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    }
}
