use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced across the registry. Every variant maps to exactly one HTTP
/// status code and one OCI distribution error code (spec.md §7).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized")]
    Unauthorized {
        anonymous_pull_attempt: bool,
        /// External origin (`<scheme>://<host>[:<port>]`) to use as the
        /// `WWW-Authenticate` realm — spec.md §4.E requires an absolute URL.
        realm: String,
    },

    #[error("denied")]
    Denied,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("digest mismatch, expected: {expected} got: {got}")]
    DigestMismatch { expected: String, got: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound => "NOT_FOUND",
            RegistryError::Unauthorized { .. } => "UNAUTHORIZED",
            RegistryError::Denied => "DENIED",
            RegistryError::BadRequest(_) => "BAD_REQUEST",
            RegistryError::DigestMismatch { .. } => "INTERNAL",
            RegistryError::Io(_) => "INTERNAL",
            RegistryError::Json(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            RegistryError::NotFound => StatusCode::NOT_FOUND,
            RegistryError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            RegistryError::Denied => StatusCode::FORBIDDEN,
            RegistryError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::DigestMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RegistryError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::NOT_FOUND {
            // Missing blob/manifest/route: empty body, per spec.md §7.
            return status.into_response();
        }

        let code = self.code();
        let message = self.to_string();
        let mut response = (
            status,
            Json(json!({
                "errors": [{
                    "code": code,
                    "message": message,
                    "detail": null,
                }]
            })),
        )
            .into_response();

        if let RegistryError::Unauthorized {
            anonymous_pull_attempt,
            realm,
        } = &self
        {
            crate::http::headers::apply_unauthorized_challenge(
                response.headers_mut(),
                *anonymous_pull_attempt,
                realm,
            );
        }

        response
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;
