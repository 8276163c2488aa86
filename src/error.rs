use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid session state: {0}")]
    InvalidSessionState(String),

    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidSessionState(_) => "invalid_session_state",
            Error::UnknownReference(_) => "unknown_reference",
            Error::UnsupportedConfiguration(_) => "unsupported_configuration",
            Error::GenerationUnavailable(_) => "generation_unavailable",
            Error::NotAuthorized(_) => "not_authorized",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::NotFound(_) => "not_found",
            Error::Reqwest(_) => "upstream_error",
            _ => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::InvalidSessionState(_) => StatusCode::CONFLICT,
            Error::UnknownReference(_) | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::UnsupportedConfiguration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::GenerationUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::NotAuthorized(_) => StatusCode::FORBIDDEN,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::Reqwest(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Error::Database(err) => {
                tracing::error!(error = ?err, "database error");
                "An unexpected error occurred".to_string()
            }
            Error::Config(_) | Error::Migrate(_) | Error::Anyhow(_) | Error::Internal(_) => {
                tracing::error!(error = %self, "internal error");
                "An unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({ "error": self.code(), "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_distinct_statuses() {
        assert_eq!(
            Error::InvalidSessionState("expired".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::UnknownReference("q".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::UnsupportedConfiguration("lang".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            Error::GenerationUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(Error::NotAuthorized("x".into()).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn row_not_found_becomes_not_found() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.code(), "not_found");
    }
}
