use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::ApiResponse;
use thiserror::Error;

use crate::domain::rules::DriveRuleViolation;
use crate::domain::vaccination_service::VaccinationError;

/// API error taxonomy, mapped onto the `{success: false, message}` envelope.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or malformed request field.
    #[error("{0}")]
    Validation(String),

    /// Unknown id. The payload names the entity kind, e.g. "Student".
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A drive scheduling rule was violated.
    #[error(transparent)]
    Rule(#[from] DriveRuleViolation),

    /// A vaccination transaction precondition failed.
    #[error(transparent)]
    Vaccination(#[from] VaccinationError),

    /// Storage or other internal failure. Logged, never surfaced verbatim.
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Rule(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Vaccination(e) => match e {
                VaccinationError::StudentNotFound | VaccinationError::DriveNotFound => {
                    StatusCode::NOT_FOUND
                }
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref source) = self {
            tracing::error!("Internal error: {source:?}");
        }

        let body = Json(ApiResponse::<()>::failure(self.to_string()));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(ApiError::Validation("bad".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("Student").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Rule(DriveRuleViolation::TooSoon).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Vaccination(VaccinationError::StudentNotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Vaccination(VaccinationError::NoDosesAvailable).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(ApiError::NotFound("Student").to_string(), "Student not found");
        assert_eq!(
            ApiError::NotFound("Vaccination drive").to_string(),
            "Vaccination drive not found"
        );
    }
}
