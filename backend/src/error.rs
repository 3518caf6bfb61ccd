use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ApiResponse;

/// Erreurs remontées à la frontière HTTP.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Not found")]
    NotFound,

    #[error("Payload too large (limit: {0} bytes)")]
    PayloadTooLarge(usize),

    /// Échec de `predict` côté fournisseur de modèle.
    #[error("{0}")]
    ModelInvocation(String),

    /// Un type non convertible a atteint le codec de réponse.
    #[error("Unserializable model output: {0}")]
    SerializationViolation(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelInvocation(_) | ApiError::SerializationViolation(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiResponse::error(&self.to_string()))
    }
}

impl From<ModelError> for ApiError {
    fn from(e: ModelError) -> Self {
        ApiError::ModelInvocation(e.to_string())
    }
}

/// Erreurs des fournisseurs de modèle.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("feature '{name}' is not numeric: {value}")]
    NonNumericFeature { name: String, value: String },

    #[error("model returned {got} predictions for {expected} records")]
    OutputLength { expected: usize, got: usize },

    #[error("invalid model definition: {0}")]
    InvalidDefinition(String),

    #[error("model lock poisoned")]
    LockPoisoned,

    #[error("{0}")]
    Backend(String),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
