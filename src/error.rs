//! Error types for the application

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Machine-readable codes attached to business-rule failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DossierNotFound,
    DossierCannotBeModified,
    DossierCannotBeDeleted,
    DossierAlreadyExistsForWorker,
    CategoryNotFound,
    ReceivingWorkerNotFound,
    SignatureNotFound,
    UserNotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DossierNotFound => "DOSSIER_NOT_FOUND",
            ErrorCode::DossierCannotBeModified => "DOSSIER_CANNOT_BE_MODIFIED",
            ErrorCode::DossierCannotBeDeleted => "DOSSIER_CANNOT_BE_DELETED",
            ErrorCode::DossierAlreadyExistsForWorker => "DOSSIER_ALREADY_EXISTS_FOR_WORKER",
            ErrorCode::CategoryNotFound => "CATEGORY_NOT_FOUND",
            ErrorCode::ReceivingWorkerNotFound => "RECEIVING_WORKER_NOT_FOUND",
            ErrorCode::SignatureNotFound => "SIGNATURE_NOT_FOUND",
            ErrorCode::UserNotFound => "USER_NOT_FOUND",
        }
    }

    /// Default human-readable detail for the code
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::DossierNotFound => {
                "The dossier with the specified id is not registered for the user"
            }
            ErrorCode::DossierCannotBeModified => {
                "The dossier cannot be modified because it has already been signed"
            }
            ErrorCode::DossierCannotBeDeleted => {
                "The dossier cannot be deleted because it has already been signed"
            }
            ErrorCode::DossierAlreadyExistsForWorker => {
                "The worker already has a dossier that has not been released"
            }
            ErrorCode::CategoryNotFound => "The evidence category is not registered",
            ErrorCode::ReceivingWorkerNotFound => {
                "The receiving worker with the specified employee number is not registered"
            }
            ErrorCode::SignatureNotFound => "The user is not a signer of the dossier",
            ErrorCode::UserNotFound => "The user with the specified id is not registered",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Not found: {message}")]
    NotFound { code: ErrorCode, message: String },

    #[error("Conflict: {message}")]
    Conflict { code: ErrorCode, message: String },

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(code: ErrorCode) -> Self {
        AppError::NotFound {
            code,
            message: code.message().to_string(),
        }
    }

    pub fn conflict(code: ErrorCode) -> Self {
        AppError::Conflict {
            code,
            message: code.message().to_string(),
        }
    }

    /// The business-rule code, if this is a business-rule failure
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            AppError::NotFound { code, .. } | AppError::Conflict { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_code: Option<ErrorCode>,
}

const GENERIC_FAILURE: &str =
    "It was not possible to process your request, please try it again later";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
            }
            AppError::NotFound { message, .. } => {
                tracing::warn!("Not found: {}", message);
                (StatusCode::NOT_FOUND, message.clone())
            }
            AppError::Conflict { message, .. } => {
                tracing::warn!("Conflict: {}", message);
                (StatusCode::CONFLICT, message.clone())
            }
            AppError::Unauthenticated(e) => (StatusCode::UNAUTHORIZED, e.clone()),
            AppError::Unauthorized(e) => (StatusCode::FORBIDDEN, e.clone()),
            AppError::InvalidInput(e) => (StatusCode::BAD_REQUEST, e.clone()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE.to_string())
            }
        };

        let body = ErrorBody {
            details,
            error_code: self.code(),
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
