//! Error Types for the Roster API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! Client errors are serialized as JSON with their HTTP status code. Server
//! errors are logged and rendered as one fixed body so that no internal
//! detail leaks to the client.

use axum::{
    extract::rejection::PathRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use roster_core::{PatchError, Violations};
use roster_storage::RepositoryError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested organization does not exist
    OrganizationNotFound,

    /// Requested member does not exist in the organization
    MemberNotFound,

    // ========================================================================
    // Client Errors (400)
    // ========================================================================
    /// Request body is absent or null
    MissingPayload,

    /// Request contains invalid input data
    InvalidInput,

    /// Path or field format is incorrect
    InvalidFormat,

    // ========================================================================
    // Unprocessable Errors (422)
    // ========================================================================
    /// Request body broke one or more validation rules
    ValidationFailed,

    /// Patch document could not be applied
    InvalidPatch,

    // ========================================================================
    // Server Errors (500)
    // ========================================================================
    /// Pending changes could not be persisted
    PersistenceError,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::EntityNotFound
            | ErrorCode::OrganizationNotFound
            | ErrorCode::MemberNotFound => StatusCode::NOT_FOUND,

            ErrorCode::MissingPayload | ErrorCode::InvalidInput | ErrorCode::InvalidFormat => {
                StatusCode::BAD_REQUEST
            }

            ErrorCode::ValidationFailed | ErrorCode::InvalidPatch => {
                StatusCode::UNPROCESSABLE_ENTITY
            }

            ErrorCode::PersistenceError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::OrganizationNotFound => "Organization not found",
            ErrorCode::MemberNotFound => "Member not found",
            ErrorCode::MissingPayload => "Request body is missing",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidPatch => "Patch document could not be applied",
            ErrorCode::PersistenceError => "Persisting changes failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (violations, failing patch operation)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Body of every 500 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub status_code: u16,
    pub message: String,
}

impl ErrorDetails {
    pub fn internal_server_error() -> Self {
        Self {
            status_code: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: "Internal Server Error".to_string(),
        }
    }
}

/// The fixed response rendered for every server-side failure.
pub fn internal_server_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorDetails::internal_server_error()),
    )
        .into_response()
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an OrganizationNotFound error.
    pub fn organization_not_found(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::OrganizationNotFound,
            format!("Organization with id {} doesn't exist in the database", id),
        )
    }

    /// Create a MemberNotFound error.
    pub fn member_not_found(id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::MemberNotFound,
            format!("Member with id {} doesn't exist in the database", id),
        )
    }

    /// Create a MissingPayload error naming the operation.
    pub fn missing_payload(operation: &str) -> Self {
        Self::new(
            ErrorCode::MissingPayload,
            format!("Object is null. Operation: {}", operation),
        )
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    /// Create a ValidationFailed error carrying every violation.
    pub fn validation_failed(operation: &str, violations: &Violations) -> Self {
        let details = serde_json::to_value(violations).unwrap_or(serde_json::Value::Null);
        Self::new(
            ErrorCode::ValidationFailed,
            format!("Invalid model state for the object. Operation: {}", operation),
        )
        .with_details(details)
    }

    /// Create an InvalidPatch error naming the failing operation.
    pub fn invalid_patch(err: &PatchError) -> Self {
        let mut error = Self::new(ErrorCode::InvalidPatch, err.to_string());
        if let Some(index) = err.operation_index() {
            error = error.with_details(serde_json::json!({ "operation": index }));
        }
        error
    }

    /// Create a PersistenceError.
    pub fn persistence_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceError, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = %self.code, message = %self.message, "Request failed");
            return internal_server_error_response();
        }
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Convert repository failures. Both map to 500; the cause is only logged.
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Persistence(cause) => {
                ApiError::persistence_error(format!("Saving changes failed: {}", cause))
            }
            other => ApiError::internal_error(other.to_string()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_format("path", &format!("valid UUID ({})", rejection.body_text()))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
