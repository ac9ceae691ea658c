use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Conflict",
    "message": "Insufficient inventory: warehouse inventory 6a1f... cannot cover 20 units",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request", "Conflict")
    #[schema(example = "Conflict")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A create request referenced an inventory line that does not exist.
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// A sufficiency guard failed; the surrounding transaction was aborted.
    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    #[error("Transaction failed: {0}")]
    TransactionFailure(String),

    /// The cross-store counterpart of a record is missing. Raised inside the
    /// reconciliation loop only; never returned to an HTTP caller.
    #[error("Reconciliation stalled for {0}")]
    ReconciliationStall(Uuid),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

/// Malformed bodies are reported as 400.
impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::ValidationError(rejection.body_text())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// A store failed to open or commit a transaction.
    pub fn transaction(err: DbErr) -> Self {
        ServiceError::TransactionFailure(err.to_string())
    }

    pub fn insufficient(inventory_id: Uuid, requested: i32) -> Self {
        ServiceError::InsufficientInventory(format!(
            "inventory {} cannot cover {} units",
            inventory_id, requested
        ))
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidReference(_) | Self::InvalidTransition(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::InsufficientInventory(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_)
            | Self::TransactionFailure(_)
            | Self::ReconciliationStall(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::TransactionFailure(_) => "Transaction failed".to_string(),
            Self::ReconciliationStall(_)
            | Self::SerializationError(_)
            | Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Errors the reconciliation loop can expect to clear on a later tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_)
                | Self::TransactionFailure(_)
                | Self::InsufficientInventory(_)
        )
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_message = self.response_message();

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: error_message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.error, "Not Found");
    }

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidReference("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::insufficient(Uuid::new_v4(), 20).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::TransactionFailure("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_hidden() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("secret dsn".into())).response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::ReconciliationStall(Uuid::nil()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InvalidTransition("Approved -> Pending".into()).response_message(),
            "Invalid transition: Approved -> Pending"
        );
    }

    #[test]
    fn transaction_failures_are_retryable_500s() {
        let err = ServiceError::transaction(DbErr::Custom("commit lost".into()));
        assert!(matches!(err, ServiceError::TransactionFailure(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.response_message(), "Transaction failed");
        assert!(err.is_retryable());
    }
}
