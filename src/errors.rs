use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::entities::order::OrderStatus;

/// Serializable error payload handed to UI/CLI callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code (see [`ServiceError::code`])
    pub code: String,
    /// Human-readable error description
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Cart is empty: an order needs at least one item")]
    EmptyCart,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Could not allocate a unique order number after {attempts} attempts")]
    OrderNumberConflict { attempts: u32 },

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Convenience constructor for string-based storage failures.
    pub fn persistence_message(message: impl Into<String>) -> Self {
        ServiceError::Persistence(DbErr::Custom(message.into()))
    }

    /// Stable code for each failure class.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "empty_cart",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::OrderNumberConflict { .. } => "order_number_conflict",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence_error",
            Self::ValidationError(_) => "validation_error",
            Self::ExternalServiceError(_) => "external_service_error",
        }
    }

    /// Whether the failure was raised before any storage was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EmptyCart | Self::InvalidAmount(_) | Self::ValidationError(_)
        )
    }

    /// Message suitable for end users. Storage internals are not leaked.
    pub fn response_message(&self) -> String {
        match self {
            Self::Persistence(_) => "Database error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(error: &ServiceError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.response_message(),
        }
    }
}

/// Configuration loading errors live next to the config layer; re-exported
/// here so callers have a single error module.
pub use crate::config::AppConfigError;
