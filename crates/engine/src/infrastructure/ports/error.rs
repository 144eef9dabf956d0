//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Entity not found - includes entity type and ID for actionable error messages.
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    /// Database operation failed - includes operation name for tracing.
    #[error("Database error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Business constraint violated.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl RepoError {
    /// Create a NotFound error with entity type and ID context.
    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }

    /// Create a Serialization error.
    pub fn serialization(message: impl ToString) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a ConstraintViolation error.
    pub fn constraint(message: impl ToString) -> Self {
        Self::ConstraintViolation(message.to_string())
    }

    /// Check if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<quoteforge_domain::DomainError> for RepoError {
    fn from(err: quoteforge_domain::DomainError) -> Self {
        Self::constraint(err)
    }
}

/// Errors from the external CAD conversion service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConversionServiceError {
    #[error("Conversion request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Service unavailable")]
    Unavailable,
}

/// Errors from object-store operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("Storage error on {key}: {message}")]
    Io { key: String, message: String },
}

impl ObjectStoreError {
    pub fn io(key: impl ToString, message: impl ToString) -> Self {
        Self::Io {
            key: key.to_string(),
            message: message.to_string(),
        }
    }
}

/// Errors from event publication.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventBusError {
    #[error("Event publish failed: {0}")]
    PublishFailed(String),
}
