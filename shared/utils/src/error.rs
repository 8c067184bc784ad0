use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TixError {
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    #[error("Messaging error: {message}")]
    Messaging { message: String },

    #[error("Malformed payload: {message}")]
    MalformedPayload { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl TixError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn external_service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn messaging(message: impl Into<String>) -> Self {
        Self::Messaging {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Cache { .. } => "CACHE_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Messaging { .. } => "MESSAGING_ERROR",
            Self::MalformedPayload { .. } => "MALFORMED_PAYLOAD",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Internal { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. } => 400,
            Self::Conflict { .. } => 409,
            Self::Database { .. } => 500,
            Self::Cache { .. } => 500,
            Self::ExternalService { .. } => 502,
            Self::Messaging { .. } => 502,
            Self::MalformedPayload { .. } => 400,
            Self::Configuration { .. } => 500,
            Self::Internal { .. } => 500,
        }
    }

    /// Infrastructure failures worth retrying; data failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database { .. }
                | Self::Cache { .. }
                | Self::ExternalService { .. }
                | Self::Messaging { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type TixResult<T> = Result<T, TixError>;

/// Uniform API error envelope. `status` is the machine-readable discriminator,
/// independent of the HTTP status code.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub code: String,
    pub message: String,
    pub description: String,
}

impl From<&TixError> for ErrorResponse {
    fn from(error: &TixError) -> Self {
        Self {
            status: "-1".to_string(),
            code: error.error_code().to_string(),
            message: "Failed".to_string(),
            description: error.to_string(),
        }
    }
}

impl From<sqlx::Error> for TixError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::not_found("row"),
            other => Self::database(other.to_string()),
        }
    }
}

impl From<redis::RedisError> for TixError {
    fn from(error: redis::RedisError) -> Self {
        Self::cache(error.to_string())
    }
}

impl From<reqwest::Error> for TixError {
    fn from(error: reqwest::Error) -> Self {
        Self::external_service("HTTP Client", error.to_string())
    }
}

impl From<serde_json::Error> for TixError {
    fn from(error: serde_json::Error) -> Self {
        Self::malformed(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_codes() {
        let err = TixError::not_found("case I250101-00001");
        assert_eq!(err.error_code(), "NOT_FOUND");
        assert_eq!(err.http_status_code(), 404);
        assert!(!err.is_transient());

        let err = TixError::database("connection reset");
        assert!(err.is_transient());
        assert_eq!(err.http_status_code(), 500);
    }

    #[test]
    fn test_json_errors_are_permanent() {
        let err: TixError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.error_code(), "MALFORMED_PAYLOAD");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_envelope() {
        let err = TixError::validation("caseTypeId", "no group type contains T9");
        let body = ErrorResponse::from(&err);
        assert_eq!(body.status, "-1");
        assert_eq!(body.code, "VALIDATION_ERROR");
        assert!(body.description.contains("T9"));
    }
}
