// Error types for the Trellis framework

use serde::Serialize;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors. Raised while the module graph is registered or a
    // token is resolved, and fatal at startup.
    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider already registered: {0}")]
    DuplicateProvider(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("Scope mismatch: {0}")]
    ScopeMismatch(String),

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Route conflict: {0}")]
    RouteConflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Structured validation failure produced by a pipe
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    // Structured HTTP exceptions
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unprocessable Entity: {0}")]
    UnprocessableEntity(String),

    #[error("Route not found: {0}")]
    RouteNotFound(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // Everything else is an application error and maps to a generic 500
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Build a structured HTTP exception with an explicit status and message.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    /// Wrap an arbitrary application error.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Custom(Box::new(error))
    }

    /// Status and message when this error is a structured HTTP exception.
    ///
    /// Returns `None` for configuration and application errors, which are
    /// never exposed to the client verbatim.
    pub fn http_exception(&self) -> Option<(u16, String)> {
        match self {
            Error::Http { status, message } => Some((*status, message.clone())),
            Error::BadRequest(m) | Error::Deserialization(m) => Some((400, m.clone())),
            Error::Unauthorized(m) => Some((401, m.clone())),
            Error::Forbidden(m) => Some((403, m.clone())),
            Error::NotFound(m) | Error::RouteNotFound(m) => Some((404, m.clone())),
            Error::Conflict(m) => Some((409, m.clone())),
            Error::UnprocessableEntity(m) => Some((422, m.clone())),
            _ => None,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            other => other.http_exception().map(|(status, _)| status).unwrap_or(500),
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Whether this error indicates a broken module graph rather than a
    /// failed request.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::ProviderNotFound(_)
                | Error::DuplicateProvider(_)
                | Error::InvalidProvider(_)
                | Error::ScopeMismatch(_)
                | Error::CircularDependency(_)
                | Error::RouteConflict(_)
                | Error::Configuration(_)
        )
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        Error::Validation(errors)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Deserialization(e.to_string())
    }
}

/// Validation error for a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    /// Field name that failed validation
    pub field: String,

    /// Error message
    pub message: String,

    /// Validation constraint that failed
    pub constraint: String,

    /// Value that failed validation (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            constraint: "custom".to_string(),
            value: None,
        }
    }

    /// Set the constraint name
    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = constraint.into();
        self
    }

    /// Set the invalid value
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Collection of validation errors
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<ValidationError>,
}

impl ValidationErrors {
    /// Create a new validation errors collection
    pub fn new(errors: Vec<ValidationError>) -> Self {
        Self { errors }
    }

    /// Check if there are any errors
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Add an error
    pub fn add(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Get errors for a specific field
    pub fn get_field_errors(&self, field: &str) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| e.field == field).collect()
    }

    /// Body of the 400 response written for a validation failure
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "statusCode": 400,
            "message": "Validation failed",
            "errors": self.errors,
        })
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        write!(f, "{}", fields.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl From<Vec<ValidationError>> for ValidationErrors {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::new(errors)
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self::new(vec![error])
    }
}
