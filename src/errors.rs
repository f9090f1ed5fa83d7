use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Category of a field-level validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ValidationKind {
    /// Value does not match the expected shape (postal code, phone, email).
    InvalidFormat,
    /// State code outside the 27 Brazilian federative units.
    InvalidState,
    /// National id with wrong length or failed checksum for the party kind.
    TaxIdInvalid,
    /// Mandatory value missing.
    Required,
    /// Value already used by another owner of the same type.
    Duplicate,
}

/// One validation message attached to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub kind: ValidationKind,
    pub message: String,
}

/// Structured field → messages map returned to callers on validation failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors {
    errors: BTreeMap<String, Vec<FieldError>>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map holding a single message.
    pub fn single(field: &str, kind: ValidationKind, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, kind, message);
        errors
    }

    pub fn add(&mut self, field: &str, kind: ValidationKind, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(FieldError {
                kind,
                message: message.into(),
            });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[FieldError]> {
        self.errors.get(field).map(Vec::as_slice)
    }

    /// True when `field` carries at least one message of `kind`.
    pub fn has(&self, field: &str, kind: ValidationKind) -> bool {
        self.get(field)
            .map(|messages| messages.iter().any(|m| m.kind == kind))
            .unwrap_or(false)
    }

    /// `Ok(())` when no message was collected.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// JSON body shape: `{"field": ["message", ...]}`.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .errors
            .iter()
            .map(|(field, messages)| {
                let texts: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
                (field.clone(), json!(texts))
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|(field, messages)| {
                let texts: Vec<&str> = messages.iter().map(|m| m.message.as_str()).collect();
                format!("{}: {}", field, texts.join("; "))
            })
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Application-specific error types.
#[derive(Debug)]
pub enum AppError {
    /// Field-level validation failure (owner or address). Raised before any write
    /// when possible; always rolls the save back.
    Validation(FieldErrors),
    /// The final address write violated a stored constraint.
    AddressPersistence(String),
    /// Database-related errors.
    DatabaseError(sqlx::Error),
    /// Resource not found error.
    NotFound(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Field errors carried by this error, looking through context wrappers.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            AppError::Validation(errors) => Some(errors),
            AppError::WithContext { source, .. } => source.field_errors(),
            _ => None,
        }
    }

    /// True for `AddressPersistence`, looking through context wrappers.
    pub fn is_address_persistence(&self) -> bool {
        match self {
            AppError::AddressPersistence(_) => true,
            AppError::WithContext { source, .. } => source.is_address_persistence(),
            _ => false,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(errors) => write!(f, "Validation error: {}", errors),
            AppError::AddressPersistence(msg) => write!(f, "Address persistence error: {}", msg),
            AppError::DatabaseError(e) => write!(f, "Database error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Validation failures keep their field map so forms can display them;
    /// everything else collapses to a generic message and is logged here.
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "errors": errors.to_json() }),
            ),
            AppError::AddressPersistence(msg) => {
                tracing::error!("Address persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Address could not be saved" }),
                )
            }
            AppError::DatabaseError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Database error" }),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal server error" }),
                )
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone().into_response();
            }
        };

        (status, Json(body)).into_response()
    }
}

// Make AppError cloneable for WithContext variant
impl Clone for AppError {
    /// Clones the error.
    ///
    /// Note: `sqlx::Error` is not cloneable, so `DatabaseError` is simplified to `RowNotFound` during cloning.
    fn clone(&self) -> Self {
        match self {
            AppError::Validation(errors) => AppError::Validation(errors.clone()),
            AppError::AddressPersistence(msg) => AppError::AddressPersistence(msg.clone()),
            AppError::DatabaseError(_e) => AppError::DatabaseError(sqlx::Error::RowNotFound),
            AppError::NotFound(msg) => AppError::NotFound(msg.clone()),
            AppError::BadRequest(msg) => AppError::BadRequest(msg.clone()),
            AppError::InternalError(msg) => AppError::InternalError(msg.clone()),
            AppError::WithContext { source, context } => AppError::WithContext {
                source: source.clone(),
                context: context.clone(),
            },
        }
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<sqlx::Error> for AppError {
    /// Converts a `sqlx::Error` into an `AppError`.
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err)
    }
}

/// Failure of a single external provider call.
///
/// Never leaves the lookup services: it is logged at the provider boundary and
/// turned into "try the next provider".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Connection failure or timeout.
    Transport(String),
    /// Non-success HTTP status other than an explicit not-found.
    Status(u16),
    /// Body could not be decoded as JSON.
    Decode(String),
    /// The provider's circuit breaker is open.
    CircuitOpen,
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Transport(msg) => write!(f, "transport failure: {}", msg),
            LookupError::Status(status) => write!(f, "unexpected status {}", status),
            LookupError::Decode(msg) => write!(f, "undecodable body: {}", msg),
            LookupError::CircuitOpen => write!(f, "circuit open"),
        }
    }
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Decode(err.to_string())
        } else {
            LookupError::Transport(err.to_string())
        }
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(AppError::DatabaseError(e)),
            context: f(),
        })
    }
}
