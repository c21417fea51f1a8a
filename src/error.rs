/// Unified error handling for the token service.
///
/// Domain-specific error types are kept separate (token codec, hashing,
/// entropy, storage, validation) and converge on a single `AppError` that
/// drives both control flow and HTTP response mapping.

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

/// Errors from the access-token codec (sign / peek / verify).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Token string cannot be parsed at all.
    Malformed(String),
    /// A required claim is absent, empty, or not a string.
    MissingClaim(&'static str),
    /// Signature does not verify under the supplied secret.
    InvalidSignature,
    /// Token is signed with anything other than HS512.
    AlgorithmMismatch,
    /// Signing was attempted with an empty secret.
    EmptySecret,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Malformed(msg) => write!(f, "malformed token: {}", msg),
            TokenError::MissingClaim(claim) => write!(f, "missing or invalid claim: {}", claim),
            TokenError::InvalidSignature => write!(f, "invalid token signature"),
            TokenError::AlgorithmMismatch => write!(f, "unexpected signing algorithm"),
            TokenError::EmptySecret => write!(f, "signing secret is empty"),
        }
    }
}

impl StdError for TokenError {}

/// Errors from credential hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    EmptyInput,
    Backend(String),
}

impl fmt::Display for HashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashError::EmptyInput => write!(f, "cannot hash empty input"),
            HashError::Backend(msg) => write!(f, "hashing failed: {}", msg),
        }
    }
}

impl StdError for HashError {}

/// Errors from the random secret generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    InvalidLength(usize),
    Entropy(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::InvalidLength(len) => {
                write!(f, "invalid secret length: {}", len)
            }
            GenerationError::Entropy(msg) => write!(f, "entropy source failure: {}", msg),
        }
    }
}

impl StdError for GenerationError {}

/// Errors from the user store.
#[derive(Debug)]
pub enum StoreError {
    /// Creation attempted with an email that already exists.
    DuplicateEmail,
    /// No user record for the given email.
    NotFound,
    /// A concurrent refresh rotated the credentials first.
    RotationConflict,
    /// Connection pool exhaustion or connectivity loss.
    ConnectionPool(String),
    /// Any other query failure.
    Query(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateEmail => write!(f, "email already registered"),
            StoreError::NotFound => write!(f, "user not found"),
            StoreError::RotationConflict => {
                write!(f, "credentials were rotated by a concurrent request")
            }
            StoreError::ConnectionPool(msg) => write!(f, "database connection error: {}", msg),
            StoreError::Query(msg) => write!(f, "query error: {}", msg),
        }
    }
}

impl StdError for StoreError {}

/// Errors from the notification side-channel. Never propagated to clients;
/// logged at dispatch and discarded.
#[derive(Debug, Clone)]
pub enum NotifyError {
    SendFailed(String),
    ServiceUnavailable(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::SendFailed(msg) => write!(f, "failed to send notification: {}", msg),
            NotifyError::ServiceUnavailable(msg) => {
                write!(f, "notification service unavailable: {}", msg)
            }
        }
    }
}

impl StdError for NotifyError {}

/// Central application error. All protocol and plumbing failures map here.
#[derive(Debug)]
pub enum AppError {
    /// Unparseable token, claims, or transport encoding.
    MalformedRequest(String),
    /// The email claimed by the access token has no user record.
    UserNotFound,
    /// Registration with an already-registered email.
    DuplicateEmail,
    /// Refresh-token mismatch or access-token verification failure.
    /// Deliberately not distinguished so clients cannot probe which
    /// check failed.
    InvalidCredential,
    /// Lost the optimistic race against a concurrent rotation.
    RotationConflict,
    /// Entropy or hashing subsystem failure; internal fault.
    Generation(String),
    /// Request-level input validation failure.
    Validation(crate::validators::ValidationError),
    /// Storage failures other than the identity errors above.
    Database(String),
    /// Database temporarily unreachable.
    DatabaseUnavailable(String),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::MalformedRequest(msg) => write!(f, "malformed request: {}", msg),
            AppError::UserNotFound => write!(f, "user not found"),
            AppError::DuplicateEmail => write!(f, "email already registered"),
            AppError::InvalidCredential => write!(f, "invalid credentials"),
            AppError::RotationConflict => write!(f, "credential rotation conflict"),
            AppError::Generation(msg) => write!(f, "credential generation failed: {}", msg),
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(msg) => write!(f, "database error: {}", msg),
            AppError::DatabaseUnavailable(msg) => {
                write!(f, "database unavailable: {}", msg)
            }
            AppError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

impl From<crate::validators::ValidationError> for AppError {
    fn from(err: crate::validators::ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        AppError::Generation(err.to_string())
    }
}

impl From<HashError> for AppError {
    fn from(err: HashError) -> Self {
        match err {
            // An empty password/token reaching the hasher is a request
            // problem, not an internal fault.
            HashError::EmptyInput => AppError::MalformedRequest(err.to_string()),
            HashError::Backend(msg) => AppError::Generation(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            // Reaching the signer with an empty secret is a programming
            // error on our side, not a client fault.
            TokenError::EmptySecret => AppError::Generation(err.to_string()),
            TokenError::InvalidSignature | TokenError::AlgorithmMismatch => {
                AppError::InvalidCredential
            }
            TokenError::Malformed(_) | TokenError::MissingClaim(_) => {
                AppError::MalformedRequest(err.to_string())
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => AppError::DuplicateEmail,
            StoreError::NotFound => AppError::UserNotFound,
            StoreError::RotationConflict => AppError::RotationConflict,
            StoreError::ConnectionPool(msg) => AppError::DatabaseUnavailable(msg),
            StoreError::Query(msg) => AppError::Database(msg),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEmail,
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::ConnectionPool(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// JSON error body returned to clients.
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Request ID for log correlation.
    pub error_id: String,
    pub message: String,
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    fn response_parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::MalformedRequest(_) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_REQUEST", self.to_string())
            }
            AppError::Validation(e) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", e.to_string()),
            AppError::UserNotFound => {
                (StatusCode::NOT_FOUND, "USER_NOT_FOUND", self.to_string())
            }
            AppError::DuplicateEmail => {
                (StatusCode::CONFLICT, "DUPLICATE_EMAIL", self.to_string())
            }
            AppError::InvalidCredential => (
                StatusCode::UNAUTHORIZED,
                "INVALID_CREDENTIALS",
                "invalid credentials".to_string(),
            ),
            AppError::RotationConflict => (
                StatusCode::CONFLICT,
                "ROTATION_CONFLICT",
                "credentials were refreshed concurrently".to_string(),
            ),
            AppError::Generation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "GENERATION_ERROR",
                "internal server error".to_string(),
            ),
            AppError::DatabaseUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "database temporarily unavailable".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "database error occurred".to_string(),
            ),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal server error".to_string(),
            ),
        }
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::MalformedRequest(_) | AppError::Validation(_) => {
                tracing::warn!(request_id, error = %self, "rejected request");
            }
            AppError::UserNotFound | AppError::DuplicateEmail => {
                tracing::warn!(request_id, error = %self, "identity error");
            }
            AppError::InvalidCredential => {
                tracing::warn!(request_id, "credential verification failed");
            }
            AppError::RotationConflict => {
                tracing::warn!(request_id, "concurrent rotation detected");
            }
            AppError::Generation(msg) => {
                tracing::error!(request_id, error = %msg, "credential generation failed");
            }
            AppError::Database(msg) | AppError::DatabaseUnavailable(msg) => {
                tracing::error!(request_id, error = %msg, "storage failure");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id, error = %msg, "internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        let (status, code, message) = self.response_parts();
        let body = ErrorResponse::new(request_id, message, code.to_string(), status.as_u16());

        HttpResponse::build(status).json(body)
    }

    fn status_code(&self) -> StatusCode {
        self.response_parts().0
    }
}
