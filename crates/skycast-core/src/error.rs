//! Centralized error types for Skycast.
//!
//! This module provides a typed error hierarchy that:
//! - Separates the failure kinds a sync cycle can hit (network, parse, store)
//! - Provides user-friendly messages suitable for display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Recover the typed error behind an `anyhow::Error` from startup plumbing.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ConfigError>() {
            Ok(e) => return AppError::Config(e),
            Err(err) => err,
        };
        let err = match err.downcast::<DatabaseError>() {
            Ok(e) => return AppError::Database(e),
            Err(err) => err,
        };
        let err = match err.downcast::<NetworkError>() {
            Ok(e) => return AppError::Network(e),
            Err(err) => err,
        };
        match err.downcast::<std::io::Error>() {
            Ok(e) => AppError::Io(e),
            Err(err) => AppError::Other(err),
        }
    }

    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Parse(e) => e.user_message(),
            AppError::Database(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Network-related errors (HTTP, connectivity).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
            NetworkError::Timeout => "The request timed out. Please try again.",
            NetworkError::ServerError { status, .. } if *status >= 500 => {
                "The weather server is experiencing issues. Please try again later."
            }
            NetworkError::ServerError { status: 401, .. } => {
                "Weather API key is invalid. Check settings."
            }
            NetworkError::ServerError { .. } => "The forecast request failed. Please try again.",
            NetworkError::InvalidRequest(_) => "The forecast request could not be built.",
        }
    }
}

/// Forecast payload errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed JSON: {0}")]
    InvalidJson(String),

    #[error("Response envelope is missing the day list")]
    MissingList,

    #[error("Server reported status {code}: {message}")]
    ApiStatus { code: u16, message: String },

    #[error("Response contained no usable forecast days")]
    Empty,
}

impl ParseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ParseError::InvalidJson(_) | ParseError::MissingList => {
                "Received an unexpected forecast response."
            }
            ParseError::ApiStatus { code: 404, .. } => "Location not found. Check your settings.",
            ParseError::ApiStatus { .. } => "The weather service rejected the request.",
            ParseError::Empty => "No forecast is available right now.",
        }
    }
}

/// Database/storage errors (SQLite, local state).
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Data corruption detected: {0}")]
    Corruption(String),

    #[error("Schema rebuild failed: {0}")]
    SchemaFailed(String),
}

impl DatabaseError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DatabaseError::ConnectionFailed(_) => {
                "Unable to access local data. Try restarting the app."
            }
            DatabaseError::QueryFailed(_) => "A data operation failed. Please try again.",
            DatabaseError::WriteFailed(_) => "Saving the forecast failed. Showing last known data.",
            DatabaseError::Corruption(_) => {
                "Local data may be corrupted. Consider resetting app data."
            }
            DatabaseError::SchemaFailed(_) => {
                "Failed to update local data. Try restarting the app."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::NotFound(_) => "Configuration not found. Using defaults.",
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_network_error(self) -> NetworkError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_network_error(self) -> NetworkError {
        if self.is_timeout() {
            NetworkError::Timeout
        } else if self.is_connect() {
            NetworkError::ConnectionFailed(self.to_string())
        } else if let Some(status) = self.status() {
            NetworkError::ServerError {
                status: status.as_u16(),
                message: self.to_string(),
            }
        } else if self.is_builder() {
            NetworkError::InvalidRequest(self.to_string())
        } else {
            NetworkError::ConnectionFailed(self.to_string())
        }
    }
}

/// Extension trait for converting rusqlite errors to our error types.
pub trait RusqliteErrorExt {
    fn into_database_error(self) -> DatabaseError;
}

impl RusqliteErrorExt for rusqlite::Error {
    fn into_database_error(self) -> DatabaseError {
        match &self {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("corrupt") => {
                DatabaseError::Corruption(self.to_string())
            }
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DatabaseError::WriteFailed(self.to_string())
            }
            _ => DatabaseError::QueryFailed(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_conversion() {
        let parse_err = ParseError::MissingList;
        let app_err: AppError = parse_err.into();
        assert!(matches!(app_err, AppError::Parse(ParseError::MissingList)));
    }

    #[test]
    fn test_user_message_propagation() {
        let app_err = AppError::Network(NetworkError::Timeout);
        assert_eq!(
            app_err.user_message(),
            "The request timed out. Please try again."
        );
    }

    #[test]
    fn test_from_anyhow_recovers_typed_errors() {
        let err = anyhow::Error::new(ConfigError::Invalid("sync.interval_secs".into()));
        assert!(matches!(
            AppError::from_anyhow(err),
            AppError::Config(ConfigError::Invalid(_))
        ));

        let err = anyhow::Error::new(DatabaseError::ConnectionFailed("locked".into()))
            .context("Failed to open forecast store");
        assert!(matches!(
            AppError::from_anyhow(err),
            AppError::Database(DatabaseError::ConnectionFailed(_))
        ));

        let err = anyhow::Error::new(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
        assert!(matches!(AppError::from_anyhow(err), AppError::Io(_)));

        let other = AppError::from_anyhow(anyhow::anyhow!("something else"));
        assert!(matches!(other, AppError::Other(_)));
        assert!(other.user_message().contains("unexpected"));
    }

    #[test]
    fn test_server_error_messages_by_status() {
        let unavailable = NetworkError::ServerError {
            status: 503,
            message: "down".into(),
        };
        assert!(unavailable.user_message().contains("experiencing issues"));

        let unauthorized = NetworkError::ServerError {
            status: 401,
            message: "bad key".into(),
        };
        assert!(unauthorized.user_message().contains("API key"));
    }

    #[test]
    fn test_parse_error_not_found_message() {
        let err = ParseError::ApiStatus {
            code: 404,
            message: "city not found".into(),
        };
        assert!(err.user_message().contains("Location not found"));
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn test_constraint_violation_maps_to_write_failed() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k INTEGER NOT NULL UNIQUE); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert!(matches!(
            err.into_database_error(),
            DatabaseError::WriteFailed(_)
        ));
    }
}
