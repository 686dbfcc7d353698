//! Error types for the session layer.
//!
//! `DbError::Database` is the single error kind that driver failures inside a
//! session operation are translated into; the original `sqlx::Error` is kept
//! as the source so callers can still inspect it. Initialization failures
//! (bad URL, unknown scheme, missing driver) get their own variants and are
//! never folded into the uniform kind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Connection URL could not be parsed.
    #[error("invalid connection URL: {message}")]
    InvalidUrl { message: String },

    /// Pool settings failed validation.
    #[error("invalid pool settings: {message}")]
    Settings { message: String },

    /// URL scheme does not name a supported database driver.
    #[error("unsupported database driver: {scheme}://")]
    UnsupportedDriver { scheme: String },

    /// URL names a driver that was compiled out of this build.
    #[error("database driver not available in this build: {driver}")]
    DriverUnavailable { driver: &'static str },

    /// Engine construction failed while connecting.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Uniform kind for driver errors raised inside a session operation.
    #[error("database error: {message}")]
    Database {
        message: String,
        /// e.g. "42P01" for an undefined table
        sql_state: Option<String>,
        #[source]
        source: Box<sqlx::Error>,
    },
}

impl DbError {
    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    /// Create a settings validation error.
    pub fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    /// Create an unsupported driver error.
    pub fn unsupported_driver(scheme: impl Into<String>) -> Self {
        Self::UnsupportedDriver {
            scheme: scheme.into(),
        }
    }

    /// Create a missing driver error.
    pub fn driver_unavailable(driver: &'static str) -> Self {
        Self::DriverUnavailable { driver }
    }

    /// Create a connection error, optionally keeping the driver error as source.
    pub fn connection(message: impl Into<String>, source: Option<sqlx::Error>) -> Self {
        Self::Connection {
            message: message.into(),
            source,
        }
    }

    /// Get the SQLSTATE code for this error, if the driver reported one.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }
}

/// Convert driver errors into the uniform database error kind.
///
/// This is the translation boundary: session query and flush propagate with
/// `?`, so every `sqlx::Error` they hit surfaces as `DbError::Database`.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let (message, sql_state) = match &err {
            sqlx::Error::Database(db_err) => (
                db_err.message().to_string(),
                db_err.code().map(|c| c.to_string()),
            ),
            other => (other.to_string(), None),
        };
        DbError::Database {
            message,
            sql_state,
            source: Box::new(err),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("refused", None);
        assert!(err.to_string().contains("connection failed"));

        let err = DbError::unsupported_driver("redis");
        assert!(err.to_string().contains("redis://"));
    }

    #[test]
    fn test_sqlx_error_becomes_uniform_database_kind() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, DbError::Database { .. }));
    }

    #[test]
    fn test_translated_error_preserves_source() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        let source = err.source().expect("source should be preserved");
        assert!(source.to_string().contains("no rows"));
    }

    #[test]
    fn test_sql_state_absent_for_non_database_errors() {
        let err: DbError = sqlx::Error::WorkerCrashed.into();
        assert!(err.sql_state().is_none());
        assert!(DbError::invalid_url("nope").sql_state().is_none());
    }
}
