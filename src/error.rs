//! Error types for sqlpp-postgres.

use thiserror::Error;

use crate::sqlstate::{ErrorKind, classify};

/// Result type for sqlpp-postgres operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in query string (1-based)
    pub position: Option<u32>,
    /// Position in internal query
    pub internal_position: Option<u32>,
    /// Failed internal command text
    pub internal_query: Option<String>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Schema name
    pub schema: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Data type name
    pub data_type: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
    /// Source file name
    pub file: Option<String>,
    /// Source line number
    pub line: Option<u32>,
    /// Source routine name
    pub routine: Option<String>,
}

impl ErrorFields {
    /// Severity, preferring the non-localized variant.
    pub fn severity(&self) -> Option<&str> {
        self.severity_non_localized
            .as_deref()
            .or(self.severity.as_deref())
    }
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error reported by the server for a statement.
#[derive(Debug, Clone)]
pub struct DbError {
    kind: ErrorKind,
    fields: ErrorFields,
    query: Option<String>,
}

impl DbError {
    /// Classify server error fields raised while running `query`.
    pub fn new(fields: ErrorFields, query: Option<&str>) -> Self {
        let kind = classify(fields.code.as_deref().unwrap_or_default());
        // The server rejects the session before any statement runs.
        let query = match kind {
            ErrorKind::TooManyConnections => None,
            _ => query.map(str::to_owned),
        };
        Self {
            kind,
            fields,
            query,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn fields(&self) -> &ErrorFields {
        &self.fields
    }

    /// Primary message, or an empty string.
    pub fn message(&self) -> &str {
        self.fields.message.as_deref().unwrap_or_default()
    }

    /// SQLSTATE code, or an empty string.
    pub fn code(&self) -> &str {
        self.fields.code.as_deref().unwrap_or_default()
    }

    /// Text of the statement that failed.
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 1-based position of the error in the statement text, or -1.
    pub fn error_position(&self) -> i32 {
        self.fields
            .position
            .and_then(|p| i32::try_from(p).ok())
            .unwrap_or(-1)
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.fields)?;
        if let Some(query) = &self.query {
            write!(f, "\nQUERY: {}", query)?;
        }
        Ok(())
    }
}

impl std::error::Error for DbError {}

/// Error type for sqlpp-postgres.
#[derive(Debug, Error)]
pub enum Error {
    /// Error reported by the server, classified by SQLSTATE
    #[error("{0}")]
    Database(Box<DbError>),

    /// Cannot reach or authenticate to the server, or the connection was lost
    #[error("Broken connection: {0}")]
    BrokenConnection(String),

    /// The connection broke while a COMMIT was in flight
    #[error("Transaction outcome unknown: {0}")]
    InDoubt(String),

    /// Result access outside the available rows or fields
    #[error("Index out of range: row {row}, field {field} (result has {rows} rows, {fields} fields)")]
    OutOfRange {
        row: usize,
        field: usize,
        rows: usize,
        fields: usize,
    },

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// TLS error
    #[cfg(feature = "tls")]
    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    /// Value could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid usage (e.g., bad parameter index, nested transactions)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// Unsupported feature
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    /// Build a classified server error.
    pub fn database(fields: ErrorFields, query: Option<&str>) -> Self {
        Error::Database(Box::new(DbError::new(fields, query)))
    }

    /// Position of this error in the failure hierarchy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Database(e) => e.kind(),
            Error::BrokenConnection(_) | Error::Io(_) | Error::Auth(_) => {
                ErrorKind::BrokenConnection
            }
            #[cfg(feature = "tls")]
            Error::Tls(_) => ErrorKind::BrokenConnection,
            Error::InDoubt(_) => ErrorKind::InDoubt,
            _ => ErrorKind::Failure,
        }
    }

    /// Returns true if this error is `kind` or a more specific kind of it.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind().is_a(kind)
    }

    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::BrokenConnection(_) => true,
            Error::Database(e) => {
                e.kind().is_a(ErrorKind::BrokenConnection)
                    || matches!(e.fields().severity(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Database(e) => e.fields().code.as_deref(),
            _ => None,
        }
    }

    /// Get the server error details if this is a server error.
    pub fn as_db_error(&self) -> Option<&DbError> {
        match self {
            Error::Database(e) => Some(&**e),
            _ => None,
        }
    }
}
