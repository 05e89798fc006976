use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// SQLSTATE reported by drivers when the link to the server is gone.
pub const COMMUNICATION_LINK_FAILURE: &str = "08S01";

/// Payload used when no diagnostic record could be retrieved.
pub const UNKNOWN_NATIVE_FAILURE: &str = "unknown native failure";

/// Error category for decision-making (retry, abort, reconnect, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient error - retry may resolve
    Transient,
    /// Fatal error - should abort operation
    Fatal,
    /// Validation error - invalid user input
    Validation,
    /// Connection lost - should reconnect
    ConnectionLost,
}

/// One record of a handle's diagnostic chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticRecord {
    pub state: String,
    pub native_error: i32,
    pub message: String,
}

impl DiagnosticRecord {
    pub fn new(state: impl Into<String>, native_error: i32, message: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            native_error,
            message: message.into(),
        }
    }
}

impl fmt::Display for DiagnosticRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}} {}", self.state, self.message)
    }
}

/// Failure of a single native call, as reported by the handle it failed on.
///
/// An empty record list means the diagnostics could not be read; the error
/// then names only the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticError {
    operation: String,
    records: Vec<DiagnosticRecord>,
}

impl DiagnosticError {
    pub fn new(operation: impl Into<String>, records: Vec<DiagnosticRecord>) -> Self {
        Self {
            operation: operation.into(),
            records,
        }
    }

    pub fn unknown(operation: impl Into<String>) -> Self {
        Self::new(operation, Vec::new())
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.records
    }

    pub fn is_unknown(&self) -> bool {
        self.records.is_empty()
    }

    /// SQLSTATE of the first record.
    pub fn sqlstate(&self) -> Option<&str> {
        self.records.first().map(|r| r.state.as_str())
    }

    pub fn native_code(&self) -> i32 {
        self.records.first().map(|r| r.native_error).unwrap_or(0)
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.records.iter().any(|r| r.state == state)
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.operation)?;
        if self.records.is_empty() {
            return f.write_str(UNKNOWN_NATIVE_FAILURE);
        }
        for (i, record) in self.records.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", record)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticError {}

#[derive(Error, Debug, Clone)]
pub enum OdbcError {
    #[error("Environment initialization failed: {0}")]
    Init(DiagnosticError),

    #[error("Handle allocation failed: {0}")]
    Alloc(DiagnosticError),

    #[error("Connect failed: {0}")]
    Connect(DiagnosticError),

    #[error("Disconnect failed: {0}")]
    Disconnect(DiagnosticError),

    #[error("Handle release failed: {0}")]
    Release(DiagnosticError),

    #[error("Connection string is empty")]
    EmptyConnectionString,

    #[error("Connection string contains a NUL character")]
    InvalidConnectionString,

    #[error("Environment has been closed")]
    EnvironmentClosed,

    #[error("{operation} cancelled: deadline expired")]
    Cancelled { operation: &'static str },

    #[error("Connection is marked bad")]
    BadConnection,

    #[error("Pool error: {0}")]
    PoolError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl OdbcError {
    /// Translated native diagnostic, when the error came from a native call.
    pub fn diagnostic(&self) -> Option<&DiagnosticError> {
        match self {
            OdbcError::Init(d)
            | OdbcError::Alloc(d)
            | OdbcError::Connect(d)
            | OdbcError::Disconnect(d)
            | OdbcError::Release(d) => Some(d),
            _ => None,
        }
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.diagnostic().and_then(DiagnosticError::sqlstate)
    }

    pub fn native_code(&self) -> i32 {
        self.diagnostic().map(DiagnosticError::native_code).unwrap_or(0)
    }

    /// True when the driver reported a communication link failure (`08S01`).
    pub fn is_bad_connection(&self) -> bool {
        matches!(self, OdbcError::BadConnection)
            || self
                .diagnostic()
                .is_some_and(|d| d.has_state(COMMUNICATION_LINK_FAILURE))
    }

    /// Returns true if the error is transient and may be retried by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            // Init failures are remembered for the driver's lifetime
            OdbcError::Init(_) => false,
            OdbcError::Connect(_) | OdbcError::Alloc(_) => self
                .sqlstate()
                .is_some_and(|s| s.starts_with("08") || s == "HYT00" || s == "HYT01"),
            OdbcError::Cancelled { .. } | OdbcError::PoolError(_) => true,
            _ => false,
        }
    }

    /// Returns true if this is a connection-related error
    pub fn is_connection_error(&self) -> bool {
        match self {
            OdbcError::EnvironmentClosed | OdbcError::BadConnection => true,
            _ => self.sqlstate().is_some_and(|s| s.starts_with("08")),
        }
    }

    /// Returns the error category for decision-making
    pub fn error_category(&self) -> ErrorCategory {
        if matches!(
            self,
            OdbcError::EmptyConnectionString | OdbcError::InvalidConnectionString
        ) {
            return ErrorCategory::Validation;
        }
        if matches!(self, OdbcError::Init(_)) {
            return ErrorCategory::Fatal;
        }
        if self.is_connection_error() {
            return ErrorCategory::ConnectionLost;
        }
        if self.is_retryable() {
            return ErrorCategory::Transient;
        }
        ErrorCategory::Fatal
    }
}

pub type Result<T> = std::result::Result<T, OdbcError>;
