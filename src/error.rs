//! Centralized error handling
//! Structured errors for everything a user can see go wrong; invariant
//! violations stay as debug assertions instead.

use std::fmt;

/// How serious an error is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational; shown but nothing failed.
    Info,
    /// Something looks wrong but the operation continued.
    Warning,
    /// The operation failed; the editor continues.
    Error,
    /// May lose data or require a restart.
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Category of the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// File system or I/O errors
    Io,
    /// Key or argument parsing errors
    Parse,
    /// Invalid edits or transactions
    Edit,
    /// Buffer lock acquisition failures
    Lock,
    /// Background job failures
    Job,
    /// Rendering or terminal backend errors
    Renderer,
    /// Internal logic errors
    Internal,
    /// Everything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io => write!(f, "IO"),
            Self::Parse => write!(f, "Parse"),
            Self::Edit => write!(f, "Edit"),
            Self::Lock => write!(f, "Lock"),
            Self::Job => write!(f, "Job"),
            Self::Renderer => write!(f, "Renderer"),
            Self::Internal => write!(f, "Internal"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// A structured editor error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeinError {
    pub severity: ErrorSeverity,
    pub kind: ErrorKind,
    /// Machine-readable code, e.g. "INVALID_EDIT" or "FILE_NOT_FOUND".
    pub code: String,
    pub message: String,
}

impl SkeinError {
    /// A standard error (severity `Error`).
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        SkeinError {
            severity: ErrorSeverity::Error,
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        SkeinError {
            severity: ErrorSeverity::Warning,
            ..SkeinError::new(kind, code, message)
        }
    }

    pub fn io(code: impl Into<String>, err: std::io::Error) -> Self {
        SkeinError::new(ErrorKind::Io, code, err.to_string())
    }
}

impl fmt::Display for SkeinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for SkeinError {}

impl From<std::io::Error> for SkeinError {
    fn from(err: std::io::Error) -> Self {
        SkeinError::io("IO_ERROR", err)
    }
}
