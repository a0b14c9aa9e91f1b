//! Error types for validation and execution

use thiserror::Error;

/// Categories of pre-execution errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The document text is malformed
    Parse,
    /// The document parsed but cannot be executed as written
    Validation,
    /// The document could not be read
    Io,
}

/// Errors raised before any subsystem is touched
#[derive(Debug, Error)]
pub enum Error {
    /// Parse or document-invariant failure
    #[error(transparent)]
    Document(#[from] kickstart::Error),

    /// No handler registered under this name
    #[error("line {line}: no handler for directive '{name}'")]
    UnknownDirective { name: String, line: usize },

    /// Missing, unknown or malformed option
    #[error("line {line}: invalid argument for '{directive}': {key}: {reason}")]
    InvalidArgument {
        directive: String,
        line: usize,
        key: String,
        reason: String,
    },

    /// A required predecessor is absent, out of order, or in a later tier
    #[error("line {line}: '{directive}' {reason}")]
    CyclicOrUnsatisfiableDependency {
        directive: String,
        line: usize,
        reason: String,
    },
}

impl Error {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Document(e) => match e.category() {
                kickstart::ErrorCategory::Syntax => ErrorCategory::Parse,
                kickstart::ErrorCategory::Validation => ErrorCategory::Validation,
                kickstart::ErrorCategory::Io => ErrorCategory::Io,
            },
            _ => ErrorCategory::Validation,
        }
    }
}

/// Failure of a single capability invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// Transient condition; the executor may retry
    #[error("{reason}")]
    Recoverable { reason: String },

    /// Permanent failure; execution stops
    #[error("{reason}")]
    Fatal { reason: String },
}

impl InvokeError {
    pub fn recoverable(reason: impl Into<String>) -> Self {
        Self::Recoverable {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Whether retrying could help
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Recoverable { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Recoverable { reason } | Self::Fatal { reason } => reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_error_categories() {
        let syntax: Error = kickstart::Error::Syntax {
            line: 1,
            message: "bad".into(),
        }
        .into();
        assert_eq!(syntax.category(), ErrorCategory::Parse);

        let conflict: Error = kickstart::Error::PackageConflict { name: "A".into() }.into();
        assert_eq!(conflict.category(), ErrorCategory::Validation);
    }

    #[test]
    fn test_engine_errors_are_validation() {
        let err = Error::CyclicOrUnsatisfiableDependency {
            directive: "part".into(),
            line: 7,
            reason: "requires a preceding 'clearpart'".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(
            err.to_string(),
            "line 7: 'part' requires a preceding 'clearpart'"
        );
    }

    #[test]
    fn test_invoke_error_retryable() {
        assert!(InvokeError::recoverable("mirror unreachable").is_retryable());
        assert!(!InvokeError::fatal("bad size").is_retryable());
        assert_eq!(InvokeError::fatal("bad size").reason(), "bad size");
    }
}
