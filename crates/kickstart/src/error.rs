//! Error types for kickstart document handling.
//!
//! Errors are categorized so callers can tell a malformed document
//! (syntax) apart from a well-formed document whose content is
//! contradictory (validation) and from plain I/O failures.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of document errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The document text could not be parsed
    Syntax,
    /// The document parsed but violates a document invariant
    Validation,
    /// The document could not be read or written
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Syntax => "Document syntax error",
            Self::Validation => "Document validation error",
            Self::Io => "Document I/O error",
        }
    }
}

/// Errors that can occur while reading a provisioning document.
#[derive(Debug, Error)]
pub enum Error {
    /// A directive name that is not part of the kickstart vocabulary
    #[error("line {line}: unknown directive '{name}'")]
    UnknownDirective {
        /// Line number (1-indexed)
        line: usize,
        /// The unrecognized directive name
        name: String,
    },

    /// An option token that could not be parsed
    #[error("line {line}: malformed option: {message}")]
    MalformedOption {
        /// Line number (1-indexed)
        line: usize,
        /// What is wrong with the option
        message: String,
    },

    /// A directive or block that may only appear once appeared again
    #[error("line {line}: '{name}' may only appear once (first declared on line {first_line})")]
    DuplicateDirective {
        /// Line number of the repeated declaration (1-indexed)
        line: usize,
        /// Directive or block name
        name: String,
        /// Line number of the first declaration
        first_line: usize,
    },

    /// Section structure errors (unknown section, stray or missing `%end`)
    #[error("line {line}: {message}")]
    Syntax {
        /// Line number (1-indexed)
        line: usize,
        /// Description of the syntax error
        message: String,
    },

    /// A package is both requested and excluded
    #[error("package '{name}' is both included and excluded")]
    PackageConflict {
        /// The conflicting package name
        name: String,
    },

    /// Document not found at the specified path
    #[error("document not found: {0}")]
    NotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnknownDirective { .. }
            | Error::MalformedOption { .. }
            | Error::DuplicateDirective { .. }
            | Error::Syntax { .. } => ErrorCategory::Syntax,
            Error::PackageConflict { .. } => ErrorCategory::Validation,
            Error::NotFound(_) | Error::Io(_) => ErrorCategory::Io,
        }
    }

    /// The offending source line, when the error is tied to one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Error::UnknownDirective { line, .. }
            | Error::MalformedOption { line, .. }
            | Error::DuplicateDirective { line, .. }
            | Error::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Result type for document operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_syntax() {
        let err = Error::UnknownDirective {
            line: 3,
            name: "frobnicate".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Syntax);
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_category_validation() {
        let err = Error::PackageConflict {
            name: "vim".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(err.line(), None);
    }

    #[test]
    fn test_duplicate_message_names_both_lines() {
        let err = Error::DuplicateDirective {
            line: 9,
            name: "bootloader".to_string(),
            first_line: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("line 9"));
        assert!(msg.contains("line 4"));
        assert!(msg.contains("bootloader"));
    }
}
