//! Transient/permanent error classification.
//!
//! The retry machinery never inspects error variants directly. Every error
//! type that flows through it implements [`ErrorClassifier`], and only
//! [`ErrorClass::Transient`] errors are retried.

use serde::{Deserialize, Serialize};
use std::io;

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// May succeed if the same operation is attempted again.
    Transient,
    /// Will fail again no matter how often it is attempted.
    Permanent,
}

impl ErrorClass {
    /// Lowercase label used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies an error as transient or permanent.
///
/// Implement this for error types that pass through
/// [`RetryHandler`](crate::RetryHandler).
pub trait ErrorClassifier {
    /// Returns the class of this error.
    fn classify(&self) -> ErrorClass;

    /// Shorthand for `classify() == ErrorClass::Transient`.
    fn is_transient(&self) -> bool {
        self.classify() == ErrorClass::Transient
    }

    /// False if the operation was refused before it ran.
    ///
    /// Refused attempts are not counted and end a retry loop.
    fn was_attempted(&self) -> bool {
        true
    }
}

impl<T: ErrorClassifier + ?Sized> ErrorClassifier for &T {
    fn classify(&self) -> ErrorClass {
        (**self).classify()
    }

    fn was_attempted(&self) -> bool {
        (**self).was_attempted()
    }
}

impl<T: ErrorClassifier + ?Sized> ErrorClassifier for Box<T> {
    fn classify(&self) -> ErrorClass {
        (**self).classify()
    }

    fn was_attempted(&self) -> bool {
        (**self).was_attempted()
    }
}

impl ErrorClassifier for io::Error {
    fn classify(&self) -> ErrorClass {
        match self.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::UnexpectedEof => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}
