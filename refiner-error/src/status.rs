//! Error status - whether an operation is worth attempting again

use std::fmt;

/// How a caller may react to an error.
///
/// Nothing in refiner retries on its own; the status is surfaced so that
/// embedding code can make that call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStatus {
    /// Retrying will not help
    Permanent,
    /// Retrying may succeed (rate limits, transient network failures)
    Temporary,
    /// Was temporary, but kept failing after retries
    Persistent,
}

impl ErrorStatus {
    /// Check if the error may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorStatus::Temporary)
    }

    /// Transition after retries were exhausted.
    ///
    /// Only `Temporary` changes; the other states are already final.
    pub fn persist(self) -> Self {
        match self {
            ErrorStatus::Temporary => ErrorStatus::Persistent,
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStatus::Permanent => "permanent",
            ErrorStatus::Temporary => "temporary",
            ErrorStatus::Persistent => "persistent",
        }
    }
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
