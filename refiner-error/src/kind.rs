//! Error kinds for refiner operations

use std::fmt;

/// The kind of error that occurred.
///
/// Callers match on `ErrorKind` to decide how to react; the message and
/// context are for humans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// The requested feature, provider or operation is not supported
    Unsupported,

    /// Invalid configuration, including missing credentials
    ConfigInvalid,

    /// Invalid argument passed to a function
    InvalidArgument,

    // =========================================================================
    // Inference/LLM errors
    // =========================================================================
    /// The completion endpoint returned an error or an unusable reply
    InferenceFailed,

    /// Rate limit exceeded
    RateLimited,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// Network error reaching the provider
    NetworkFailed,

    /// Permission denied (filesystem, or rejected API credentials)
    PermissionDenied,

    /// File not found
    FileNotFound,

    /// IO operation failed
    IoFailed,

    // =========================================================================
    // Parse errors
    // =========================================================================
    /// Failed to decode a response
    ParseFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            // General
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::Unsupported => "Unsupported",
            ErrorKind::ConfigInvalid => "ConfigInvalid",
            ErrorKind::InvalidArgument => "InvalidArgument",

            // Inference
            ErrorKind::InferenceFailed => "InferenceFailed",
            ErrorKind::RateLimited => "RateLimited",

            // IO
            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::FileNotFound => "FileNotFound",
            ErrorKind::IoFailed => "IoFailed",

            // Parse
            ErrorKind::ParseFailed => "ParseFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
