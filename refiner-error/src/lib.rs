//! # refiner-error
//!
//! Unified error handling for refiner, in the style of OpenDAL's errors.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: what went wrong (e.g. Unsupported, RateLimited)
//! - **ErrorStatus**: whether trying again could help (Permanent, Temporary, Persistent)
//! - **Error Context**: key-value pairs that locate the cause
//! - **Error Source**: the wrapped underlying error, never leaked as a raw type
//!
//! ## Usage
//!
//! ```rust
//! use refiner_error::{Error, ErrorKind};
//!
//! fn pick(provider: &str) -> refiner_error::Result<()> {
//!     Err(Error::new(ErrorKind::Unsupported, format!("Unsupported provider: {}", provider))
//!         .with_operation("provider::parse")
//!         .with_context("provider", provider))
//! }
//!
//! assert!(pick("anthropic").is_err());
//! ```
//!
//! ## Principles
//!
//! - All fallible functions return `Result<T, refiner_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - An error is handled once; callers further up only append context

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the refiner Error
pub type Result<T> = std::result::Result<T, Error>;
