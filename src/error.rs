//! Error types for strata.

use thiserror::Error;

/// Result type alias using strata's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Recoverable error codes returned by value from fallible operations.
///
/// The reference-counting and buffer core prefers silent success or a fatal
/// assertion over returned error values: misuse of the ownership discipline
/// is a programming error, not a runtime condition. This taxonomy exists for
/// the layers where external input (files, devices, formats) legitimately
/// fails.
#[derive(Error, Debug)]
pub enum Error {
    /// The operation is not supported by this object or backend.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// The operation is invalid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The content is malformed or truncated.
    #[error("bad content: {0}")]
    BadContent(String),

    /// The supplied parameters are out of range or inconsistent.
    #[error("bad parameters: {0}")]
    BadParameters(String),

    /// The data format is unrecognized or mismatched.
    #[error("bad format: {0}")]
    BadFormat(String),

    /// The operation cannot complete right now; retry later.
    #[error("try again")]
    TryAgain,

    /// The resource is busy; pull before pushing again.
    #[error("resource busy")]
    Busy,

    /// Memory could not be obtained for a recoverable request.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// An underlying system call failed.
    #[error("system error: {0}")]
    System(#[from] std::io::Error),
}
