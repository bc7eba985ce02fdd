//! # Error Handling
//!
//! Error types for Kozane operations.
//!
//! ## Design Principles
//!
//! 1. **Actionable**: errors carry the context needed to act on them
//!    (paths, indexes, lengths)
//! 2. **Recoverable**: fatal conditions (corrupt headers) are
//!    distinguished from conditions the engine absorbs (torn entries)

use thiserror::Error;

/// Result type alias for Kozane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Primary error type for Kozane
#[derive(Error, Debug)]
pub enum Error {
    // Storage errors
    #[error("IO error: {message}")]
    Io { message: String, source: std::io::Error },

    #[error("corrupt array file header: {message}")]
    CorruptHeader { message: String },

    #[error("corrupt entry file: {message}")]
    CorruptEntry { message: String },

    // Array contract errors
    #[error("index {index} out of range (length {length})")]
    IndexOutOfRange { index: u32, length: u32 },

    #[error("array is not open: {operation}")]
    NotOpen { operation: &'static str },

    /// Raised by an entry at capacity. Consumed by the rollover path in the
    /// entry manager and never surfaced through the array facade.
    #[error("entry is full ({capacity} records)")]
    EntryFull { capacity: usize },

    // Clock errors
    #[error("incomparable clocks: {left} vs {right}")]
    IncomparableClocks { left: String, right: String },

    // System errors
    #[error("configuration error: {message}")]
    Configuration { message: String },
}

impl Error {
    /// Check if the error leaves the store in a usable state
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Io { .. } => false,
            Error::CorruptHeader { .. } => false,
            Error::CorruptEntry { .. } => true,
            Error::IndexOutOfRange { .. } => true,
            Error::NotOpen { .. } => true,
            Error::EntryFull { .. } => true,
            Error::IncomparableClocks { .. } => true,
            Error::Configuration { .. } => true,
        }
    }

    /// Get error code for monitoring
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Io { .. } => "IO_ERROR",
            Error::CorruptHeader { .. } => "CORRUPT_HEADER",
            Error::CorruptEntry { .. } => "CORRUPT_ENTRY",
            Error::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
            Error::NotOpen { .. } => "NOT_OPEN",
            Error::EntryFull { .. } => "ENTRY_FULL",
            Error::IncomparableClocks { .. } => "INCOMPARABLE_CLOCKS",
            Error::Configuration { .. } => "CONFIG_ERROR",
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Extension trait for attaching file-path context to I/O results
pub trait IoResultExt<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn io_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::Io {
            message: format!("{}: {}", f(), e),
            source: e,
        })
    }
}
