//! Error types for hotlru

use std::fmt;

/// Result type alias for hotlru operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for cache operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Capacity must be at least 1
    InvalidCapacity(usize),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCapacity(size) => {
                write!(f, "Invalid size: {} (capacity must be at least 1)", size)
            }
        }
    }
}

impl std::error::Error for Error {}
