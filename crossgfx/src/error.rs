//! Error types for crossgfx
//!
//! Every operation of the abstraction layer is synchronous and never retried,
//! so failures are reported once, as a typed value, to the immediate caller.

use std::fmt;

/// Result type for crossgfx operations
pub type Result<T> = std::result::Result<T, Error>;

/// crossgfx errors
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Backend-specific error (Vulkan, software, etc.)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (wrong kind, wrong backend, out of range access, etc.)
    InvalidResource(String),

    /// Initialization failed (device, swapchain, context)
    InitializationFailed(String),

    /// Operation not allowed in the current command list or mapping state
    InvalidState(String),

    /// A usage tag that cannot appear at this position of a transition
    UnsupportedUsage(String),

    /// A view kind that the requested heap cannot hold
    UnsupportedViewKind(String),

    /// The resource was not created with the view the heap entry asks for
    MissingView(String),

    /// The claimed "before" usage disagrees with the last tracked usage
    UsageMismatch(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::UnsupportedUsage(msg) => write!(f, "Unsupported usage: {}", msg),
            Error::UnsupportedViewKind(msg) => write!(f, "Unsupported view kind: {}", msg),
            Error::MissingView(msg) => write!(f, "Missing view: {}", msg),
            Error::UsageMismatch(msg) => write!(f, "Usage mismatch: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
