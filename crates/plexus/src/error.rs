// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every public plexus operation.

/// Errors returned by plexus operations.
///
/// Node operations never panic on bad input; they return one of these
/// variants and the caller decides what to do.
///
/// # Example
///
/// ```rust,no_run
/// use plexus::{Error, Node};
///
/// let node = Node::new()?;
/// match node.advertise("") {
///     Err(Error::InvalidTopic) => println!("topic names must not be empty"),
///     Err(e) => println!("other error: {}", e),
///     Ok(()) => unreachable!(),
/// }
/// # Ok::<(), plexus::Error>(())
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Contract Errors
    // ========================================================================
    /// Topic name is empty.
    InvalidTopic,
    /// Service name is empty.
    InvalidService,

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// Payload could not be encoded. Nothing was sent.
    Serialization(String),
    /// Payload could not be decoded into the requested type.
    Deserialization(String),
    /// Payload type name does not match the requested message type.
    TypeMismatch { expected: String, found: String },
    /// Encoded frame exceeds the maximum datagram size.
    PayloadTooLarge(usize),

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Failed to create or bind one of the context sockets.
    BindFailed(String),
    /// I/O error with underlying cause.
    IoError(std::io::Error),
    /// Send operation failed.
    SendFailed(String),
    /// Bounded dispatch queue is full; local delivery was rejected.
    WouldBlock,
    /// Context is shutting down.
    ShuttingDown,

    // ========================================================================
    // Service Errors
    // ========================================================================
    /// No local or remote provider is known for the service.
    ServiceUnavailable(String),
    /// The provider returned an error (or panicked) while handling the request.
    ServiceFailed(String),
    /// No response arrived before the deadline.
    Timeout,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTopic => write!(f, "Invalid topic: name must not be empty"),
            Error::InvalidService => write!(f, "Invalid service: name must not be empty"),
            Error::Serialization(msg) => write!(f, "Serialization failed: {}", msg),
            Error::Deserialization(msg) => write!(f, "Deserialization failed: {}", msg),
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected '{}', found '{}'", expected, found)
            }
            Error::PayloadTooLarge(len) => write!(f, "Payload too large: {} bytes", len),
            Error::BindFailed(msg) => write!(f, "Bind failed: {}", msg),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            Error::WouldBlock => write!(f, "Dispatch queue full"),
            Error::ShuttingDown => write!(f, "Context is shutting down"),
            Error::ServiceUnavailable(name) => write!(f, "Service unavailable: {}", name),
            Error::ServiceFailed(msg) => write!(f, "Service failed: {}", msg),
            Error::Timeout => write!(f, "Request timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e)
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
