//! Server error types.

use std::io;

use emsmdb_core::{MapiStatus, PropertyError, TracingError};
use emsmdb_protocol::ProtocolError;
use thiserror::Error;

use crate::handles::Handle;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Result type for backing store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a backing store or while writing through to it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store has no object with this identity.
    #[error("object {id:#x} not found in store")]
    ObjectNotFound { id: u64 },

    /// The object was not opened for writing.
    #[error("object {id:#x} was opened read-only")]
    ReadOnly { id: u64 },

    /// A value could not be converted for writing.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// The store refused the operation.
    #[error("store error: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns the protocol status code for this error.
    pub fn status(&self) -> MapiStatus {
        match self {
            Self::ObjectNotFound { .. } => MapiStatus::NotFound,
            Self::ReadOnly { .. } => MapiStatus::NoAccess,
            Self::Property(e) => e.status(),
            Self::Backend { .. } => MapiStatus::CallFailed,
        }
    }
}

/// Errors that can occur in the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// No session was supplied with the request.
    #[error("provider context is not initialized")]
    NotInitialized,

    /// Malformed request or arguments.
    #[error("invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The handle is not in the session's handle table.
    #[error("unknown handle {0}")]
    UnknownHandle(Handle),

    /// The handle refers to an object of the wrong kind.
    #[error("handle {handle} is a {actual}, expected {expected}")]
    WrongKind {
        handle: Handle,
        expected: &'static str,
        actual: &'static str,
    },

    /// The session's handle table is full.
    #[error("handle table is full (max: {max})")]
    HandleLimit { max: usize },

    /// Something the caller asked about does not exist.
    #[error("{what} not found")]
    NotFound { what: &'static str },

    /// Protocol error (encoding, decoding, blob limits).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Property conversion error.
    #[error("Property error: {0}")]
    Property(#[from] PropertyError),

    /// Backing store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Tracing setup error.
    #[error("Tracing error: {0}")]
    Tracing(#[from] TracingError),

    /// IO error (config file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Creates an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a wrong kind error.
    pub fn wrong_kind(handle: Handle, expected: &'static str, actual: &'static str) -> Self {
        Self::WrongKind {
            handle,
            expected,
            actual,
        }
    }

    /// Returns the protocol status code for this error.
    pub fn status(&self) -> MapiStatus {
        match self {
            Self::NotInitialized => MapiStatus::NotInitialized,
            Self::InvalidParameter { .. } | Self::WrongKind { .. } => MapiStatus::InvalidParameter,
            Self::UnknownHandle(_) => MapiStatus::UnknownHandle,
            Self::HandleLimit { .. } => MapiStatus::NotEnoughResources,
            Self::NotFound { .. } => MapiStatus::NotFound,
            Self::Protocol(e) => e.status(),
            Self::Property(e) => e.status(),
            Self::Store(e) => e.status(),
            Self::Config { .. } | Self::Tracing(_) | Self::Io(_) => MapiStatus::CallFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_statuses() {
        assert_eq!(
            ServerError::NotInitialized.status(),
            MapiStatus::NotInitialized
        );
        assert_eq!(
            ServerError::invalid_parameter("empty handle array").status(),
            MapiStatus::InvalidParameter
        );
        assert_eq!(
            ServerError::UnknownHandle(9).status(),
            MapiStatus::UnknownHandle
        );
        assert_eq!(
            ServerError::HandleLimit { max: 1 }.status(),
            MapiStatus::NotEnoughResources
        );
    }

    #[test]
    fn nested_statuses() {
        let e = ServerError::from(StoreError::ReadOnly { id: 1 });
        assert_eq!(e.status(), MapiStatus::NoAccess);

        let e = ServerError::from(PropertyError::InvalidPropertyValue {
            position: 1,
            value: 300,
        });
        assert_eq!(e.status(), MapiStatus::InvalidPropertyValue);

        let e = ServerError::from(ProtocolError::BlobTooLarge {
            size: 70_000,
            max: 65_535,
        });
        assert_eq!(e.status(), MapiStatus::NotEnoughResources);
    }

    #[test]
    fn messages() {
        assert_eq!(
            ServerError::wrong_kind(3, "message", "folder").to_string(),
            "handle 3 is a folder, expected message"
        );
        assert_eq!(
            StoreError::ObjectNotFound { id: 0x10 }.to_string(),
            "object 0x10 not found in store"
        );
    }
}
