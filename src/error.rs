//! Error types for the Agones SDK client

use std::time::Duration;

use thiserror::Error;

use crate::client::ClientState;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors surfaced to callers of [`SdkClient`](crate::SdkClient).
///
/// Background stream failures never show up here; they are reported through
/// the event hook only.
#[derive(Debug, Error)]
pub enum SdkError {
    /// The sidecar could not be reached (on connect, or for a unary call).
    #[error("Connection error: {0}")]
    Connection(TransportError),

    /// The sidecar answered a unary call with a failure.
    #[error("RPC {operation} failed: {source}")]
    Rpc {
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// The per-call deadline elapsed.
    #[error("RPC {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Operation attempted while the client is not in a state that allows it.
    #[error("Cannot {operation} while client is {state:?}")]
    IllegalState {
        operation: &'static str,
        state: ClientState,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SdkError {
    /// Classify a transport failure of a unary call.
    pub(crate) fn from_transport(
        operation: &'static str,
        timeout: Duration,
        err: TransportError,
    ) -> Self {
        match err {
            TransportError::Unavailable(_) => SdkError::Connection(err),
            TransportError::DeadlineExceeded => SdkError::Timeout { operation, timeout },
            source => SdkError::Rpc { operation, source },
        }
    }

    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SdkError::Connection(_) | SdkError::Timeout { .. })
            && !matches!(self, SdkError::Connection(TransportError::PermissionDenied(_)))
    }
}

/// A listener callback failure.
///
/// Never returned to a caller: it is only carried by
/// [`SdkEvent::ListenerFailed`](crate::events::SdkEvent::ListenerFailed).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListenerError {
    #[error("listener returned an error: {0}")]
    Failed(String),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        ListenerError::Panicked(message)
    }
}
