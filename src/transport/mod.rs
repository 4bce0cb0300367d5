//! Transport seam between the client and the sidecar.
//!
//! [`SdkTransport`] is everything the client needs from the sidecar: connect
//! and close, one method per unary RPC, and openers for the two long-lived
//! streams. [`GrpcTransport`] is the tonic implementation; tests plug in
//! scripted fakes.

mod grpc;
#[cfg(test)]
pub(crate) mod mock;

pub use grpc::GrpcTransport;

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_stream::Stream;

use crate::state::GameServerState;
use crate::tracking::{Counter, CounterUpdate, List};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("sidecar unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("not implemented by sidecar: {0}")]
    Unimplemented(String),

    #[error("stream closed by sidecar")]
    Closed,

    #[error("sidecar returned {code:?}: {message}")]
    Status { code: tonic::Code, message: String },
}

impl From<tonic::Status> for TransportError {
    fn from(status: tonic::Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            tonic::Code::Unavailable => TransportError::Unavailable(message),
            tonic::Code::DeadlineExceeded => TransportError::DeadlineExceeded,
            tonic::Code::PermissionDenied | tonic::Code::Unauthenticated => {
                TransportError::PermissionDenied(message)
            }
            tonic::Code::Unimplemented => TransportError::Unimplemented(message),
            code => TransportError::Status { code, message },
        }
    }
}

impl From<tonic::transport::Error> for TransportError {
    fn from(err: tonic::transport::Error) -> Self {
        TransportError::Unavailable(err.to_string())
    }
}

/// Outbound half of an open health stream.
#[async_trait]
pub trait HealthSender: Send {
    /// Queue one liveness signal. Must not wait on the sidecar; an error
    /// means the stream is gone and has to be reopened.
    async fn send(&mut self) -> Result<(), TransportError>;
}

pub type BoxHealthSender = Box<dyn HealthSender>;

/// Inbound GameServer updates of an open watch stream.
pub type WatchStream =
    Pin<Box<dyn Stream<Item = Result<GameServerState, TransportError>> + Send + 'static>>;

/// Connection to the local sidecar.
///
/// Implementations must allow concurrent calls: the heartbeat task, the
/// watch task and any number of application tasks share one instance.
#[async_trait]
pub trait SdkTransport: Send + Sync + 'static {
    async fn connect(&self, timeout: Duration) -> Result<(), TransportError>;

    async fn close(&self);

    async fn ready(&self) -> Result<(), TransportError>;

    async fn allocate(&self) -> Result<(), TransportError>;

    async fn reserve(&self, seconds: i64) -> Result<(), TransportError>;

    async fn shutdown(&self) -> Result<(), TransportError>;

    async fn set_label(&self, key: String, value: String) -> Result<(), TransportError>;

    async fn set_annotation(&self, key: String, value: String) -> Result<(), TransportError>;

    async fn get_game_server(&self) -> Result<GameServerState, TransportError>;

    async fn open_health(&self) -> Result<BoxHealthSender, TransportError>;

    async fn open_watch(&self) -> Result<WatchStream, TransportError>;

    // Counters and Lists (beta)

    async fn get_counter(&self, name: String) -> Result<Counter, TransportError> {
        Err(TransportError::Unimplemented(format!("get_counter({name})")))
    }

    async fn update_counter(&self, update: CounterUpdate) -> Result<Counter, TransportError> {
        Err(TransportError::Unimplemented(format!(
            "update_counter({})",
            update.name
        )))
    }

    async fn get_list(&self, name: String) -> Result<List, TransportError> {
        Err(TransportError::Unimplemented(format!("get_list({name})")))
    }

    async fn update_list(
        &self,
        list: List,
        _update_mask: Vec<String>,
    ) -> Result<List, TransportError> {
        Err(TransportError::Unimplemented(format!(
            "update_list({})",
            list.name
        )))
    }

    async fn add_list_value(&self, name: String, _value: String) -> Result<List, TransportError> {
        Err(TransportError::Unimplemented(format!("add_list_value({name})")))
    }

    async fn remove_list_value(
        &self,
        name: String,
        _value: String,
    ) -> Result<List, TransportError> {
        Err(TransportError::Unimplemented(format!(
            "remove_list_value({name})"
        )))
    }

    // Player tracking (alpha)

    async fn player_connect(&self, _player_id: String) -> Result<bool, TransportError> {
        Err(TransportError::Unimplemented("player_connect".to_string()))
    }

    async fn player_disconnect(&self, _player_id: String) -> Result<bool, TransportError> {
        Err(TransportError::Unimplemented("player_disconnect".to_string()))
    }

    async fn is_player_connected(&self, _player_id: String) -> Result<bool, TransportError> {
        Err(TransportError::Unimplemented(
            "is_player_connected".to_string(),
        ))
    }

    async fn connected_players(&self) -> Result<Vec<String>, TransportError> {
        Err(TransportError::Unimplemented("connected_players".to_string()))
    }

    async fn set_player_capacity(&self, _capacity: i64) -> Result<(), TransportError> {
        Err(TransportError::Unimplemented(
            "set_player_capacity".to_string(),
        ))
    }

    async fn player_capacity(&self) -> Result<i64, TransportError> {
        Err(TransportError::Unimplemented("player_capacity".to_string()))
    }

    async fn player_count(&self) -> Result<i64, TransportError> {
        Err(TransportError::Unimplemented("player_count".to_string()))
    }
}
