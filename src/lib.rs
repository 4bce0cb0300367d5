//! agones-sdk - client for the Agones game server sidecar
//!
//! A game server process uses this crate to talk to the Agones sidecar
//! running next to it in the same pod.
//!
//! # Components
//!
//! - **Lifecycle client** ([`SdkClient`]): Ready / Allocate / Reserve /
//!   Shutdown, labels and annotations, GameServer queries, counters, lists
//!   and player tracking
//! - **Heartbeat driver**: keeps the `Health` stream alive in the background
//! - **Watch dispatcher**: fans GameServer updates out to registered
//!   listeners
//! - **Backoff** ([`BackoffConfig`]): reconnect policy for both streams
//! - **Event hook** ([`SdkEvent`]): visibility into background stream
//!   activity
//!
//! # Architecture
//!
//! ```text
//!     ┌─────────────────────┐                    ┌─────────────────────┐
//!     │    game server      │                    │   Agones sidecar    │
//!     ├─────────────────────┤                    ├─────────────────────┤
//!     │  SdkClient (unary)  │ ─────────────────► │                     │
//!     │  heartbeat task     │ ── Health ───────► │     SDK service     │
//!     │  watch task         │ ◄── WatchGameServer│                     │
//!     └─────────────────────┘                    └─────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use agones_sdk::{SdkClient, SdkConfig};
//!
//! # async fn run() -> agones_sdk::Result<()> {
//! let client = SdkClient::from_config(SdkConfig::from_env());
//! client.connect().await?;
//!
//! client.register_listener(|gs| {
//!     println!("GameServer is now {}", gs.phase);
//!     Ok(())
//! })?;
//!
//! client.mark_ready().await?;
//! // ... serve players ...
//! client.request_shutdown().await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
mod heartbeat;
mod signal;
pub mod state;
pub mod tracking;
pub mod transport;
pub mod watch;

// Re-export important types
pub use backoff::{Backoff, BackoffConfig};
pub use client::{ClientState, SdkClient};
pub use config::{HeartbeatConfig, SdkConfig};
pub use error::{ListenerError, Result, SdkError};
pub use events::{EventHook, SdkEvent, StreamKind, StreamState};
pub use state::{GameServerPhase, GameServerState};
pub use tracking::{Counter, CounterUpdate, List};
pub use transport::{GrpcTransport, SdkTransport, TransportError};
pub use watch::{Listener, ListenerRegistration};
