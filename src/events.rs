//! Observability hook for background stream activity.
//!
//! Background streams have no caller to return errors to, so everything they
//! go through is logged with `tracing` and handed to the optional hook.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::ListenerError;
use crate::transport::TransportError;
use crate::watch::ListenerRegistration;

/// Which long-lived stream an event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Heartbeat,
    Watch,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Heartbeat => f.write_str("heartbeat"),
            StreamKind::Watch => f.write_str("watch"),
        }
    }
}

/// Lifecycle of one long-lived stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    Idle,
    Streaming,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
    /// A stream was opened; `epoch` is 0 for the first open.
    StreamConnected { stream: StreamKind, epoch: u64 },

    /// A stream failed to open or broke.
    StreamDisconnected {
        stream: StreamKind,
        cause: TransportError,
    },

    /// A reopen will be attempted after `delay`.
    ReconnectScheduled {
        stream: StreamKind,
        attempt: u32,
        delay: Duration,
    },

    /// A stream was reopened after a failure. Watch events may have been
    /// missed in between.
    Reconnected { stream: StreamKind, epoch: u64 },

    /// A listener callback failed while handling a watch event.
    ListenerFailed {
        registration: ListenerRegistration,
        error: ListenerError,
    },
}

pub type EventHook = Arc<dyn Fn(&SdkEvent) + Send + Sync>;

/// Logs `event` and forwards it to the hook, if any. A panicking hook is
/// logged and swallowed so the calling stream task keeps running.
pub(crate) fn emit(hook: &Option<EventHook>, event: SdkEvent) {
    match &event {
        SdkEvent::StreamConnected { stream, epoch } => {
            info!("{} stream connected (epoch {})", stream, epoch);
        }
        SdkEvent::StreamDisconnected { stream, cause } => {
            warn!("{} stream disconnected: {}", stream, cause);
        }
        SdkEvent::ReconnectScheduled {
            stream,
            attempt,
            delay,
        } => {
            debug!(
                stream = %stream,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                "Reconnect scheduled"
            );
        }
        SdkEvent::Reconnected { stream, epoch } => {
            info!("{} stream reconnected (epoch {})", stream, epoch);
        }
        SdkEvent::ListenerFailed {
            registration,
            error,
        } => {
            warn!("Watch listener {:?} failed: {}", registration, error);
        }
    }

    if let Some(hook) = hook {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| hook(&event))) {
            warn!(
                "Event hook panicked on {:?}: {}",
                event,
                ListenerError::from_panic(payload)
            );
        }
    }
}
