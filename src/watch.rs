//! GameServer watch dispatcher and listener registry.
//!
//! One server-streaming `WatchGameServer` call feeds every registered
//! listener. Updates are delivered synchronously and in receive order: the
//! next message is not read until all listeners returned for the current
//! one, so a slow listener delays everyone.
//!
//! The listener set is copy-on-write. Each delivery pass works on a snapshot
//! taken before the pass and no lock is held while a callback runs, which
//! lets callbacks register or unregister listeners themselves.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::backoff::{Backoff, BackoffConfig};
use crate::error::ListenerError;
use crate::events::{EventHook, SdkEvent, StreamKind, StreamState, emit};
use crate::signal::ShutdownSignal;
use crate::state::GameServerState;
use crate::transport::{SdkTransport, TransportError, WatchStream};

/// Callback invoked for every GameServer update.
pub type Listener = Arc<dyn Fn(&GameServerState) -> anyhow::Result<()> + Send + Sync>;

/// Handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerRegistration {
    id: u64,
}

impl ListenerRegistration {
    pub fn id(&self) -> u64 {
        self.id
    }
}

struct Entry {
    id: u64,
    listener: Listener,
    /// 注销时置 false，正在进行的分发轮次据此跳过
    active: AtomicBool,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    entries: RwLock<Arc<Vec<Arc<Entry>>>>,
}

impl ListenerRegistry {
    pub(crate) fn register(&self, listener: Listener) -> ListenerRegistration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            id,
            listener,
            active: AtomicBool::new(true),
        });

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut next = Vec::with_capacity(entries.len() + 1);
        next.extend(entries.iter().cloned());
        next.push(entry);
        *entries = Arc::new(next);

        debug!("Registered watch listener {}", id);
        ListenerRegistration { id }
    }

    pub(crate) fn unregister(&self, registration: ListenerRegistration) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.iter().find(|e| e.id == registration.id).cloned() else {
            return false;
        };

        entry.active.store(false, Ordering::Release);
        let next: Vec<_> = entries
            .iter()
            .filter(|e| e.id != registration.id)
            .cloned()
            .collect();
        *entries = Arc::new(next);

        debug!("Unregistered watch listener {}", registration.id);
        true
    }

    fn snapshot(&self) -> Arc<Vec<Arc<Entry>>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        for entry in entries.iter() {
            entry.active.store(false, Ordering::Release);
        }
        *entries = Arc::new(Vec::new());
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Deliver one update to every listener of the current snapshot.
    pub(crate) fn dispatch(&self, state: &GameServerState, hook: &Option<EventHook>) {
        let snapshot = self.snapshot();
        for entry in snapshot.iter() {
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }

            let outcome = catch_unwind(AssertUnwindSafe(|| (entry.listener)(state)));
            let error = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => ListenerError::Failed(format!("{e:#}")),
                Err(payload) => ListenerError::from_panic(payload),
            };
            emit(
                hook,
                SdkEvent::ListenerFailed {
                    registration: ListenerRegistration { id: entry.id },
                    error,
                },
            );
        }
    }
}

pub(crate) struct WatchDispatcher {
    pub(crate) transport: Arc<dyn SdkTransport>,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) backoff: BackoffConfig,
    pub(crate) open_timeout: Duration,
    pub(crate) hook: Option<EventHook>,
    pub(crate) state: Arc<watch::Sender<StreamState>>,
    pub(crate) shutdown: ShutdownSignal,
}

impl WatchDispatcher {
    pub(crate) async fn run(mut self) {
        info!("Watch dispatcher started");

        let mut backoff = Backoff::new(self.backoff.clone());
        let mut next_epoch: u64 = 0;

        loop {
            let opened = tokio::select! {
                result = tokio::time::timeout(self.open_timeout, self.transport.open_watch()) => {
                    result.unwrap_or(Err(TransportError::DeadlineExceeded))
                }
                _ = self.shutdown.triggered() => break,
            };

            let cause = match opened {
                Ok(stream) => {
                    backoff.reset();
                    let epoch = next_epoch;
                    next_epoch += 1;
                    if epoch > 0 {
                        // 断线期间的更新不会补发
                        emit(
                            &self.hook,
                            SdkEvent::Reconnected {
                                stream: StreamKind::Watch,
                                epoch,
                            },
                        );
                    }
                    emit(
                        &self.hook,
                        SdkEvent::StreamConnected {
                            stream: StreamKind::Watch,
                            epoch,
                        },
                    );
                    self.state.send_replace(StreamState::Streaming);

                    match self.deliver(stream).await {
                        Some(cause) => cause,
                        None => break,
                    }
                }
                Err(cause) => cause,
            };

            emit(
                &self.hook,
                SdkEvent::StreamDisconnected {
                    stream: StreamKind::Watch,
                    cause,
                },
            );
            self.state.send_replace(StreamState::Reconnecting);

            let attempt = backoff.attempt() + 1;
            let delay = backoff.next_delay();
            emit(
                &self.hook,
                SdkEvent::ReconnectScheduled {
                    stream: StreamKind::Watch,
                    attempt,
                    delay,
                },
            );
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }

        self.state.send_replace(StreamState::Stopped);
        info!("Watch dispatcher stopped");
    }

    /// Read and dispatch until the stream breaks (`Some(cause)`) or shutdown
    /// (`None`).
    async fn deliver(&mut self, mut stream: WatchStream) -> Option<TransportError> {
        loop {
            let next = tokio::select! {
                next = stream.next() => next,
                _ = self.shutdown.triggered() => return None,
            };

            match next {
                Some(Ok(state)) => {
                    debug!("GameServer update: phase={}", state.phase);
                    self.listeners.dispatch(&state, &self.hook);
                }
                Some(Err(cause)) => return Some(cause),
                None => return Some(TransportError::Closed),
            }
        }
    }
}
