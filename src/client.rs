//! Agones SDK client
//!
//! [`SdkClient`] is the application's handle on the sidecar. It runs two
//! background tasks once connected: the heartbeat driver and, as soon as a
//! listener is registered, the watch dispatcher. Unary calls run on the
//! caller's task, bounded by the configured deadline.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SdkConfig;
use crate::error::{Result, SdkError};
use crate::events::{EventHook, SdkEvent, StreamState};
use crate::heartbeat::HeartbeatDriver;
use crate::signal::{ShutdownTrigger, shutdown_channel};
use crate::state::GameServerState;
use crate::tracking::{Counter, CounterUpdate, List};
use crate::transport::{GrpcTransport, SdkTransport, TransportError};
use crate::watch::{ListenerRegistration, ListenerRegistry, WatchDispatcher};

/// Client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unstarted,
    Running,
    Closing,
    Closed,
}

struct Lifecycle {
    state: ClientState,
    /// 在 connect() 时捕获，用于之后从任意线程懒启动 watch
    runtime: Option<Handle>,
    heartbeat: Option<JoinHandle<()>>,
    watch: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: SdkConfig,
    transport: Arc<dyn SdkTransport>,
    hook: OnceLock<EventHook>,
    connect_lock: tokio::sync::Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
    listeners: Arc<ListenerRegistry>,
    shutdown: ShutdownTrigger,
    heartbeat_state: Arc<watch::Sender<StreamState>>,
    watch_state: Arc<watch::Sender<StreamState>>,
}

/// Handle on the local Agones sidecar.
///
/// Cheap to clone; all clones share one connection, one heartbeat and one
/// watch stream. Dropping the last clone without calling [`close`] still
/// stops the background tasks, but skips the bounded wait.
///
/// [`close`]: SdkClient::close
#[derive(Clone)]
pub struct SdkClient {
    inner: Arc<ClientInner>,
}

impl SdkClient {
    pub fn new(config: SdkConfig, transport: Arc<dyn SdkTransport>) -> Self {
        let (shutdown, _) = shutdown_channel();
        let (heartbeat_state, _) = watch::channel(StreamState::Idle);
        let (watch_state, _) = watch::channel(StreamState::Idle);

        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                hook: OnceLock::new(),
                connect_lock: tokio::sync::Mutex::new(()),
                lifecycle: Mutex::new(Lifecycle {
                    state: ClientState::Unstarted,
                    runtime: None,
                    heartbeat: None,
                    watch: None,
                }),
                listeners: Arc::new(ListenerRegistry::default()),
                shutdown,
                heartbeat_state: Arc::new(heartbeat_state),
                watch_state: Arc::new(watch_state),
            }),
        }
    }

    /// Client talking gRPC to `config.endpoint`.
    pub fn from_config(config: SdkConfig) -> Self {
        let transport = Arc::new(GrpcTransport::new(config.endpoint.clone()));
        Self::new(config, transport)
    }

    /// Install the observability hook. Must happen before [`connect`];
    /// only the first hook installed is kept.
    ///
    /// [`connect`]: SdkClient::connect
    pub fn with_event_hook<F>(self, hook: F) -> Self
    where
        F: Fn(&SdkEvent) + Send + Sync + 'static,
    {
        if self.inner.hook.set(Arc::new(hook)).is_err() {
            warn!("Event hook already installed, ignoring");
        }
        self
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn hook(&self) -> Option<EventHook> {
        self.inner.hook.get().cloned()
    }

    /// Connect to the sidecar and start the heartbeat.
    ///
    /// No-op when already running. The watch stream starts here as well if
    /// listeners were registered beforehand.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;

        match self.state() {
            ClientState::Running => return Ok(()),
            state @ (ClientState::Closing | ClientState::Closed) => {
                return Err(SdkError::IllegalState {
                    operation: "connect",
                    state,
                });
            }
            ClientState::Unstarted => {}
        }

        self.inner.config.validate()?;

        let timeout = self.inner.config.connect_timeout();
        let mut shutdown = self.inner.shutdown.subscribe();
        let connected = tokio::select! {
            result = tokio::time::timeout(timeout, self.inner.transport.connect(timeout)) => result,
            _ = shutdown.triggered() => {
                return Err(SdkError::IllegalState {
                    operation: "connect",
                    state: self.state(),
                });
            }
        };

        match connected {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(SdkError::Connection(e)),
            Err(_) => {
                return Err(SdkError::Connection(TransportError::Unavailable(format!(
                    "connect timed out after {timeout:?}"
                ))));
            }
        }

        if let Err(state) = self.start_tasks() {
            // close() 在连接过程中被调用
            self.inner.transport.close().await;
            return Err(SdkError::IllegalState {
                operation: "connect",
                state,
            });
        }

        info!("Agones SDK client connected to {}", self.inner.config.endpoint);
        Ok(())
    }

    /// Unstarted -> Running and spawn the background tasks onto the current
    /// runtime. Fails with the observed state if the client left Unstarted.
    fn start_tasks(&self) -> std::result::Result<(), ClientState> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != ClientState::Unstarted {
            return Err(lifecycle.state);
        }

        let runtime = Handle::current();
        lifecycle.state = ClientState::Running;
        lifecycle.heartbeat = Some(runtime.spawn(
            HeartbeatDriver {
                transport: self.inner.transport.clone(),
                config: self.inner.config.heartbeat.clone(),
                backoff: self.inner.config.backoff.clone(),
                open_timeout: self.inner.config.rpc_timeout(),
                hook: self.hook(),
                state: self.inner.heartbeat_state.clone(),
                shutdown: self.inner.shutdown.subscribe(),
            }
            .run(),
        ));
        lifecycle.runtime = Some(runtime);

        if self.inner.listeners.len() > 0 {
            self.start_watch(&mut lifecycle);
        }
        Ok(())
    }

    fn start_watch(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.watch.is_some() {
            return;
        }
        let Some(runtime) = lifecycle.runtime.as_ref() else {
            return;
        };

        lifecycle.watch = Some(runtime.spawn(
            WatchDispatcher {
                transport: self.inner.transport.clone(),
                listeners: self.inner.listeners.clone(),
                backoff: self.inner.config.backoff.clone(),
                open_timeout: self.inner.config.rpc_timeout(),
                hook: self.hook(),
                state: self.inner.watch_state.clone(),
                shutdown: self.inner.shutdown.subscribe(),
            }
            .run(),
        ));
    }

    /// Stop both streams, drop all listeners and close the transport.
    ///
    /// Waits at most `close_timeout` for the background tasks, then aborts
    /// them. In-flight unary calls fail with [`SdkError::IllegalState`].
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle();
            match lifecycle.state {
                ClientState::Closing | ClientState::Closed => return,
                ClientState::Unstarted => {
                    lifecycle.state = ClientState::Closed;
                    None
                }
                ClientState::Running => {
                    lifecycle.state = ClientState::Closing;
                    Some((lifecycle.heartbeat.take(), lifecycle.watch.take()))
                }
            }
        };

        info!("Closing Agones SDK client");
        self.inner.shutdown.trigger();
        self.inner.listeners.clear();

        let Some((heartbeat, watch)) = tasks else {
            info!("Agones SDK client closed before connecting");
            return;
        };

        let deadline = tokio::time::Instant::now() + self.inner.config.close_timeout();
        for (name, task) in [("heartbeat", heartbeat), ("watch", watch)] {
            let Some(mut task) = task else {
                continue;
            };
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                warn!("{} task did not stop in time, aborting", name);
                task.abort();
            }
        }
        self.inner.heartbeat_state.send_replace(StreamState::Stopped);
        self.inner.watch_state.send_replace(StreamState::Stopped);

        self.inner.transport.close().await;

        let mut lifecycle = self.lifecycle();
        lifecycle.state = ClientState::Closed;
        lifecycle.runtime = None;
        info!("Agones SDK client closed");
    }

    pub fn state(&self) -> ClientState {
        self.lifecycle().state
    }

    pub fn heartbeat_state(&self) -> StreamState {
        *self.inner.heartbeat_state.borrow()
    }

    pub fn watch_state(&self) -> StreamState {
        *self.inner.watch_state.borrow()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    // ========== Watch listeners ==========

    /// Subscribe to GameServer updates.
    ///
    /// Safe to call from any thread, including from inside a listener. A
    /// listener registered while an update is being delivered receives the
    /// following updates only. Returning an error or panicking is reported
    /// through the event hook and never affects other listeners.
    pub fn register_listener<F>(&self, listener: F) -> Result<ListenerRegistration>
    where
        F: Fn(&GameServerState) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut lifecycle = self.lifecycle();
        let state = lifecycle.state;
        if matches!(state, ClientState::Closing | ClientState::Closed) {
            return Err(SdkError::IllegalState {
                operation: "register_listener",
                state,
            });
        }

        let registration = self.inner.listeners.register(Arc::new(listener));
        if state == ClientState::Running {
            self.start_watch(&mut lifecycle);
        }
        Ok(registration)
    }

    /// Returns `false` if the listener was already removed.
    pub fn unregister_listener(&self, registration: ListenerRegistration) -> bool {
        self.inner.listeners.unregister(registration)
    }

    // ========== Unary calls ==========

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(Arc<dyn SdkTransport>) -> Fut,
        Fut: Future<Output = std::result::Result<T, TransportError>>,
    {
        let state = self.state();
        if state != ClientState::Running {
            return Err(SdkError::IllegalState { operation, state });
        }

        let timeout = self.inner.config.rpc_timeout();
        let mut shutdown = self.inner.shutdown.subscribe();
        debug!("Calling {}", operation);

        tokio::select! {
            result = tokio::time::timeout(timeout, f(self.inner.transport.clone())) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(SdkError::from_transport(operation, timeout, e)),
                Err(_) => Err(SdkError::Timeout { operation, timeout }),
            },
            _ = shutdown.triggered() => Err(SdkError::IllegalState {
                operation,
                state: self.state(),
            }),
        }
    }

    /// Tell the orchestrator the game server can take players.
    pub async fn mark_ready(&self) -> Result<()> {
        self.call("ready", |t| async move { t.ready().await }).await?;
        info!("GameServer marked Ready");
        Ok(())
    }

    /// Self-allocate the game server.
    pub async fn mark_allocated(&self) -> Result<()> {
        self.call("allocate", |t| async move { t.allocate().await })
            .await?;
        info!("GameServer marked Allocated");
        Ok(())
    }

    /// Mark the game server Reserved for `duration` (whole seconds). Zero
    /// keeps it Reserved until the next state change.
    pub async fn mark_reserved(&self, duration: Duration) -> Result<()> {
        let seconds = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        self.call("reserve", |t| async move { t.reserve(seconds).await })
            .await?;
        info!("GameServer marked Reserved for {}s", seconds);
        Ok(())
    }

    /// Ask the orchestrator to shut the game server down.
    pub async fn request_shutdown(&self) -> Result<()> {
        self.call("shutdown", |t| async move { t.shutdown().await })
            .await?;
        info!("GameServer shutdown requested");
        Ok(())
    }

    /// Set a metadata label; the sidecar prefixes the key with `agones.dev/sdk-`.
    pub async fn set_label(&self, key: &str, value: &str) -> Result<()> {
        require_non_empty("label key", key)?;
        let (key, value) = (key.to_string(), value.to_string());
        self.call("set_label", |t| async move { t.set_label(key, value).await })
            .await
    }

    /// Set a metadata annotation; the sidecar prefixes the key with `agones.dev/sdk-`.
    pub async fn set_annotation(&self, key: &str, value: &str) -> Result<()> {
        require_non_empty("annotation key", key)?;
        let (key, value) = (key.to_string(), value.to_string());
        self.call("set_annotation", |t| async move {
            t.set_annotation(key, value).await
        })
        .await
    }

    /// Fetch the current GameServer snapshot.
    pub async fn get_state(&self) -> Result<GameServerState> {
        self.call("get_game_server", |t| async move {
            t.get_game_server().await
        })
        .await
    }

    // ========== Counters and Lists ==========

    pub async fn get_counter(&self, name: &str) -> Result<Counter> {
        require_non_empty("counter name", name)?;
        let name = name.to_string();
        self.call("get_counter", |t| async move { t.get_counter(name).await })
            .await
    }

    /// Add `amount` (its absolute value) to a counter.
    pub async fn increment_counter(&self, name: &str, amount: i64) -> Result<Counter> {
        self.update_counter(CounterUpdate::increment(name, amount))
            .await
    }

    /// Subtract `amount` (its absolute value) from a counter.
    pub async fn decrement_counter(&self, name: &str, amount: i64) -> Result<Counter> {
        self.update_counter(CounterUpdate::decrement(name, amount))
            .await
    }

    pub async fn set_counter_count(&self, name: &str, count: i64) -> Result<Counter> {
        self.update_counter(CounterUpdate::set_count(name, count))
            .await
    }

    pub async fn set_counter_capacity(&self, name: &str, capacity: i64) -> Result<Counter> {
        self.update_counter(CounterUpdate::set_capacity(name, capacity))
            .await
    }

    pub async fn update_counter(&self, update: CounterUpdate) -> Result<Counter> {
        require_non_empty("counter name", &update.name)?;
        self.call("update_counter", |t| async move {
            t.update_counter(update).await
        })
        .await
    }

    pub async fn get_list(&self, name: &str) -> Result<List> {
        require_non_empty("list name", name)?;
        let name = name.to_string();
        self.call("get_list", |t| async move { t.get_list(name).await })
            .await
    }

    /// Update the fields of `list` named in `update_mask` (`capacity`, `values`).
    pub async fn update_list(&self, list: List, update_mask: Vec<String>) -> Result<List> {
        require_non_empty("list name", &list.name)?;
        self.call("update_list", |t| async move {
            t.update_list(list, update_mask).await
        })
        .await
    }

    pub async fn add_list_value(&self, name: &str, value: &str) -> Result<List> {
        require_non_empty("list name", name)?;
        let (name, value) = (name.to_string(), value.to_string());
        self.call("add_list_value", |t| async move {
            t.add_list_value(name, value).await
        })
        .await
    }

    pub async fn remove_list_value(&self, name: &str, value: &str) -> Result<List> {
        require_non_empty("list name", name)?;
        let (name, value) = (name.to_string(), value.to_string());
        self.call("remove_list_value", |t| async move {
            t.remove_list_value(name, value).await
        })
        .await
    }

    // ========== Player tracking ==========

    /// Returns `false` if the player was already connected.
    pub async fn player_connect(&self, player_id: &str) -> Result<bool> {
        require_non_empty("player id", player_id)?;
        let player_id = player_id.to_string();
        self.call("player_connect", |t| async move {
            t.player_connect(player_id).await
        })
        .await
    }

    /// Returns `false` if the player was not connected.
    pub async fn player_disconnect(&self, player_id: &str) -> Result<bool> {
        require_non_empty("player id", player_id)?;
        let player_id = player_id.to_string();
        self.call("player_disconnect", |t| async move {
            t.player_disconnect(player_id).await
        })
        .await
    }

    pub async fn is_player_connected(&self, player_id: &str) -> Result<bool> {
        require_non_empty("player id", player_id)?;
        let player_id = player_id.to_string();
        self.call("is_player_connected", |t| async move {
            t.is_player_connected(player_id).await
        })
        .await
    }

    pub async fn connected_players(&self) -> Result<Vec<String>> {
        self.call("connected_players", |t| async move {
            t.connected_players().await
        })
        .await
    }

    pub async fn set_player_capacity(&self, capacity: i64) -> Result<()> {
        self.call("set_player_capacity", |t| async move {
            t.set_player_capacity(capacity).await
        })
        .await
    }

    pub async fn player_capacity(&self) -> Result<i64> {
        self.call("player_capacity", |t| async move {
            t.player_capacity().await
        })
        .await
    }

    pub async fn player_count(&self) -> Result<i64> {
        self.call("player_count", |t| async move { t.player_count().await })
            .await
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SdkError::InvalidArgument(format!("{what} cannot be empty")));
    }
    Ok(())
}
