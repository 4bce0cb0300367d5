//! Health heartbeat driver.
//!
//! Keeps one client-streaming `Health` call open and pushes an empty message
//! every period. A broken stream is reopened with backoff until the client
//! shuts down; failures never reach the application, only logs and the
//! event hook.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::backoff::{Backoff, BackoffConfig};
use crate::config::HeartbeatConfig;
use crate::events::{EventHook, SdkEvent, StreamKind, StreamState, emit};
use crate::signal::ShutdownSignal;
use crate::transport::{BoxHealthSender, SdkTransport, TransportError};

pub(crate) struct HeartbeatDriver {
    pub(crate) transport: Arc<dyn SdkTransport>,
    pub(crate) config: HeartbeatConfig,
    pub(crate) backoff: BackoffConfig,
    /// 打开流的时限，超时按 DeadlineExceeded 断线处理
    pub(crate) open_timeout: Duration,
    pub(crate) hook: Option<EventHook>,
    pub(crate) state: Arc<watch::Sender<StreamState>>,
    pub(crate) shutdown: ShutdownSignal,
}

impl HeartbeatDriver {
    pub(crate) async fn run(mut self) {
        info!(
            "Heartbeat driver started (period {:?})",
            self.config.period()
        );

        let initial_delay = self.config.initial_delay();
        if !initial_delay.is_zero() && !self.shutdown.sleep(initial_delay).await {
            self.stop();
            return;
        }

        let mut backoff = Backoff::new(self.backoff.clone());
        let mut next_epoch: u64 = 0;

        loop {
            let opened = tokio::select! {
                result = tokio::time::timeout(self.open_timeout, self.transport.open_health()) => {
                    result.unwrap_or(Err(TransportError::DeadlineExceeded))
                }
                _ = self.shutdown.triggered() => break,
            };

            let cause = match opened {
                Ok(sender) => {
                    backoff.reset();
                    let epoch = next_epoch;
                    next_epoch += 1;
                    if epoch > 0 {
                        emit(&self.hook, SdkEvent::Reconnected {
                            stream: StreamKind::Heartbeat,
                            epoch,
                        });
                    }
                    emit(&self.hook, SdkEvent::StreamConnected {
                        stream: StreamKind::Heartbeat,
                        epoch,
                    });
                    self.state.send_replace(StreamState::Streaming);

                    match self.pump(sender).await {
                        Some(cause) => cause,
                        None => break,
                    }
                }
                Err(cause) => cause,
            };

            emit(&self.hook, SdkEvent::StreamDisconnected {
                stream: StreamKind::Heartbeat,
                cause,
            });
            self.state.send_replace(StreamState::Reconnecting);

            let attempt = backoff.attempt() + 1;
            let delay = backoff.next_delay();
            emit(&self.hook, SdkEvent::ReconnectScheduled {
                stream: StreamKind::Heartbeat,
                attempt,
                delay,
            });
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }

        self.stop();
    }

    /// Beat until the stream breaks (`Some(cause)`) or shutdown (`None`).
    /// The sender is dropped on return, which cancels the underlying call.
    async fn pump(&mut self, mut sender: BoxHealthSender) -> Option<TransportError> {
        let mut ticker = tokio::time::interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(cause) = sender.send().await {
                        return Some(cause);
                    }
                    debug!("Heartbeat sent");
                }
                _ = self.shutdown.triggered() => return None,
            }
        }
    }

    fn stop(&self) {
        self.state.send_replace(StreamState::Stopped);
        info!("Heartbeat driver stopped");
    }
}
