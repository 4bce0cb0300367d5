//! tonic implementation of [`SdkTransport`]

use std::time::Duration;

use agones_proto::{AlphaSdkClient, BetaSdkClient, SdkClient, alpha, beta, sdk};
use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, info};

use super::{BoxHealthSender, HealthSender, SdkTransport, TransportError, WatchStream};
use crate::state::GameServerState;
use crate::tracking::{Counter, CounterUpdate, List};

/// 心跳发送队列长度；队列满时跳过本次心跳而不是等待
const HEALTH_QUEUE_CAPACITY: usize = 4;

/// HTTP/2 PING 间隔；停滞的流在 interval + timeout 内失败
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// gRPC transport to the Agones sidecar.
///
/// Holds one tonic [`Channel`]; every call clones it (cheap) into a fresh
/// generated client, so concurrent callers never contend on a lock beyond
/// the read of the channel slot.
pub struct GrpcTransport {
    endpoint: String,
    channel: RwLock<Option<Channel>>,
}

impl GrpcTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            channel: RwLock::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn channel(&self) -> Result<Channel, TransportError> {
        self.channel
            .read()
            .await
            .clone()
            .ok_or_else(|| TransportError::Unavailable("transport is not connected".to_string()))
    }

    async fn sdk(&self) -> Result<SdkClient<Channel>, TransportError> {
        Ok(SdkClient::new(self.channel().await?))
    }

    async fn beta(&self) -> Result<BetaSdkClient<Channel>, TransportError> {
        Ok(BetaSdkClient::new(self.channel().await?))
    }

    async fn alpha(&self) -> Result<AlphaSdkClient<Channel>, TransportError> {
        Ok(AlphaSdkClient::new(self.channel().await?))
    }
}

#[async_trait]
impl SdkTransport for GrpcTransport {
    async fn connect(&self, timeout: Duration) -> Result<(), TransportError> {
        info!("Connecting to Agones sidecar at: {}", self.endpoint);

        let endpoint = Endpoint::from_shared(self.endpoint.clone())
            .map_err(|e| TransportError::Unavailable(format!("Invalid sidecar address: {e}")))?
            .connect_timeout(timeout)
            .tcp_nodelay(true)
            .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
            .keep_alive_while_idle(true);

        let channel = endpoint.connect().await?;
        *self.channel.write().await = Some(channel);

        info!("Successfully connected to Agones sidecar");
        Ok(())
    }

    async fn close(&self) {
        if self.channel.write().await.take().is_some() {
            info!("Disconnected from Agones sidecar");
        }
    }

    async fn ready(&self) -> Result<(), TransportError> {
        self.sdk().await?.ready(sdk::Empty {}).await?;
        Ok(())
    }

    async fn allocate(&self) -> Result<(), TransportError> {
        self.sdk().await?.allocate(sdk::Empty {}).await?;
        Ok(())
    }

    async fn reserve(&self, seconds: i64) -> Result<(), TransportError> {
        self.sdk().await?.reserve(sdk::Duration { seconds }).await?;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.sdk().await?.shutdown(sdk::Empty {}).await?;
        Ok(())
    }

    async fn set_label(&self, key: String, value: String) -> Result<(), TransportError> {
        self.sdk()
            .await?
            .set_label(sdk::KeyValue { key, value })
            .await?;
        Ok(())
    }

    async fn set_annotation(&self, key: String, value: String) -> Result<(), TransportError> {
        self.sdk()
            .await?
            .set_annotation(sdk::KeyValue { key, value })
            .await?;
        Ok(())
    }

    async fn get_game_server(&self) -> Result<GameServerState, TransportError> {
        let gs = self
            .sdk()
            .await?
            .get_game_server(sdk::Empty {})
            .await?
            .into_inner();
        Ok(gs.into())
    }

    async fn open_health(&self) -> Result<BoxHealthSender, TransportError> {
        let mut client = self.sdk().await?;

        // Health 是 client-streaming，服务端只在流结束时响应；
        // 先用 GetGameServer 确认 sidecar 可达，避免把不可达的流当成已建立
        client.get_game_server(sdk::Empty {}).await?;

        let (tx, rx) = mpsc::channel(HEALTH_QUEUE_CAPACITY);
        let call = tokio::spawn(async move {
            client
                .health(ReceiverStream::new(rx))
                .await
                .map(|_| ())
                .map_err(TransportError::from)
        });

        debug!("Health stream opened");
        Ok(Box::new(GrpcHealthSender {
            tx,
            call: Some(call),
        }))
    }

    async fn open_watch(&self) -> Result<WatchStream, TransportError> {
        let stream = self
            .sdk()
            .await?
            .watch_game_server(sdk::Empty {})
            .await?
            .into_inner();

        debug!("Watch stream opened");
        Ok(Box::pin(stream.map(|item| {
            item.map(GameServerState::from)
                .map_err(TransportError::from)
        })))
    }

    async fn get_counter(&self, name: String) -> Result<Counter, TransportError> {
        let counter = self
            .beta()
            .await?
            .get_counter(beta::GetCounterRequest { name })
            .await?
            .into_inner();
        Ok(counter.into())
    }

    async fn update_counter(&self, update: CounterUpdate) -> Result<Counter, TransportError> {
        let counter = self
            .beta()
            .await?
            .update_counter(beta::UpdateCounterRequest::from(update))
            .await?
            .into_inner();
        Ok(counter.into())
    }

    async fn get_list(&self, name: String) -> Result<List, TransportError> {
        let list = self
            .beta()
            .await?
            .get_list(beta::GetListRequest { name })
            .await?
            .into_inner();
        Ok(list.into())
    }

    async fn update_list(
        &self,
        list: List,
        update_mask: Vec<String>,
    ) -> Result<List, TransportError> {
        let request = beta::UpdateListRequest {
            list: Some(list.into()),
            update_mask: Some(prost_types::FieldMask { paths: update_mask }),
        };
        let list = self
            .beta()
            .await?
            .update_list(request)
            .await?
            .into_inner();
        Ok(list.into())
    }

    async fn add_list_value(&self, name: String, value: String) -> Result<List, TransportError> {
        let list = self
            .beta()
            .await?
            .add_list_value(beta::AddListValueRequest { name, value })
            .await?
            .into_inner();
        Ok(list.into())
    }

    async fn remove_list_value(&self, name: String, value: String) -> Result<List, TransportError> {
        let list = self
            .beta()
            .await?
            .remove_list_value(beta::RemoveListValueRequest { name, value })
            .await?
            .into_inner();
        Ok(list.into())
    }

    async fn player_connect(&self, player_id: String) -> Result<bool, TransportError> {
        let added = self
            .alpha()
            .await?
            .player_connect(alpha::PlayerId { player_id })
            .await?
            .into_inner();
        Ok(added.r#bool)
    }

    async fn player_disconnect(&self, player_id: String) -> Result<bool, TransportError> {
        let removed = self
            .alpha()
            .await?
            .player_disconnect(alpha::PlayerId { player_id })
            .await?
            .into_inner();
        Ok(removed.r#bool)
    }

    async fn is_player_connected(&self, player_id: String) -> Result<bool, TransportError> {
        let connected = self
            .alpha()
            .await?
            .is_player_connected(alpha::PlayerId { player_id })
            .await?
            .into_inner();
        Ok(connected.r#bool)
    }

    async fn connected_players(&self) -> Result<Vec<String>, TransportError> {
        let players = self
            .alpha()
            .await?
            .get_connected_players(alpha::Empty {})
            .await?
            .into_inner();
        Ok(players.list)
    }

    async fn set_player_capacity(&self, capacity: i64) -> Result<(), TransportError> {
        self.alpha()
            .await?
            .set_player_capacity(alpha::Count { count: capacity })
            .await?;
        Ok(())
    }

    async fn player_capacity(&self) -> Result<i64, TransportError> {
        let count = self
            .alpha()
            .await?
            .get_player_capacity(alpha::Empty {})
            .await?
            .into_inner();
        Ok(count.count)
    }

    async fn player_count(&self) -> Result<i64, TransportError> {
        let count = self
            .alpha()
            .await?
            .get_player_count(alpha::Empty {})
            .await?
            .into_inner();
        Ok(count.count)
    }
}

/// Sending side of an in-flight `Health` call.
struct GrpcHealthSender {
    tx: mpsc::Sender<sdk::Empty>,
    call: Option<JoinHandle<Result<(), TransportError>>>,
}

#[async_trait]
impl HealthSender for GrpcHealthSender {
    async fn send(&mut self) -> Result<(), TransportError> {
        let finished = self.call.as_ref().is_none_or(|call| call.is_finished());
        if finished {
            // 调用已结束：无论成功与否，流都已不可用
            return Err(match self.call.take() {
                Some(call) => match call.await {
                    Ok(Ok(())) => TransportError::Closed,
                    Ok(Err(e)) => e,
                    Err(e) => TransportError::Unavailable(format!("health call aborted: {e}")),
                },
                None => TransportError::Closed,
            });
        }

        match self.tx.try_send(sdk::Empty {}) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Health queue full, skipping heartbeat");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

impl Drop for GrpcHealthSender {
    fn drop(&mut self) {
        if let Some(call) = self.call.take() {
            call.abort();
        }
    }
}
