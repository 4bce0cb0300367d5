//! Scriptable in-memory transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{BoxHealthSender, HealthSender, SdkTransport, TransportError, WatchStream};
use crate::state::{GameServerPhase, GameServerState};
use crate::tracking::{Counter, CounterUpdate};

/// What the next `open_health` does.
pub(crate) enum HealthPlan {
    Fail(TransportError),
    /// Open a stream that breaks after `fail_after` successful beats.
    Open { fail_after: Option<usize> },
    /// Never resolve.
    Hang,
}

/// What the next `open_watch` does.
pub(crate) enum WatchPlan {
    Fail(TransportError),
    Open(mpsc::UnboundedReceiver<Result<GameServerState, TransportError>>),
    /// Never resolve.
    Hang,
}

#[derive(Default)]
struct Script {
    connect_error: Option<TransportError>,
    unary_error: Option<TransportError>,
    unary_delay: Option<Duration>,
    calls: Vec<String>,
    health_plans: VecDeque<HealthPlan>,
    health_opens: usize,
    watch_plans: VecDeque<WatchPlan>,
    watch_opens: usize,
    state: GameServerState,
    counters: HashMap<String, Counter>,
    players: Vec<String>,
    player_capacity: i64,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct MockTransport {
    script: Mutex<Script>,
    beats: Arc<AtomicUsize>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap()
    }

    pub(crate) fn fail_connect(&self, err: TransportError) {
        self.script().connect_error = Some(err);
    }

    pub(crate) fn fail_unary(&self, err: TransportError) {
        self.script().unary_error = Some(err);
    }

    pub(crate) fn delay_unary(&self, delay: Duration) {
        self.script().unary_delay = Some(delay);
    }

    pub(crate) fn push_health(&self, plan: HealthPlan) {
        self.script().health_plans.push_back(plan);
    }

    pub(crate) fn push_watch(&self, plan: WatchPlan) {
        self.script().watch_plans.push_back(plan);
    }

    /// Queue a watch stream that stays open; returns its feeding end.
    pub(crate) fn open_watch_feed(
        &self,
    ) -> mpsc::UnboundedSender<Result<GameServerState, TransportError>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push_watch(WatchPlan::Open(rx));
        tx
    }

    pub(crate) fn set_state(&self, state: GameServerState) {
        self.script().state = state;
    }

    pub(crate) fn add_counter(&self, counter: Counter) {
        self.script().counters.insert(counter.name.clone(), counter);
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub(crate) fn beats(&self) -> usize {
        self.beats.load(Ordering::SeqCst)
    }

    pub(crate) fn health_opens(&self) -> usize {
        self.script().health_opens
    }

    pub(crate) fn watch_opens(&self) -> usize {
        self.script().watch_opens
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.script().closed
    }

    async fn unary(&self, call: impl Into<String>) -> Result<(), TransportError> {
        let (delay, error) = {
            let mut script = self.script();
            script.calls.push(call.into());
            (script.unary_delay, script.unary_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct MockHealthSender {
    beats: Arc<AtomicUsize>,
    remaining: Option<usize>,
}

#[async_trait]
impl HealthSender for MockHealthSender {
    async fn send(&mut self) -> Result<(), TransportError> {
        match self.remaining.as_mut() {
            Some(0) => return Err(TransportError::Unavailable("health stream broken".into())),
            Some(n) => *n -= 1,
            None => {}
        }
        self.beats.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SdkTransport for MockTransport {
    async fn connect(&self, _timeout: Duration) -> Result<(), TransportError> {
        let mut script = self.script();
        script.calls.push("connect".to_string());
        match script.connect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn close(&self) {
        self.script().closed = true;
    }

    async fn ready(&self) -> Result<(), TransportError> {
        self.unary("ready").await?;
        self.script().state.phase = GameServerPhase::RequestReady;
        Ok(())
    }

    async fn allocate(&self) -> Result<(), TransportError> {
        self.unary("allocate").await?;
        self.script().state.phase = GameServerPhase::Allocated;
        Ok(())
    }

    async fn reserve(&self, seconds: i64) -> Result<(), TransportError> {
        self.unary(format!("reserve:{seconds}")).await?;
        self.script().state.phase = GameServerPhase::Reserved;
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.unary("shutdown").await?;
        self.script().state.phase = GameServerPhase::Shutdown;
        Ok(())
    }

    async fn set_label(&self, key: String, value: String) -> Result<(), TransportError> {
        self.unary(format!("set_label:{key}={value}")).await?;
        self.script()
            .state
            .labels
            .insert(format!("agones.dev/sdk-{key}"), value);
        Ok(())
    }

    async fn set_annotation(&self, key: String, value: String) -> Result<(), TransportError> {
        self.unary(format!("set_annotation:{key}={value}")).await?;
        self.script()
            .state
            .annotations
            .insert(format!("agones.dev/sdk-{key}"), value);
        Ok(())
    }

    async fn get_game_server(&self) -> Result<GameServerState, TransportError> {
        self.unary("get_game_server").await?;
        Ok(self.script().state.clone())
    }

    async fn open_health(&self) -> Result<BoxHealthSender, TransportError> {
        let plan = {
            let mut script = self.script();
            script.health_opens += 1;
            script.health_plans.pop_front()
        };
        match plan.unwrap_or(HealthPlan::Open { fail_after: None }) {
            HealthPlan::Fail(err) => Err(err),
            HealthPlan::Open { fail_after } => Ok(Box::new(MockHealthSender {
                beats: self.beats.clone(),
                remaining: fail_after,
            })),
            HealthPlan::Hang => std::future::pending().await,
        }
    }

    async fn open_watch(&self) -> Result<WatchStream, TransportError> {
        let plan = {
            let mut script = self.script();
            script.watch_opens += 1;
            script.watch_plans.pop_front()
        };
        match plan {
            Some(WatchPlan::Fail(err)) => Err(err),
            Some(WatchPlan::Open(rx)) => Ok(Box::pin(UnboundedReceiverStream::new(rx))),
            Some(WatchPlan::Hang) => std::future::pending().await,
            // 没有脚本时保持一个永不产出的流
            None => Ok(Box::pin(tokio_stream::pending())),
        }
    }

    async fn get_counter(&self, name: String) -> Result<Counter, TransportError> {
        self.unary(format!("get_counter:{name}")).await?;
        self.script()
            .counters
            .get(&name)
            .cloned()
            .ok_or_else(|| not_found(&name))
    }

    async fn update_counter(&self, update: CounterUpdate) -> Result<Counter, TransportError> {
        self.unary(format!("update_counter:{}", update.name)).await?;
        let mut script = self.script();
        let counter = script
            .counters
            .get_mut(&update.name)
            .ok_or_else(|| not_found(&update.name))?;
        if let Some(capacity) = update.capacity {
            counter.capacity = capacity;
        }
        if let Some(count) = update.count {
            counter.count = count;
        }
        let next = counter.count + update.count_diff;
        if next < 0 || next > counter.capacity {
            return Err(TransportError::Status {
                code: tonic::Code::OutOfRange,
                message: format!("count {next} out of range"),
            });
        }
        counter.count = next;
        Ok(counter.clone())
    }

    async fn player_connect(&self, player_id: String) -> Result<bool, TransportError> {
        self.unary(format!("player_connect:{player_id}")).await?;
        let mut script = self.script();
        if script.players.contains(&player_id) {
            return Ok(false);
        }
        script.players.push(player_id);
        Ok(true)
    }

    async fn player_disconnect(&self, player_id: String) -> Result<bool, TransportError> {
        self.unary(format!("player_disconnect:{player_id}")).await?;
        let mut script = self.script();
        let before = script.players.len();
        script.players.retain(|p| p != &player_id);
        Ok(script.players.len() != before)
    }

    async fn connected_players(&self) -> Result<Vec<String>, TransportError> {
        self.unary("connected_players").await?;
        Ok(self.script().players.clone())
    }

    async fn set_player_capacity(&self, capacity: i64) -> Result<(), TransportError> {
        self.unary(format!("set_player_capacity:{capacity}")).await?;
        self.script().player_capacity = capacity;
        Ok(())
    }

    async fn player_capacity(&self) -> Result<i64, TransportError> {
        self.unary("player_capacity").await?;
        Ok(self.script().player_capacity)
    }

    async fn player_count(&self) -> Result<i64, TransportError> {
        self.unary("player_count").await?;
        Ok(self.script().players.len() as i64)
    }
}

fn not_found(name: &str) -> TransportError {
    TransportError::Status {
        code: tonic::Code::NotFound,
        message: format!("{name} not found"),
    }
}
