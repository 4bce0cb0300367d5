//! GameServer snapshot as observed from the sidecar.
//!
//! The client never interprets phase transitions: the phase is forwarded as
//! the orchestrator reports it, unknown values included.

use std::collections::HashMap;
use std::fmt;

use agones_proto::sdk::GameServer;
use agones_proto::sdk::game_server;

/// GameServer lifecycle phase as reported by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum GameServerPhase {
    PortAllocation,
    Creating,
    Starting,
    Scheduled,
    RequestReady,
    Ready,
    Shutdown,
    Error,
    Unhealthy,
    Reserved,
    Allocated,
    /// Any value this client does not know about, kept verbatim
    Unknown(String),
    /// No state reported yet
    #[default]
    Unset,
}

impl GameServerPhase {
    pub fn from_wire(value: &str) -> Self {
        match value {
            "" => Self::Unset,
            "PortAllocation" => Self::PortAllocation,
            "Creating" => Self::Creating,
            "Starting" => Self::Starting,
            "Scheduled" => Self::Scheduled,
            "RequestReady" => Self::RequestReady,
            "Ready" => Self::Ready,
            "Shutdown" => Self::Shutdown,
            "Error" => Self::Error,
            "Unhealthy" => Self::Unhealthy,
            "Reserved" => Self::Reserved,
            "Allocated" => Self::Allocated,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PortAllocation => "PortAllocation",
            Self::Creating => "Creating",
            Self::Starting => "Starting",
            Self::Scheduled => "Scheduled",
            Self::RequestReady => "RequestReady",
            Self::Ready => "Ready",
            Self::Shutdown => "Shutdown",
            Self::Error => "Error",
            Self::Unhealthy => "Unhealthy",
            Self::Reserved => "Reserved",
            Self::Allocated => "Allocated",
            Self::Unknown(raw) => raw,
            Self::Unset => "",
        }
    }
}

impl fmt::Display for GameServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health checking configuration of the GameServer spec.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthSpec {
    pub disabled: bool,
    pub period_seconds: i32,
    pub failure_threshold: i32,
    pub initial_delay_seconds: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    pub kind: String,
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Port {
    pub name: String,
    pub port: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerStatus {
    pub count: i64,
    pub capacity: i64,
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterStatus {
    pub count: i64,
    pub capacity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListStatus {
    pub capacity: i64,
    pub values: Vec<String>,
}

/// Immutable snapshot of the backing GameServer resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameServerState {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub resource_version: String,
    pub generation: i64,
    /// Epoch seconds
    pub creation_timestamp: i64,
    /// Epoch seconds, 0 when not being deleted
    pub deletion_timestamp: i64,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub health: HealthSpec,
    pub phase: GameServerPhase,
    pub address: String,
    pub addresses: Vec<Address>,
    pub ports: Vec<Port>,
    pub players: Option<PlayerStatus>,
    pub counters: HashMap<String, CounterStatus>,
    pub lists: HashMap<String, ListStatus>,
}

impl GameServerState {
    /// Snapshot carrying only a phase; mostly useful in tests and fakes.
    pub fn with_phase(phase: GameServerPhase) -> Self {
        Self {
            phase,
            ..Default::default()
        }
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp != 0
    }
}

impl From<GameServer> for GameServerState {
    fn from(gs: GameServer) -> Self {
        let meta = gs.object_meta.unwrap_or_default();
        let health = gs
            .spec
            .and_then(|spec| spec.health)
            .map(|h| HealthSpec {
                disabled: h.disabled,
                period_seconds: h.period_seconds,
                failure_threshold: h.failure_threshold,
                initial_delay_seconds: h.initial_delay_seconds,
            })
            .unwrap_or_default();
        let status = gs.status.unwrap_or_default();

        Self {
            name: meta.name,
            namespace: meta.namespace,
            uid: meta.uid,
            resource_version: meta.resource_version,
            generation: meta.generation,
            creation_timestamp: meta.creation_timestamp,
            deletion_timestamp: meta.deletion_timestamp,
            labels: meta.labels,
            annotations: meta.annotations,
            health,
            phase: GameServerPhase::from_wire(&status.state),
            address: status.address,
            addresses: status
                .addresses
                .into_iter()
                .map(|a| Address {
                    kind: a.r#type,
                    address: a.address,
                })
                .collect(),
            ports: status
                .ports
                .into_iter()
                .map(|p| Port {
                    name: p.name,
                    port: p.port,
                })
                .collect(),
            players: status.players.map(|p| PlayerStatus {
                count: p.count,
                capacity: p.capacity,
                ids: p.ids,
            }),
            counters: status
                .counters
                .into_iter()
                .map(|(name, c)| {
                    (
                        name,
                        CounterStatus {
                            count: c.count,
                            capacity: c.capacity,
                        },
                    )
                })
                .collect(),
            lists: status
                .lists
                .into_iter()
                .map(|(name, l)| {
                    (
                        name,
                        ListStatus {
                            capacity: l.capacity,
                            values: l.values,
                        },
                    )
                })
                .collect(),
        }
    }
}

impl From<&GameServerState> for GameServer {
    fn from(state: &GameServerState) -> Self {
        GameServer {
            object_meta: Some(game_server::ObjectMeta {
                name: state.name.clone(),
                namespace: state.namespace.clone(),
                uid: state.uid.clone(),
                resource_version: state.resource_version.clone(),
                generation: state.generation,
                creation_timestamp: state.creation_timestamp,
                deletion_timestamp: state.deletion_timestamp,
                annotations: state.annotations.clone(),
                labels: state.labels.clone(),
            }),
            spec: Some(game_server::Spec {
                health: Some(game_server::spec::Health {
                    disabled: state.health.disabled,
                    period_seconds: state.health.period_seconds,
                    failure_threshold: state.health.failure_threshold,
                    initial_delay_seconds: state.health.initial_delay_seconds,
                }),
            }),
            status: Some(game_server::Status {
                state: state.phase.as_str().to_string(),
                address: state.address.clone(),
                addresses: state
                    .addresses
                    .iter()
                    .map(|a| game_server::status::Address {
                        r#type: a.kind.clone(),
                        address: a.address.clone(),
                    })
                    .collect(),
                ports: state
                    .ports
                    .iter()
                    .map(|p| game_server::status::Port {
                        name: p.name.clone(),
                        port: p.port,
                    })
                    .collect(),
                players: state
                    .players
                    .as_ref()
                    .map(|p| game_server::status::PlayerStatus {
                        count: p.count,
                        capacity: p.capacity,
                        ids: p.ids.clone(),
                    }),
                counters: state
                    .counters
                    .iter()
                    .map(|(name, c)| {
                        (
                            name.clone(),
                            game_server::status::CounterStatus {
                                count: c.count,
                                capacity: c.capacity,
                            },
                        )
                    })
                    .collect(),
                lists: state
                    .lists
                    .iter()
                    .map(|(name, l)| {
                        (
                            name.clone(),
                            game_server::status::ListStatus {
                                capacity: l.capacity,
                                values: l.values.clone(),
                            },
                        )
                    })
                    .collect(),
            }),
        }
    }
}
