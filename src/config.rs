//! Configuration for the Agones SDK client

use crate::backoff::BackoffConfig;
use crate::error::{Result, SdkError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sidecar 默认 gRPC 端口
pub const DEFAULT_GRPC_PORT: u16 = 9357;

/// Sidecar 默认主机
pub const DEFAULT_GRPC_HOST: &str = "localhost";

pub const ENV_GRPC_HOST: &str = "AGONES_SDK_GRPC_HOST";
pub const ENV_GRPC_PORT: &str = "AGONES_SDK_GRPC_PORT";
pub const ENV_GRPC_ADDRESS: &str = "AGONES_SDK_GRPC_ADDRESS";

/// SDK 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Sidecar gRPC 地址
    /// 格式: http://hostname:port
    /// 示例: "http://localhost:9357"
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// 连接超时（毫秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// 单次 unary 调用的超时（毫秒）
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// close() 等待后台任务退出的最长时间（毫秒）
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,

    /// 心跳配置
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// 流重连退避配置（心跳与 watch 共用）
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// 心跳配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// 心跳间隔（毫秒）
    #[serde(default = "default_heartbeat_period")]
    pub period_ms: u64,

    /// 首次心跳前的延迟（毫秒）
    #[serde(default)]
    pub initial_delay_ms: u64,
}

fn default_endpoint() -> String {
    format!("http://{DEFAULT_GRPC_HOST}:{DEFAULT_GRPC_PORT}")
}

fn default_connect_timeout() -> u64 {
    5_000
}

fn default_rpc_timeout() -> u64 {
    10_000
}

fn default_close_timeout() -> u64 {
    5_000
}

fn default_heartbeat_period() -> u64 {
    2_000
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period_ms: default_heartbeat_period(),
            initial_delay_ms: 0,
        }
    }
}

impl HeartbeatConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            connect_timeout_ms: default_connect_timeout(),
            rpc_timeout_ms: default_rpc_timeout(),
            close_timeout_ms: default_close_timeout(),
            heartbeat: HeartbeatConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl SdkConfig {
    /// Build a config whose endpoint is discovered from the environment the
    /// sidecar injects into the game server container.
    ///
    /// `AGONES_SDK_GRPC_ADDRESS` wins when set; otherwise
    /// `AGONES_SDK_GRPC_HOST` and `AGONES_SDK_GRPC_PORT` are combined, each
    /// falling back to its default when missing or unparsable.
    pub fn from_env() -> Self {
        let endpoint = match std::env::var(ENV_GRPC_ADDRESS) {
            Ok(address) if !address.trim().is_empty() => with_scheme(address.trim()),
            _ => {
                let host = std::env::var(ENV_GRPC_HOST)
                    .ok()
                    .filter(|h| !h.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_GRPC_HOST.to_string());
                let port = std::env::var(ENV_GRPC_PORT)
                    .ok()
                    .and_then(|p| p.trim().parse::<u16>().ok())
                    .unwrap_or(DEFAULT_GRPC_PORT);
                format!("http://{}:{}", host.trim(), port)
            }
        };

        Self {
            endpoint,
            ..Default::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(SdkError::Config("endpoint cannot be empty".to_string()));
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(SdkError::Config(
                "endpoint must start with http:// or https://".to_string(),
            ));
        }

        if self.rpc_timeout_ms == 0 {
            return Err(SdkError::Config(
                "rpc_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.heartbeat.period_ms == 0 {
            return Err(SdkError::Config(
                "heartbeat.period_ms must be greater than 0".to_string(),
            ));
        }

        self.backoff.validate()
    }
}

// AGONES_SDK_GRPC_ADDRESS 通常是 host:port，不带 scheme
fn with_scheme(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}
