//! Agones SDK Protocol Buffer Definitions
//!
//! This crate contains the protocol buffer definitions spoken between a game
//! server process and its Agones sidecar.
//!
//! # Modules
//!
//! - [`sdk`]: stable SDK service (`agones.dev.sdk`): lifecycle, health, watch
//! - [`beta`]: beta SDK service (`agones.dev.sdk.beta`): counters and lists
//! - [`alpha`]: alpha SDK service (`agones.dev.sdk.alpha`): player tracking
//!
//! # Usage
//!
//! ```ignore
//! use agones_proto::sdk::{Empty, GameServer};
//! use agones_proto::{SdkClient, SdkServer};
//! ```
//!
//! # Design Notes
//!
//! All three packages declare a service named `SDK`, so the generated clients
//! and servers share the names `SdkClient` / `SdkServer`. The stable ones are
//! re-exported at the crate root; the beta and alpha ones are re-exported
//! with a prefix.

/// Stable SDK service definitions (`agones.dev.sdk`).
pub mod sdk {
    tonic::include_proto!("agones.dev.sdk");
}

/// Beta SDK service definitions (`agones.dev.sdk.beta`).
///
/// Requires the `CountsAndLists` feature gate on the sidecar.
pub mod beta {
    tonic::include_proto!("agones.dev.sdk.beta");
}

/// Alpha SDK service definitions (`agones.dev.sdk.alpha`).
///
/// Requires the `PlayerTracking` feature gate on the sidecar.
pub mod alpha {
    tonic::include_proto!("agones.dev.sdk.alpha");
}

// ============================================================================
// Re-exports: stable SDK
// ============================================================================

pub use sdk::{
    Duration, Empty, GameServer, KeyValue,
    // Client and server
    sdk_client::SdkClient,
    sdk_server::{Sdk, SdkServer},
};

// ============================================================================
// Re-exports: beta / alpha clients and servers
// ============================================================================

pub use beta::{
    sdk_client::SdkClient as BetaSdkClient,
    sdk_server::{Sdk as BetaSdk, SdkServer as BetaSdkServer},
};

pub use alpha::{
    sdk_client::SdkClient as AlphaSdkClient,
    sdk_server::{Sdk as AlphaSdk, SdkServer as AlphaSdkServer},
};
