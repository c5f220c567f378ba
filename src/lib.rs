//! # Friedman agent
//!
//! A strategy agent for the playing field tournament, playing the grim-trigger ("Friedman")
//! policy in a repeated two-player game.
//!
//! It provides:
//! - The decision engine ([`GrimTrigger`](crate::decision::GrimTrigger)) behind the
//!   [`Strategy`](crate::decision::Strategy) trait
//! - The round RPC handler ([`AgentService`](crate::service::AgentService)) guarding the
//!   strategy's memory
//! - A gRPC server exposing it over TLS ([`server`], [`rpc`])
//! - The registration handshake with the playing field ([`registration`])
//! - An explicit startup sequence ([`startup`]) tying everything together
//!
//! # Protocol
//!
//! Every round, the playing field reports what the opponent did in the previous round and
//! the agent answers with its next move:
//!
//! | opponent signal | agent state after | move      |
//! |-----------------|-------------------|-----------|
//! | `NONE`          | untriggered       | COOPERATE |
//! | `DEFECTED`      | triggered         | DEFECT    |
//!
//! `NONE` also marks the start of a new game, so the playing field resets the agent by sending
//! it. Both operations are unary gRPC calls over TLS, see [`wire`] for the messages.
//!
//! # Documentation Overview
//!
//! - For the environment variables read at startup, see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For the order of startup steps and which failures are fatal, see [`startup`].
//!
//! # Usage Example
//!
//! ```no_run
//! use friedman_agent::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env()?;
//!     let agent = start_friedman(&config).await?;
//!     println!("serving on {}", agent.local_addr());
//!
//!     // ... wait for a shutdown signal ...
//!
//!     agent.shutdown().await;
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;
pub mod client;
pub mod configuration;
pub mod decision;
mod logger;
pub mod registration;
pub mod rpc;
pub mod server;
pub mod service;
pub mod startup;
pub mod tls;
pub mod wire;

pub use logger::init_logger;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use friedman_agent::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`GrimTrigger`](crate::decision::GrimTrigger), [`Strategy`](crate::decision::Strategy)
///   and the move types
/// - [`AgentService`](crate::service::AgentService)
/// - the startup entry points
pub mod prelude {
    pub use crate::configuration::Configuration;
    pub use crate::decision::{GrimTrigger, OpponentSignal, OwnMove, Strategy};
    pub use crate::service::AgentService;
    pub use crate::startup::{start, start_friedman, RunningAgent, StartupError};
}
