//! # GatePass Server
//!
//! Wires the ledger event indexer and the entry admission controller into
//! one process:
//!
//! - [`config`]: environment configuration
//! - [`server`]: router, state and health endpoints
//! - [`api`]: scan submission, entry and purchase reads, indexer maintenance
//! - [`error`]: HTTP error responses
//!
//! The `gatepass` binary loads [`Config`], connects the store, starts the
//! indexer and serves the router until `SIGINT`/`SIGTERM`.

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use config::{Config, ConfigError};
pub use error::AppError;
pub use server::{AppState, build_router};
