//! Multi-chain pool-launch detection and signal pipeline.
//!
//! Exposes every module for use by the `early-signal` binary and by
//! integration tests.

pub mod config;
pub mod engine;
pub mod enrich;
pub mod enrich_loop;
pub mod error;
pub mod evm;
pub mod journal;
pub mod notify;
pub mod observability;
pub mod postmortem;
pub mod price_oracle;
pub mod price_utils;
pub mod rpc;
pub mod safety;
pub mod solana;
pub mod state;
pub mod supervisor;

pub use config::Config;
pub use engine::SignalEngine;
pub use supervisor::Supervisor;
