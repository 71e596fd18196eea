//! herakles-sysmon core library.
//!
//! Samples processes, memory, network and disk counters through a swappable
//! [`provider::Provider`] and turns pairs of raw samples into rates. Prior
//! samples travel as opaque cursor tokens owned by the caller, so every rate
//! operation is stateless on the engine side.

pub mod cache;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod interface;
pub mod merge;
pub mod models;
pub mod provider;
pub mod rates;
pub mod sampler;
pub mod system;

pub use engine::{Engine, EngineConfig, MetricsQuery, ProcessQuery};
pub use error::{Error, Result};
pub use models::SortBy;
