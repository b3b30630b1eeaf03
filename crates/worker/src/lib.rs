//! Shoefeed ingestion worker.
//!
//! Connects to the vendor's live table feed over a persistent WebSocket,
//! classifies inbound frames, groups consecutive outcomes into shuffle
//! sessions, and hands every outcome to the persistence collaborator
//! tagged with the group that was current when it arrived.
//!
//! The worker deliberately carries no reconnection or retry logic: any
//! unrecoverable condition ends the process, and an external supervisor
//! restarts it with a fresh connection session and a fresh initial group.

pub mod config;
pub mod connection;
pub mod protocol;
pub mod shutdown;
pub mod store;
pub mod telemetry;

pub use config::{ConfigError, WorkerConfig};
pub use connection::{KEEPALIVE_INTERVAL, Session, WorkerError};
pub use shutdown::{Disposition, ShutdownCoordinator};
