//! # Outpost Infrastructure
//!
//! Infrastructure implementations of core engine ports.
//!
//! This crate contains:
//! - The SQLite-backed durable local store and its repositories
//! - The HTTP remote client
//! - The debounced connectivity monitor
//! - The sync coordinator and retention sweeper
//! - Configuration loading
//!
//! ## Architecture
//! - Implements traits defined in `outpost-core`
//! - Depends on `outpost-domain` and `outpost-core`
//! - Contains all "impure" code (I/O, timers, network)

pub mod config;
pub mod connectivity;
pub mod database;
pub mod errors;
pub mod http;
pub mod remote;
pub mod sync;

// Re-export commonly used items
pub use connectivity::{ConnectivityHandle, ConnectivityMonitor};
pub use database::{
    LocalStore, SqliteCacheStore, SqliteMutationQueue, SqliteSyncLease, StoreManager,
    COLLECTION_CACHE, COLLECTION_MUTATIONS, COLLECTION_SESSION,
};
pub use errors::InfraError;
pub use http::HttpClient;
pub use remote::{RemoteClient, RemoteClientConfig};
pub use sync::{
    RemoteApplier, RetentionConfig, RetentionSweeper, SweepStats, SyncCoordinator,
    SyncCoordinatorConfig, SyncError,
};
