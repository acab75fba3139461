//! Durable storage: SQLite-backed store, mutation queue, cache, and lease.

pub mod cache_store;
pub mod lease;
pub mod manager;
pub mod mutation_queue;
pub mod store;

pub use cache_store::SqliteCacheStore;
pub use lease::SqliteSyncLease;
pub use manager::StoreManager;
pub use mutation_queue::SqliteMutationQueue;
pub use store::{LocalStore, COLLECTION_CACHE, COLLECTION_MUTATIONS, COLLECTION_SESSION};
