//! # Outpost Core
//!
//! Pure engine logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port/adapter interfaces (traits) for the queue, cache and sync lease
//! - The sync coordinator's state machine and backoff schedule
//! - Cache freshness policy
//!
//! ## Architecture Principles
//! - Only depends on `outpost-domain`
//! - No database, HTTP, or platform code
//! - All external dependencies via traits
//! - Pure, testable logic

pub mod cache;
pub mod sync;

pub use cache::policy::{evaluate, to_lookup, Freshness};
pub use cache::ports::CacheStore;
pub use sync::ports::{AcquireOutcome, MutationQueue, SyncLeaseStore};
pub use sync::state::{BackoffSchedule, SyncState, SyncStateMachine};
