//! # Outpost Engine
//!
//! Offline-first synchronization engine. The host application talks to the
//! [`OfflineGateway`]; every write lands in the durable local store first
//! and is applied to the remote system asynchronously, every read is served
//! from the freshest source available (live fetch, fresh cache, or stale
//! fallback).
//!
//! ## Wiring
//! - [`EngineContext`] owns the store, the background workers, and their
//!   lifecycles (dependency injection container)
//! - [`OfflineGateway`] is the thin façade the host calls

pub mod context;
pub mod gateway;

pub use context::EngineContext;
pub use gateway::OfflineGateway;
