//! HTTP adapter that applies queued mutations to the remote system.

pub mod client;

pub use client::{RemoteClient, RemoteClientConfig};
