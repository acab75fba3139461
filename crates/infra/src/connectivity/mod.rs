//! Debounced connectivity monitoring

pub mod monitor;

pub use monitor::{ConnectivityHandle, ConnectivityMonitor};
