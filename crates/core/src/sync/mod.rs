//! Sync coordination logic: ports and the pure state machine

pub mod ports;
pub mod state;
