//! Read-cache logic: port and freshness policy

pub mod policy;
pub mod ports;
