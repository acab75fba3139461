//! Sync coordination: drain-and-apply worker, error taxonomy, retention.

pub mod coordinator;
pub mod errors;
pub mod retention;

pub use coordinator::{RemoteApplier, SyncCoordinator, SyncCoordinatorConfig};
pub use errors::{SyncError, SyncErrorCategory};
pub use retention::{RetentionConfig, RetentionSweeper, SweepStats};
