//! Domain data types for the sync engine

pub mod cache;
pub mod mutation;
pub mod sync;

pub use cache::*;
pub use mutation::*;
pub use sync::*;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// All persisted timestamps in the engine use this resolution.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
