//! CPU/GPU synchronization on a monotonic submission timeline.
//!
//! Every GPU submission is identified by a logical point. The
//! [`SubmitSyncManager`] hands out a fence and a semaphore per point, keeps the
//! in-flight points in submission order and recycles their primitives once a
//! point is known to be complete.

mod manager;
pub mod pool;

use std::time::Duration;

pub use manager::{SubmitSync, SubmitSyncManager};
pub use pool::{
    FenceFactory, FencePool, PrimitiveFactory, PrimitiveInTimeline, PrimitiveInTimelinePool,
    PrimitivePool, SemaphoreFactory, SemaphorePool,
};

/// Convert an optional timeout to the nanosecond form Vulkan expects.
/// `None` waits forever.
pub fn timeout_ns(timeout: Option<Duration>) -> u64 {
    match timeout {
        Some(duration) => u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX),
        None => u64::MAX,
    }
}
