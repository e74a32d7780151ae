//! Per-partition cooperative scheduling and fan-in correlation.
//!
//! Work units ([`OpenLoop`]) are small state machines bound to one partition
//! for life. Each partition has a single-threaded [`PartitionLoop`] that
//! time-slices its loops; partitions are spread across a fixed
//! [`AsyncPool`] of worker threads. The [`Shuttle`] collects a fixed number
//! of partial responses and fires its completion closure exactly once.

pub mod open_loop;
pub mod partition;
pub mod pool;
pub mod shuttle;

pub use open_loop::{CellCtl, LoopState, OpenLoop};
pub use partition::PartitionLoop;
pub use pool::AsyncPool;
pub use shuttle::Shuttle;
