//! Result aggregation and the inter-node wire form.
//!
//! Each worker thread tallies into its own [`ResultSet`] (partitions on one
//! worker run serially, so no locking is needed). Fork nodes merge their
//! worker sets into one binary payload; the originating node demuxes each
//! node's payload, merges again, and renders JSON with sort/trim/histogram
//! shaping applied.

pub mod json_ops;
pub mod mux;
pub mod result_set;

pub use json_ops::*;
pub use mux::*;
pub use result_set::*;
