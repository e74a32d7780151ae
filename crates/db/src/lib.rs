//! In-memory person-timeline storage: database, tables, partitions.
//!
//! Each table is sharded into partitions keyed by `|person id| mod
//! partition_max`; a partition holds persons with their latest property
//! values and an event timeline, plus named segment membership sets.

pub mod database;
pub mod partition_data;
pub mod schema;
pub mod table;

pub use database::Database;
pub use partition_data::{PartitionData, Person, SegmentData};
pub use schema::{Column, ColumnType, Columns, Event, FieldValue};
pub use table::{SegmentMeta, Table};
