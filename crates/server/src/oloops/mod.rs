//! Endpoint open-loops: the partition-resident execution side of each
//! query endpoint, plus table maintenance.
//!
//! Every query loop follows the same lifecycle: `prepare` binds the
//! partition's data (an absent partition contributes an empty result),
//! `run` chews through persons in slices, and completion or failure is
//! reported to the shuttle exactly once. `partition_removed` delivers the
//! retriable migration error so the shuttle never strands.

pub mod column;
pub mod histogram;
pub mod person;
pub mod query;
pub mod seg_refresh;
pub mod segment;

pub use column::{ColumnFilterMode, ColumnQuery, OpenLoopColumn};
pub use histogram::OpenLoopHistogram;
pub use person::{OpenLoopPerson, PersonResult};
pub use query::OpenLoopQuery;
pub use seg_refresh::OpenLoopSegmentRefresh;
pub use segment::OpenLoopSegment;

use std::collections::HashSet;
use std::sync::Arc;

use openset_async::Shuttle;
use openset_core::{hash_text, ErrorClass, ErrorCode, QueryError};
use openset_db::PartitionData;
use openset_result::ResultSet;

use crate::rpc::CellQueryResult;

/// Persons processed per cooperative slice.
pub(crate) const SLICE_SIZE: usize = 512;

/// The terminal error delivered when a partition migrates away mid-query.
pub(crate) fn partition_migrated() -> QueryError {
    QueryError::new(
        ErrorClass::RunTime,
        ErrorCode::PartitionMigrated,
        "please retry query",
    )
}

/// The terminal error for loops abandoned by a table drop.
pub(crate) fn table_dropped_error() -> QueryError {
    QueryError::new(
        ErrorClass::Query,
        ErrorCode::GeneralError,
        "table dropped while query was running",
    )
}

/// One-shot reporter guarding the "reply exactly once" shuttle contract.
pub(crate) struct ShuttleReporter {
    shuttle: Arc<Shuttle<CellQueryResult>>,
    instance: usize,
    replied: bool,
}

impl ShuttleReporter {
    pub(crate) fn new(shuttle: Arc<Shuttle<CellQueryResult>>, instance: usize) -> Self {
        Self {
            shuttle,
            instance,
            replied: false,
        }
    }

    pub(crate) fn ok(&mut self) {
        if !self.replied {
            self.replied = true;
            self.shuttle.reply(CellQueryResult::ok(self.instance));
        }
    }

    pub(crate) fn fail(&mut self, error: QueryError) {
        if !self.replied {
            self.replied = true;
            self.shuttle.reply(CellQueryResult::err(self.instance, error));
        }
    }
}

/// Segment-compare bindings: each requested segment becomes a row-key
/// prefix, with `*` standing for the whole population.
pub(crate) struct SegmentFilter {
    /// (key prefix hash, members; None admits everyone)
    sets: Vec<(i64, Option<HashSet<i64>>)>,
}

impl SegmentFilter {
    /// Resolve requested segment names against the partition. A missing
    /// named segment is an error the caller reports through its shuttle.
    pub(crate) fn resolve(
        names: &[String],
        data: &PartitionData,
        result: &mut ResultSet,
    ) -> Result<Self, QueryError> {
        let mut sets = Vec::with_capacity(names.len());
        for name in names {
            if name == "*" {
                let hash = hash_text("*");
                result.add_literal(hash, "*");
                sets.push((hash, None));
            } else if let Some(segment) = data.segment(name) {
                let hash = hash_text(name);
                result.add_literal(hash, name.clone());
                sets.push((hash, Some(segment.members.clone())));
            } else {
                return Err(QueryError::new(
                    ErrorClass::RunTime,
                    ErrorCode::ItemNotFound,
                    format!("missing segment '{name}'"),
                ));
            }
        }
        Ok(Self { sets })
    }

    pub(crate) fn empty() -> Self {
        Self { sets: Vec::new() }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Key prefixes that admit this person.
    pub(crate) fn prefixes_for(&self, person_id: i64) -> impl Iterator<Item = i64> + '_ {
        self.sets.iter().filter_map(move |(prefix, members)| {
            match members {
                Some(members) if !members.contains(&person_id) => None,
                _ => Some(*prefix),
            }
        })
    }
}
