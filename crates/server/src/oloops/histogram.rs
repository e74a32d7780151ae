//! The histogram open-loop: buckets each person's script-returned value.

use std::sync::{Arc, RwLock};

use tracing::debug;

use openset_async::{CellCtl, OpenLoop, Shuttle};
use openset_db::{PartitionData, Table};
use openset_query::{CompiledQuery, Interpreter};

use crate::rpc::{CellQueryResult, SharedResultSet};

use super::{partition_migrated, table_dropped_error, SegmentFilter, ShuttleReporter, SLICE_SIZE};

pub struct OpenLoopHistogram {
    table: Arc<Table>,
    query: CompiledQuery,
    group_name: String,
    foreach: Option<String>,
    /// Bucket width in fixed-point units; None tallies exact values.
    bucket: Option<i64>,
    result: SharedResultSet,
    reporter: ShuttleReporter,
    data: Option<Arc<RwLock<PartitionData>>>,
    segments: SegmentFilter,
    cursor: usize,
}

impl OpenLoopHistogram {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shuttle: Arc<Shuttle<CellQueryResult>>,
        table: Arc<Table>,
        query: CompiledQuery,
        group_name: String,
        foreach: Option<String>,
        bucket: Option<i64>,
        result: SharedResultSet,
        instance: usize,
    ) -> Self {
        Self {
            table,
            query,
            group_name,
            foreach,
            bucket,
            result,
            reporter: ShuttleReporter::new(shuttle, instance),
            data: None,
            segments: SegmentFilter::empty(),
            cursor: 0,
        }
    }

    fn bucket_of(&self, value: i64) -> i64 {
        match self.bucket {
            Some(bucket) if bucket > 0 => value.div_euclid(bucket) * bucket,
            _ => value,
        }
    }
}

impl OpenLoop for OpenLoopHistogram {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn prepare(&mut self, ctl: &mut CellCtl) {
        debug!(
            "histogram '{}' on partition {} (foreach: {:?})",
            self.group_name,
            ctl.partition(),
            self.foreach
        );

        let Some(data) = self.table.get_partition(ctl.partition()) else {
            self.reporter.ok();
            ctl.suicide();
            return;
        };

        if !self.query.segments.is_empty() {
            let guard = data.read().unwrap();
            let mut result = self.result.lock().unwrap();
            match SegmentFilter::resolve(&self.query.segments, &guard, &mut result) {
                Ok(segments) => self.segments = segments,
                Err(error) => {
                    drop(result);
                    drop(guard);
                    self.reporter.fail(error);
                    ctl.suicide();
                    return;
                }
            }
        }

        self.data = Some(data);
    }

    fn run(&mut self, ctl: &mut CellCtl) -> bool {
        let Some(data) = self.data.clone() else {
            self.reporter.ok();
            ctl.suicide();
            return false;
        };
        let guard = data.read().unwrap();
        let interp = Interpreter::new(&self.query);
        let mut result = self.result.lock().unwrap();

        let mut cursor = self.cursor;
        let end = (cursor + SLICE_SIZE).min(guard.person_count());
        while cursor < end {
            let person = match guard.person_by_index(cursor) {
                Some(person) => person,
                None => break,
            };
            cursor += 1;

            let Some(value) = interp.return_value(person) else {
                continue;
            };
            let key = self.bucket_of(value);
            if self.segments.is_empty() {
                result.accumulate(&[key], 0, 1);
            } else {
                for prefix in self.segments.prefixes_for(person.id) {
                    result.accumulate(&[prefix, key], 0, 1);
                }
            }
        }
        self.cursor = cursor;

        if self.cursor >= guard.person_count() {
            drop(result);
            drop(guard);
            self.reporter.ok();
            ctl.suicide();
            return false;
        }
        true
    }

    fn partition_removed(&mut self, _ctl: &CellCtl) {
        self.reporter.fail(partition_migrated());
    }

    fn table_dropped(&mut self, _ctl: &CellCtl) {
        self.reporter.fail(table_dropped_error());
    }
}
