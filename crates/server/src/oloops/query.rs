//! The event-query open-loop: runs a compiled query over every person on
//! one partition, tallying into the worker-local result set.

use std::sync::{Arc, RwLock};

use openset_async::{CellCtl, OpenLoop, Shuttle};
use openset_db::{PartitionData, Table};
use openset_query::{CompiledQuery, Interpreter};

use crate::rpc::{CellQueryResult, SharedResultSet};

use super::{partition_migrated, table_dropped_error, SegmentFilter, ShuttleReporter, SLICE_SIZE};

pub struct OpenLoopQuery {
    table: Arc<Table>,
    query: CompiledQuery,
    result: SharedResultSet,
    reporter: ShuttleReporter,
    data: Option<Arc<RwLock<PartitionData>>>,
    segments: SegmentFilter,
    cursor: usize,
}

impl OpenLoopQuery {
    pub fn new(
        shuttle: Arc<Shuttle<CellQueryResult>>,
        table: Arc<Table>,
        query: CompiledQuery,
        result: SharedResultSet,
        instance: usize,
    ) -> Self {
        Self {
            table,
            query,
            result,
            reporter: ShuttleReporter::new(shuttle, instance),
            data: None,
            segments: SegmentFilter::empty(),
            cursor: 0,
        }
    }
}

impl OpenLoop for OpenLoopQuery {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn prepare(&mut self, ctl: &mut CellCtl) {
        let Some(data) = self.table.get_partition(ctl.partition()) else {
            // No data resident for this table here: an empty contribution.
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
            // person_by_index is dense in [0, person_count)
            let person = match guard.person_by_index(cursor) {
                Some(person) => person,
                None => break,
            };
            if self.segments.is_empty() {
                interp.exec_person(person, None, &mut result);
            } else {
                for prefix in self.segments.prefixes_for(person.id) {
                    interp.exec_person(person, Some(prefix), &mut result);
                }
            }
            cursor += 1;
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
