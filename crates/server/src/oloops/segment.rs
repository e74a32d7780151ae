//! The segment open-loop: materializes each `@segment` definition on one
//! partition and tallies membership counts.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use openset_async::{CellCtl, OpenLoop, Shuttle};
use openset_core::hash_text;
use openset_db::{PartitionData, Table};
use openset_query::{CompiledQuery, Interpreter};

use crate::rpc::{CellQueryResult, SharedResultSet};

use super::{partition_migrated, table_dropped_error, ShuttleReporter};

pub struct OpenLoopSegment {
    table: Arc<Table>,
    /// (segment name, compiled definition), one processed per slice.
    queries: Vec<(String, CompiledQuery)>,
    result: SharedResultSet,
    reporter: ShuttleReporter,
    data: Option<Arc<RwLock<PartitionData>>>,
    index: usize,
}

impl OpenLoopSegment {
    pub fn new(
        shuttle: Arc<Shuttle<CellQueryResult>>,
        table: Arc<Table>,
        queries: Vec<(String, CompiledQuery)>,
        result: SharedResultSet,
        instance: usize,
    ) -> Self {
        Self {
            table,
            queries,
            result,
            reporter: ShuttleReporter::new(shuttle, instance),
            data: None,
            index: 0,
        }
    }
}

impl OpenLoop for OpenLoopSegment {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn prepare(&mut self, ctl: &mut CellCtl) {
        match self.table.get_partition(ctl.partition()) {
            Some(data) => self.data = Some(data),
            None => {
                self.reporter.ok();
                ctl.suicide();
            }
        }
    }

    fn run(&mut self, ctl: &mut CellCtl) -> bool {
        if self.index >= self.queries.len() {
            self.reporter.ok();
            ctl.suicide();
            return false;
        }
        let Some(data) = self.data.clone() else {
            self.reporter.ok();
            ctl.suicide();
            return false;
        };

        let (name, query) = &self.queries[self.index];
        let interp = Interpreter::new(query);

        let members: HashSet<i64> = {
            let guard = data.read().unwrap();
            guard
                .persons()
                .filter(|person| interp.person_matches(person))
                .map(|person| person.id)
                .collect()
        };
        let count = members.len() as i64;
        data.write().unwrap().set_segment(name, members);

        let mut result = self.result.lock().unwrap();
        let hash = hash_text(name);
        result.add_literal(hash, name.clone());
        result.accumulate(&[hash], 0, count);
        drop(result);

        self.index += 1;
        true
    }

    fn partition_removed(&mut self, _ctl: &CellCtl) {
        self.reporter.fail(partition_migrated());
    }

    fn table_dropped(&mut self, _ctl: &CellCtl) {
        self.reporter.fail(table_dropped_error());
    }
}
