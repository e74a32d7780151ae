//! Partition maintenance loop: expires segments past their TTL.
//!
//! One of these is queued (future-scheduled) on each owned partition when a
//! table is attached; it reschedules itself forever and dies with the
//! partition.

use std::sync::Arc;

use tracing::debug;

use openset_async::{CellCtl, OpenLoop};
use openset_core::now_ms;
use openset_db::Table;

const DEFAULT_INTERVAL_MS: i64 = 60_000;

pub struct OpenLoopSegmentRefresh {
    table: Arc<Table>,
}

impl OpenLoopSegmentRefresh {
    pub fn new(table: Arc<Table>) -> Self {
        Self { table }
    }

    fn interval_ms(&self) -> i64 {
        self.table
            .min_segment_refresh()
            .map(|seconds| seconds * 1000)
            .unwrap_or(DEFAULT_INTERVAL_MS)
    }
}

impl OpenLoop for OpenLoopSegmentRefresh {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn run(&mut self, ctl: &mut CellCtl) -> bool {
        if let Some(data) = self.table.get_partition(ctl.partition()) {
            let now = now_ms();
            let expired: Vec<String> = {
                let guard = data.read().unwrap();
                guard
                    .segment_names()
                    .into_iter()
                    .filter(|name| {
                        let Some(ttl) = self.table.segment_meta(name).and_then(|m| m.ttl) else {
                            return false;
                        };
                        guard
                            .segment(name)
                            .map(|segment| now - segment.created_ms >= ttl * 1000)
                            .unwrap_or(false)
                    })
                    .collect()
            };
            if !expired.is_empty() {
                let mut guard = data.write().unwrap();
                for name in &expired {
                    debug!(
                        "segment '{}' expired on partition {}",
                        name,
                        ctl.partition()
                    );
                    guard.drop_segment(name);
                }
            }
        }

        ctl.schedule_future(self.interval_ms());
        false
    }
}
