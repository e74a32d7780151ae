//! One partition's single-threaded cooperative scheduler.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::error;

use openset_core::now_ms;

use crate::open_loop::{Cell, OpenLoop};
use crate::pool::WorkerWake;

/// FIFO + active ring of open-loops for one partition.
///
/// `queued` takes submissions from any thread under its own lock; `active`
/// belongs to the owning worker thread and is only contended by purge and
/// teardown. Lock order where both are held is `active` then `queued`.
pub struct PartitionLoop {
    partition: i32,
    worker: usize,
    queue_size: AtomicUsize,
    queued: Mutex<Vec<Cell>>,
    active: Mutex<Vec<Cell>>,
    wake: Arc<WorkerWake>,
}

impl PartitionLoop {
    pub(crate) fn new(partition: i32, worker: usize, wake: Arc<WorkerWake>) -> Self {
        Self {
            partition,
            worker,
            queue_size: AtomicUsize::new(0),
            queued: Mutex::new(Vec::new()),
            active: Mutex::new(Vec::new()),
            wake,
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Submit work from any thread. The loop is assigned to this partition
    /// here and admitted to `active` at the start of the next tick; the
    /// owning worker is woken immediately rather than waiting on its timer.
    pub fn queue_cell(&self, work: Box<dyn OpenLoop>) {
        self.queue(Cell::new(work, self.partition, self.worker));
    }

    /// Submit work whose first slice should not start before `delay_ms`
    /// from now. Used by maintenance loops (segment refresh and friends).
    pub fn queue_cell_future(&self, work: Box<dyn OpenLoop>, delay_ms: i64) {
        let mut cell = Cell::new(work, self.partition, self.worker);
        cell.ctl.schedule_future(delay_ms);
        self.queue(cell);
    }

    fn queue(&self, cell: Cell) {
        {
            let mut queued = self.queued.lock().unwrap();
            queued.push(cell);
            self.queue_size.fetch_add(1, Ordering::Release);
        }
        self.wake.trigger();
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Acquire)
    }

    /// One scheduler tick. Admits everything queued, gives each active loop
    /// one consideration, destroys completed loops, and reports the earliest
    /// future `run_at` through `next_run` (-1 = none pending).
    ///
    /// Returns true when at least one loop asked for immediate re-entry.
    pub fn run(&self, next_run: &mut i64) -> bool {
        let mut active = self.active.lock().unwrap();

        // Admission is deferred to tick start so children spawned mid-tick
        // observe a consistent view and enter no earlier than the next tick.
        if self.queue_size.load(Ordering::Acquire) > 0 {
            let mut queued = self.queued.lock().unwrap();
            self.queue_size.fetch_sub(queued.len(), Ordering::Release);
            active.append(&mut queued);
        }

        if active.is_empty() {
            return false;
        }

        let mut run_count = 0;
        let mut rerun = Vec::with_capacity(active.len());

        for mut cell in active.drain(..) {
            let now = now_ms();

            // Some loops finish inside prepare, so re-check state afterwards.
            if cell.work.check_condition() && cell.check_timer(now) && !cell.done() {
                if !cell.prepared {
                    Self::guarded(&mut cell, |cell| {
                        cell.work.prepare(&mut cell.ctl);
                        false
                    });
                    cell.prepared = true;
                    if cell.done() {
                        continue;
                    }
                }

                if Self::guarded(&mut cell, |cell| cell.work.run(&mut cell.ctl)) {
                    run_count += 1;
                }
            }

            if !cell.done() {
                // Earliest future wakeup across every retained loop, whether
                // it ran this tick or sat out on its timer.
                if cell.ctl.run_at > now && (*next_run == -1 || cell.ctl.run_at < *next_run) {
                    *next_run = cell.ctl.run_at;
                }
                rerun.push(cell);
            }
        }

        *active = rerun;
        run_count > 0
    }

    /// Run one slice of a cell, containing panics. A panicking loop is
    /// marked done so the worker thread survives and the cell is destroyed.
    fn guarded(cell: &mut Cell, f: impl FnOnce(&mut Cell) -> bool) -> bool {
        match catch_unwind(AssertUnwindSafe(|| f(cell))) {
            Ok(rerun) => rerun,
            Err(_) => {
                error!(
                    "open-loop panicked on partition {} (table {}); dropping it",
                    cell.ctl.partition,
                    cell.work.owning_table()
                );
                cell.ctl.suicide();
                false
            }
        }
    }

    /// Delete every loop owned by `table`, notifying each through
    /// `table_dropped` so shuttles waiting on them complete with an error.
    pub fn purge_by_table(&self, table: &str) {
        let mut active = self.active.lock().unwrap();
        let mut queued = self.queued.lock().unwrap();

        for mut cell in active.drain(..).collect::<Vec<_>>() {
            if cell.work.owning_table() == table {
                cell.work.table_dropped(&cell.ctl);
            } else {
                active.push(cell);
            }
        }

        let before = queued.len();
        for mut cell in queued.drain(..).collect::<Vec<_>>() {
            if cell.work.owning_table() == table {
                cell.work.table_dropped(&cell.ctl);
            } else {
                queued.push(cell);
            }
        }
        self.queue_size
            .fetch_sub(before - queued.len(), Ordering::Release);
    }

    /// Partition teardown: every loop, queued or active, gets its terminal
    /// `partition_removed` notification and is destroyed.
    pub(crate) fn release(&self) {
        let mut active = self.active.lock().unwrap();
        let mut queued = self.queued.lock().unwrap();

        for mut cell in active.drain(..) {
            cell.work.partition_removed(&cell.ctl);
        }
        for mut cell in queued.drain(..) {
            cell.work.partition_removed(&cell.ctl);
        }
        self.queue_size.store(0, Ordering::Release);
    }
}
