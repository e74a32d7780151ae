//! The open-loop contract: a cooperative, partition-resident work unit.

use openset_core::now_ms;

/// Lifecycle of an open-loop. Monotone: `Running` -> `Done`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Done,
}

/// Scheduling controls handed to a loop during `prepare` and `run`.
///
/// A loop never owns its own lifecycle fields; the partition loop does. This
/// surface is how the work signals completion (`suicide`) or asks to be
/// re-entered later (`schedule_future`).
pub struct CellCtl {
    pub(crate) state: LoopState,
    /// Earliest moment the scheduler should re-enter `run()`, epoch ms.
    /// Zero means "immediately eligible".
    pub(crate) run_at: i64,
    pub(crate) partition: i32,
    pub(crate) worker: usize,
}

impl CellCtl {
    pub(crate) fn new(partition: i32, worker: usize) -> Self {
        Self {
            state: LoopState::Running,
            run_at: 0,
            partition,
            worker,
        }
    }

    /// The partition this loop is bound to.
    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// The worker thread index that owns this loop's partition.
    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Mark the loop complete. The scheduler destroys it after this slice.
    pub fn suicide(&mut self) {
        self.state = LoopState::Done;
    }

    /// Ask to be re-entered no earlier than `delay_ms` from now.
    pub fn schedule_future(&mut self, delay_ms: i64) {
        self.run_at = now_ms() + delay_ms;
    }

    /// Ask to be re-entered no earlier than the absolute time `at_ms`.
    pub fn schedule_at(&mut self, at_ms: i64) {
        self.run_at = at_ms;
    }
}

/// A single unit of partition-resident work, scheduled cooperatively.
///
/// A loop yields only by returning from `run()`; long operations are chunked
/// across slices with `schedule_future` and `check_condition` gating entry.
/// Implementations must not block inside `run()`.
pub trait OpenLoop: Send {
    /// Table this loop belongs to, for bulk purge on table drop.
    fn owning_table(&self) -> &str;

    /// One-shot setup, called on the partition's worker thread after the
    /// loop has been assigned. May call `ctl.suicide()` to finish early.
    fn prepare(&mut self, _ctl: &mut CellCtl) {}

    /// One cooperative slice. Return `true` to request immediate re-entry
    /// within this tick's accounting, `false` to yield.
    fn run(&mut self, ctl: &mut CellCtl) -> bool;

    /// Gate predicate evaluated every tick before `run` is considered.
    fn check_condition(&self) -> bool {
        true
    }

    /// Terminal notification: the partition is being dropped. The loop must
    /// release external obligations (e.g. deliver an error to its shuttle)
    /// and must not schedule further work.
    fn partition_removed(&mut self, _ctl: &CellCtl) {}

    /// Terminal notification: the owning table was dropped while the
    /// partition lives on. Defaults to the partition-removed path so a
    /// waiting shuttle still completes.
    fn table_dropped(&mut self, ctl: &CellCtl) {
        self.partition_removed(ctl);
    }
}

/// Scheduler-owned wrapper pairing the work with its lifecycle state.
pub(crate) struct Cell {
    pub(crate) ctl: CellCtl,
    pub(crate) prepared: bool,
    pub(crate) work: Box<dyn OpenLoop>,
}

impl Cell {
    pub(crate) fn new(work: Box<dyn OpenLoop>, partition: i32, worker: usize) -> Self {
        Self {
            ctl: CellCtl::new(partition, worker),
            prepared: false,
            work,
        }
    }

    pub(crate) fn check_timer(&self, now: i64) -> bool {
        self.ctl.run_at <= now
    }

    pub(crate) fn done(&self) -> bool {
        self.ctl.state == LoopState::Done
    }
}
