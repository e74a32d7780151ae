//! Fixed pool of worker threads, each owning a disjoint set of partitions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::info;

use openset_core::config::SchedulerConfig;
use openset_core::now_ms;

use crate::open_loop::OpenLoop;
use crate::partition::PartitionLoop;

/// Wake signal for one worker: submitters set `triggered` and notify so the
/// worker does not wait out its idle timer.
#[derive(Default)]
pub(crate) struct WorkerWake {
    triggered: Mutex<bool>,
    cond: Condvar,
}

impl WorkerWake {
    pub(crate) fn trigger(&self) {
        let mut triggered = self.triggered.lock().unwrap();
        *triggered = true;
        self.cond.notify_one();
    }

    /// Sleep until triggered or `ms` elapses, then clear the trigger.
    fn wait_for(&self, ms: i64) {
        let deadline = Instant::now() + Duration::from_millis(ms.max(0) as u64);
        let mut triggered = self.triggered.lock().unwrap();
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, timeout) = self.cond.wait_timeout(triggered, deadline - now).unwrap();
            triggered = guard;
            if timeout.timed_out() {
                break;
            }
        }
        *triggered = false;
    }
}

/// The partition scheduler pool.
///
/// Partitions are statically assigned to workers by `partition mod workers`;
/// a partition never migrates between workers, which is what makes
/// worker-local result aggregation safe.
pub struct AsyncPool {
    worker_count: usize,
    partition_max: usize,
    run_interval_ms: i64,
    wakes: Vec<Arc<WorkerWake>>,
    partitions: RwLock<HashMap<i32, Arc<PartitionLoop>>>,
    running: AtomicBool,
    handles: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl AsyncPool {
    pub fn new(config: &SchedulerConfig, partition_max: usize) -> Arc<Self> {
        let worker_count = config.resolved_workers();
        Arc::new(Self {
            worker_count,
            partition_max,
            run_interval_ms: config.run_interval_ms,
            wakes: (0..worker_count)
                .map(|_| Arc::new(WorkerWake::default()))
                .collect(),
            partitions: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn partition_max(&self) -> usize {
        self.partition_max
    }

    /// Create the scheduler loop for a partition this node now owns.
    /// Idempotent: re-initializing an existing partition returns it as-is.
    pub fn init_partition(&self, partition: i32) -> Arc<PartitionLoop> {
        let worker = partition as usize % self.worker_count;
        let mut partitions = self.partitions.write().unwrap();
        partitions
            .entry(partition)
            .or_insert_with(|| {
                Arc::new(PartitionLoop::new(
                    partition,
                    worker,
                    self.wakes[worker].clone(),
                ))
            })
            .clone()
    }

    pub fn get_partition(&self, partition: i32) -> Option<Arc<PartitionLoop>> {
        self.partitions.read().unwrap().get(&partition).cloned()
    }

    /// Tear down a partition this node no longer owns. Every resident loop
    /// receives `partition_removed` before destruction.
    pub fn drop_partition(&self, partition: i32) {
        let removed = self.partitions.write().unwrap().remove(&partition);
        if let Some(part) = removed {
            part.release();
        }
    }

    /// Delete every loop owned by `table` across all partitions.
    pub fn purge_by_table(&self, table: &str) {
        let partitions: Vec<_> = self.partitions.read().unwrap().values().cloned().collect();
        for part in partitions {
            part.purge_by_table(table);
        }
    }

    /// Build and submit one loop per partition via the factory. The factory
    /// sees the target partition loop so it can pick the worker-local
    /// result set by `worker()`.
    pub fn cell_factory<F>(&self, partitions: &[i32], mut factory: F)
    where
        F: FnMut(&PartitionLoop) -> Box<dyn OpenLoop>,
    {
        for &partition in partitions {
            if let Some(part) = self.get_partition(partition) {
                let work = factory(&part);
                part.queue_cell(work);
            }
        }
    }

    /// Spawn the worker threads. Each loops over its owned partitions,
    /// re-ticking immediately while any partition reports activity, and
    /// otherwise sleeping until triggered or the earliest `run_at` (capped
    /// at the configured idle interval).
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("scheduler pool starting with {} workers", self.worker_count);

        let mut handles = self.handles.lock().unwrap();
        for worker_id in 0..self.worker_count {
            let pool = self.clone();
            handles.push(
                std::thread::Builder::new()
                    .name(format!("oloop-worker-{worker_id}"))
                    .spawn(move || pool.worker_loop(worker_id))
                    .expect("spawning scheduler worker"),
            );
        }
    }

    fn worker_loop(&self, worker_id: usize) {
        while self.running.load(Ordering::SeqCst) {
            let owned: Vec<Arc<PartitionLoop>> = self
                .partitions
                .read()
                .unwrap()
                .values()
                .filter(|p| p.worker() == worker_id)
                .cloned()
                .collect();

            let mut next_run = -1i64;
            let mut worked = false;
            for part in &owned {
                if part.run(&mut next_run) {
                    worked = true;
                }
            }

            if worked {
                continue;
            }

            let mut sleep_ms = self.run_interval_ms;
            if next_run != -1 {
                sleep_ms = sleep_ms.min(next_run - now_ms());
            }
            self.wakes[worker_id].wait_for(sleep_ms);
        }
    }

    /// Stop the workers and join them. Partitions and their loops survive;
    /// call `drop_partition` to tear those down.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        for wake in &self.wakes {
            wake.trigger();
        }
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        info!("scheduler pool stopped");
    }
}
