//! A table: schema, session window, partitions, segment metadata.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use crate::partition_data::PartitionData;
use crate::schema::Columns;

/// Per-segment lifecycle settings attached by `@segment` flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentMeta {
    /// Seconds before a materialized segment expires.
    pub ttl: Option<i64>,
    /// Seconds between background refreshes.
    pub refresh: Option<i64>,
}

pub struct Table {
    name: String,
    columns: RwLock<Columns>,
    /// Session timeout in ms, used to split event timelines into sessions.
    session_time: AtomicI64,
    partitions: RwLock<HashMap<i32, Arc<RwLock<PartitionData>>>>,
    segment_meta: RwLock<HashMap<String, SegmentMeta>>,
}

const DEFAULT_SESSION_TIME_MS: i64 = 30 * 60 * 1000;

impl Table {
    pub fn new(name: &str, columns: Columns) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            columns: RwLock::new(columns),
            session_time: AtomicI64::new(DEFAULT_SESSION_TIME_MS),
            partitions: RwLock::new(HashMap::new()),
            segment_meta: RwLock::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the schema; cheap enough for per-query compilation.
    pub fn columns(&self) -> Columns {
        self.columns.read().unwrap().clone()
    }

    pub fn session_time(&self) -> i64 {
        self.session_time.load(Ordering::Relaxed)
    }

    pub fn set_session_time(&self, ms: i64) {
        self.session_time.store(ms, Ordering::Relaxed);
    }

    pub fn get_partition(&self, partition: i32) -> Option<Arc<RwLock<PartitionData>>> {
        self.partitions.read().unwrap().get(&partition).cloned()
    }

    pub fn get_make_partition(&self, partition: i32) -> Arc<RwLock<PartitionData>> {
        self.partitions
            .write()
            .unwrap()
            .entry(partition)
            .or_insert_with(|| Arc::new(RwLock::new(PartitionData::new(partition))))
            .clone()
    }

    pub fn drop_partition(&self, partition: i32) {
        self.partitions.write().unwrap().remove(&partition);
    }

    pub fn set_segment_ttl(&self, segment: &str, ttl: i64) {
        self.segment_meta
            .write()
            .unwrap()
            .entry(segment.to_string())
            .or_default()
            .ttl = Some(ttl);
    }

    pub fn set_segment_refresh(&self, segment: &str, refresh: i64) {
        self.segment_meta
            .write()
            .unwrap()
            .entry(segment.to_string())
            .or_default()
            .refresh = Some(refresh);
    }

    pub fn segment_meta(&self, segment: &str) -> Option<SegmentMeta> {
        self.segment_meta.read().unwrap().get(segment).copied()
    }

    /// The shortest configured segment refresh interval, if any. The
    /// per-partition refresh loop uses this to pace itself.
    pub fn min_segment_refresh(&self) -> Option<i64> {
        self.segment_meta
            .read()
            .unwrap()
            .values()
            .filter_map(|meta| meta.refresh)
            .min()
    }
}
