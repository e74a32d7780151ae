//! The column open-loop: tallies person counts per distinct value (or
//! bucket) of one property column, with optional filtering.

use std::sync::{Arc, RwLock};

use regex::Regex;

use openset_async::{CellCtl, OpenLoop, Shuttle};
use openset_core::hash_text;
use openset_db::{Column, ColumnType, FieldValue, PartitionData, Table};

use crate::rpc::{CellQueryResult, SharedResultSet};

use super::{partition_migrated, table_dropped_error, SegmentFilter, ShuttleReporter, SLICE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFilterMode {
    All,
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Rx,
    Sub,
}

/// Validated column-query configuration built by the coordinator.
/// Numeric filters and buckets arrive in the column's native units: raw
/// for int columns, fixed-point for double columns.
#[derive(Clone)]
pub struct ColumnQuery {
    pub column: Column,
    pub mode: ColumnFilterMode,
    pub filter_low: Option<FieldValue>,
    pub filter_high: Option<FieldValue>,
    pub rx: Option<Regex>,
    pub bucket: Option<i64>,
    pub segments: Vec<String>,
}

pub struct OpenLoopColumn {
    table: Arc<Table>,
    config: ColumnQuery,
    result: SharedResultSet,
    reporter: ShuttleReporter,
    data: Option<Arc<RwLock<PartitionData>>>,
    segments: SegmentFilter,
    cursor: usize,
}

impl OpenLoopColumn {
    pub fn new(
        shuttle: Arc<Shuttle<CellQueryResult>>,
        table: Arc<Table>,
        config: ColumnQuery,
        result: SharedResultSet,
        instance: usize,
    ) -> Self {
        Self {
            table,
            config,
            result,
            reporter: ShuttleReporter::new(shuttle, instance),
            data: None,
            segments: SegmentFilter::empty(),
            cursor: 0,
        }
    }

    /// Group key for a matching value, or None when the value fails the
    /// filter or does not fit the column type.
    fn match_key(&self, value: &FieldValue, result: &mut openset_result::ResultSet) -> Option<i64> {
        let config = &self.config;
        match config.column.col_type {
            ColumnType::Text => {
                let text = value.as_text()?;
                let matched = match config.mode {
                    ColumnFilterMode::All => true,
                    ColumnFilterMode::Eq => {
                        config.filter_low.as_ref().and_then(|f| f.as_text()) == Some(text)
                    }
                    ColumnFilterMode::Rx => {
                        config.rx.as_ref().map(|rx| rx.is_match(text)).unwrap_or(false)
                    }
                    ColumnFilterMode::Sub => config
                        .filter_low
                        .as_ref()
                        .and_then(|f| f.as_text())
                        .map(|needle| text.contains(needle))
                        .unwrap_or(false),
                    _ => false,
                };
                if !matched {
                    return None;
                }
                let hash = hash_text(text);
                result.add_literal(hash, text);
                Some(hash)
            }
            ColumnType::Bool => {
                let actual = value.as_bool()?;
                let matched = match config.mode {
                    ColumnFilterMode::All => true,
                    ColumnFilterMode::Eq => {
                        config.filter_low.as_ref().and_then(|f| f.as_bool()) == Some(actual)
                    }
                    _ => false,
                };
                matched.then_some(actual as i64)
            }
            ColumnType::Int | ColumnType::Double => {
                let actual = numeric(value, config.column.col_type)?;
                let low = config.filter_low.as_ref().and_then(numeric_filter);
                let high = config.filter_high.as_ref().and_then(numeric_filter);
                let matched = match config.mode {
                    ColumnFilterMode::All => true,
                    ColumnFilterMode::Eq => low == Some(actual),
                    ColumnFilterMode::Gt => low.map(|f| actual > f).unwrap_or(false),
                    ColumnFilterMode::Gte => low.map(|f| actual >= f).unwrap_or(false),
                    ColumnFilterMode::Lt => low.map(|f| actual < f).unwrap_or(false),
                    ColumnFilterMode::Lte => low.map(|f| actual <= f).unwrap_or(false),
                    ColumnFilterMode::Between => match (low, high) {
                        (Some(low), Some(high)) => actual >= low && actual < high,
                        _ => false,
                    },
                    _ => false,
                };
                if !matched {
                    return None;
                }
                Some(match config.bucket {
                    Some(bucket) if bucket > 0 => actual.div_euclid(bucket) * bucket,
                    _ => actual,
                })
            }
        }
    }
}

/// Value in the column's native units: raw ints, fixed-point doubles.
fn numeric(value: &FieldValue, col_type: ColumnType) -> Option<i64> {
    match (col_type, value) {
        (ColumnType::Int, FieldValue::Int(v)) => Some(*v),
        (ColumnType::Int, FieldValue::Double(v)) => Some(*v as i64),
        (ColumnType::Double, value) => value.as_fixed(),
        _ => None,
    }
}

/// Filter values were typed by the coordinator; ints and pre-scaled
/// doubles both arrive as Int.
fn numeric_filter(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Double(v) => Some(*v as i64),
        _ => None,
    }
}

impl OpenLoop for OpenLoopColumn {
    fn owning_table(&self) -> &str {
        self.table.name()
    }

    fn prepare(&mut self, ctl: &mut CellCtl) {
        let Some(data) = self.table.get_partition(ctl.partition()) else {
            self.reporter.ok();
            ctl.suicide();
            return;
        };

        if !self.config.segments.is_empty() {
            let guard = data.read().unwrap();
            let mut result = self.result.lock().unwrap();
            match SegmentFilter::resolve(&self.config.segments, &guard, &mut result) {
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
        let mut result = self.result.lock().unwrap();

        let column_index = self.config.column.index;
        let mut cursor = self.cursor;
        let end = (cursor + SLICE_SIZE).min(guard.person_count());
        while cursor < end {
            let person = match guard.person_by_index(cursor) {
                Some(person) => person,
                None => break,
            };
            cursor += 1;

            let Some(value) = person.props.get(&column_index) else {
                continue;
            };
            let Some(key) = self.match_key(value, &mut result) else {
                continue;
            };
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
