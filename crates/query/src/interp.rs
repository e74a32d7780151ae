//! Per-person execution of a compiled query.
//!
//! The interpreter is mounted on one person at a time by the endpoint
//! open-loops; it walks the event timeline, applies filters, and tallies
//! into the worker-local result set.

use openset_core::{hash_text, FIXED_POINT_SCALE};
use openset_db::{Event, FieldValue, Person};
use openset_result::{AccType, ResultSet};

use crate::compile::{CompiledQuery, Filter, FilterOp};

pub struct Interpreter<'a> {
    query: &'a CompiledQuery,
}

impl<'a> Interpreter<'a> {
    pub fn new(query: &'a CompiledQuery) -> Self {
        Self { query }
    }

    /// Tally one person's matching events. `key_prefix` carries the segment
    /// hash in segment-compare mode so each segment gets its own rows.
    pub fn exec_person(&self, person: &Person, key_prefix: Option<i64>, result: &mut ResultSet) {
        for event in &person.events {
            if !self.event_matches(event, person) {
                continue;
            }
            let group = self.group_key(event, person, result);
            let key: Vec<i64> = match key_prefix {
                Some(prefix) => vec![prefix, group],
                None => vec![group],
            };
            for (index, var) in self.query.column_vars.iter().enumerate() {
                match var.agg {
                    AccType::Count => result.accumulate(&key, index, 1),
                    _ => {
                        if let Some(value) = var
                            .column
                            .and_then(|c| value_of(event, person, c))
                            .and_then(|v| agg_value(&v))
                        {
                            result.accumulate(&key, index, value);
                        }
                    }
                }
            }
        }
    }

    /// Segment membership: does any event pass every filter? A script with
    /// no filters admits everyone.
    pub fn person_matches(&self, person: &Person) -> bool {
        if self.query.filters.is_empty() {
            return true;
        }
        person
            .events
            .iter()
            .any(|event| self.event_matches(event, person))
    }

    /// Histogram source value: the last matching event's `return` column,
    /// in fixed-point units.
    pub fn return_value(&self, person: &Person) -> Option<i64> {
        let column = self.query.returns?;
        person
            .events
            .iter()
            .rev()
            .find(|event| self.event_matches(event, person))
            .and_then(|event| value_of(event, person, column))
            .and_then(|value| value.as_fixed())
    }

    fn event_matches(&self, event: &Event, person: &Person) -> bool {
        self.query
            .filters
            .iter()
            .all(|filter| check_filter(filter, event, person))
    }

    fn group_key(&self, event: &Event, person: &Person, result: &mut ResultSet) -> i64 {
        let Some(column) = self.query.group else {
            return 0;
        };
        match value_of(event, person, column) {
            Some(FieldValue::Text(text)) => {
                let hash = hash_text(&text);
                result.add_literal(hash, text);
                hash
            }
            Some(value) => value.as_fixed().unwrap_or(0),
            None => 0,
        }
    }
}

/// Column value for an event, falling back to the person's latest property.
fn value_of(event: &Event, person: &Person, column: usize) -> Option<FieldValue> {
    event
        .value(column)
        .cloned()
        .or_else(|| person.props.get(&column).cloned())
}

/// Aggregation units: ints raw, doubles fixed-point, bools 0/1.
fn agg_value(value: &FieldValue) -> Option<i64> {
    match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Double(v) => Some((v * FIXED_POINT_SCALE as f64) as i64),
        FieldValue::Bool(v) => Some(*v as i64),
        FieldValue::Text(_) => None,
    }
}

fn check_filter(filter: &Filter, event: &Event, person: &Person) -> bool {
    let Some(value) = value_of(event, person, filter.column) else {
        return false;
    };

    // Text comparisons are equality-only; everything else goes through the
    // common fixed-point view so int/double filters compare cleanly.
    if let (Some(actual), Some(wanted)) = (value.as_text(), filter.value.as_text()) {
        return match filter.op {
            FilterOp::Eq => actual == wanted,
            FilterOp::Neq => actual != wanted,
            _ => false,
        };
    }

    let (Some(actual), Some(wanted)) = (value.as_fixed(), filter.value.as_fixed()) else {
        return false;
    };
    match filter.op {
        FilterOp::Eq => actual == wanted,
        FilterOp::Neq => actual != wanted,
        FilterOp::Gt => actual > wanted,
        FilterOp::Gte => actual >= wanted,
        FilterOp::Lt => actual < wanted,
        FilterOp::Lte => actual <= wanted,
    }
}
