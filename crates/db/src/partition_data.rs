//! One partition's resident data: persons and segment membership.

use std::collections::{HashMap, HashSet};

use serde_json::json;

use crate::schema::{Columns, Event, FieldValue};

/// A person: latest property values plus the event timeline, ordered by
/// insertion (callers append in stamp order).
#[derive(Debug, Clone, Default)]
pub struct Person {
    pub id: i64,
    /// column index -> latest value
    pub props: HashMap<usize, FieldValue>,
    pub events: Vec<Event>,
}

impl Person {
    pub fn set_prop(&mut self, column: usize, value: FieldValue) {
        self.props.insert(column, value);
    }

    pub fn add_event(&mut self, event: Event) {
        for (column, value) in &event.values {
            self.props.insert(*column, value.clone());
        }
        self.events.push(event);
    }

    /// Render for the person endpoint: properties and timeline with
    /// column names resolved.
    pub fn to_json(&self, columns: &Columns) -> serde_json::Value {
        let name_of = |index: &usize| {
            columns
                .by_index(*index)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| index.to_string())
        };

        let props: serde_json::Map<String, serde_json::Value> = self
            .props
            .iter()
            .map(|(index, value)| (name_of(index), field_json(value)))
            .collect();

        let events: Vec<serde_json::Value> = self
            .events
            .iter()
            .map(|event| {
                let values: serde_json::Map<String, serde_json::Value> = event
                    .values
                    .iter()
                    .map(|(index, value)| (name_of(index), field_json(value)))
                    .collect();
                json!({ "stamp": event.stamp, "values": values })
            })
            .collect();

        json!({ "id": self.id, "props": props, "events": events })
    }
}

fn field_json(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Int(v) => json!(v),
        FieldValue::Double(v) => json!(v),
        FieldValue::Bool(v) => json!(v),
        FieldValue::Text(v) => json!(v),
    }
}

/// A materialized segment: member person ids plus the stamp the set was
/// built at, so TTL expiry can be enforced.
#[derive(Debug, Clone, Default)]
pub struct SegmentData {
    pub members: HashSet<i64>,
    pub created_ms: i64,
}

/// Data resident on one partition of one table.
#[derive(Debug, Default)]
pub struct PartitionData {
    partition: i32,
    persons: Vec<Person>,
    by_id: HashMap<i64, usize>,
    segments: HashMap<String, SegmentData>,
}

impl PartitionData {
    pub fn new(partition: i32) -> Self {
        Self {
            partition,
            ..Default::default()
        }
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    pub fn person_count(&self) -> usize {
        self.persons.len()
    }

    pub fn get_make_person(&mut self, id: i64) -> &mut Person {
        let index = *self.by_id.entry(id).or_insert_with(|| {
            self.persons.push(Person {
                id,
                ..Default::default()
            });
            self.persons.len() - 1
        });
        &mut self.persons[index]
    }

    pub fn person_by_id(&self, id: i64) -> Option<&Person> {
        self.by_id.get(&id).map(|&index| &self.persons[index])
    }

    pub fn person_by_index(&self, index: usize) -> Option<&Person> {
        self.persons.get(index)
    }

    pub fn persons(&self) -> impl Iterator<Item = &Person> {
        self.persons.iter()
    }

    /// Replace a segment's membership set, stamping it now.
    pub fn set_segment(&mut self, name: &str, members: HashSet<i64>) {
        self.segments.insert(
            name.to_string(),
            SegmentData {
                members,
                created_ms: openset_core::now_ms(),
            },
        );
    }

    pub fn segment(&self, name: &str) -> Option<&SegmentData> {
        self.segments.get(name)
    }

    pub fn has_segment(&self, name: &str) -> bool {
        self.segments.contains_key(name)
    }

    pub fn drop_segment(&mut self, name: &str) {
        self.segments.remove(name);
    }

    pub fn segment_names(&self) -> Vec<String> {
        self.segments.keys().cloned().collect()
    }
}
