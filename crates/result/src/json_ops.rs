//! JSON rendering and shaping of merged result sets.
//!
//! The client-facing shape is `{"_": [{"g": group, "c": [cells]}]}` - `g` is
//! a scalar for one group level, an array for nested groups; cells are
//! numbers or null where nothing accumulated.

use serde_json::{json, Value};

pub use openset_core::FIXED_POINT_SCALE;

use crate::result_set::{AccType, ResultSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// Parse the `order` query parameter; anything but `asc` means desc.
    pub fn from_param(value: &str) -> Self {
        if value == "asc" {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        }
    }
}

/// Render a merged set to the client JSON shape. Row order is unspecified;
/// apply a sort before replying.
pub fn result_set_to_json(set: &ResultSet) -> Value {
    let rows: Vec<Value> = set
        .rows()
        .map(|(key, cells)| {
            let group: Value = if key.len() == 1 {
                group_value(set, key[0])
            } else {
                Value::Array(key.iter().map(|k| group_value(set, *k)).collect())
            };
            let cells: Vec<Value> = cells
                .iter()
                .zip(set.acc_types())
                .map(|(cell, acc)| {
                    if cell.is_none() {
                        Value::Null
                    } else if *acc == AccType::Avg && cell.count > 0 {
                        json!(cell.value as f64 / cell.count as f64)
                    } else {
                        json!(cell.value)
                    }
                })
                .collect();
            json!({ "g": group, "c": cells })
        })
        .collect();

    json!({ "_": rows })
}

fn group_value(set: &ResultSet, key: i64) -> Value {
    match set.literal(key) {
        Some(text) => Value::String(text.to_string()),
        None => json!(key),
    }
}

fn rows_mut(result: &mut Value) -> Option<&mut Vec<Value>> {
    result.get_mut("_")?.as_array_mut()
}

/// Total order over group/cell scalars: null < numbers < strings.
fn scalar_rank(value: &Value) -> (u8, f64, &str) {
    match value {
        Value::Number(n) => (1, n.as_f64().unwrap_or(f64::MIN), ""),
        Value::String(s) => (2, 0.0, s.as_str()),
        _ => (0, 0.0, ""),
    }
}

fn compare_scalars(a: &Value, b: &Value) -> std::cmp::Ordering {
    let (ra, na, sa) = scalar_rank(a);
    let (rb, nb, sb) = scalar_rank(b);
    ra.cmp(&rb)
        .then(na.partial_cmp(&nb).unwrap_or(std::cmp::Ordering::Equal))
        .then(sa.cmp(sb))
}

/// Sort rows by group key.
pub fn sort_by_group(result: &mut Value, order: SortOrder) {
    if let Some(rows) = rows_mut(result) {
        rows.sort_by(|a, b| {
            let ord = compare_scalars(&a["g"], &b["g"]);
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
}

/// Sort rows by one result column; null cells sort below everything.
pub fn sort_by_column(result: &mut Value, order: SortOrder, column: usize) {
    if let Some(rows) = rows_mut(result) {
        rows.sort_by(|a, b| {
            let cell = |row: &Value| row["c"].get(column).cloned().unwrap_or(Value::Null);
            let ord = compare_scalars(&cell(a), &cell(b));
            match order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
}

/// Keep at most `trim` rows; negative means unlimited.
pub fn trim_rows(result: &mut Value, trim: i64) {
    if trim < 0 {
        return;
    }
    if let Some(rows) = rows_mut(result) {
        rows.truncate(trim as usize);
    }
}

/// Replace scaled fixed-point group keys with their unscaled values
/// (integer when whole, float otherwise).
pub fn unscale_groups(result: &mut Value) {
    if let Some(rows) = rows_mut(result) {
        for row in rows {
            if let Some(key) = row["g"].as_i64() {
                row["g"] = unscaled(key);
            }
        }
    }
}

fn unscaled(key: i64) -> Value {
    if key % FIXED_POINT_SCALE == 0 {
        json!(key / FIXED_POINT_SCALE)
    } else {
        json!(key as f64 / FIXED_POINT_SCALE as f64)
    }
}

/// Unscale the cells of fixed-point result columns (aggregates over
/// double-typed source columns).
pub fn unscale_columns(result: &mut Value, columns: &[usize]) {
    if columns.is_empty() {
        return;
    }
    if let Some(rows) = rows_mut(result) {
        for row in rows {
            let Some(cells) = row["c"].as_array_mut() else {
                continue;
            };
            for &column in columns {
                if let Some(cell) = cells.get_mut(column) {
                    if let Some(value) = cell.as_i64() {
                        *cell = unscaled(value);
                    } else if let Some(value) = cell.as_f64() {
                        *cell = json!(value / FIXED_POINT_SCALE as f64);
                    }
                }
            }
        }
    }
}

/// Fill a histogram result to contiguous buckets.
///
/// Group keys arrive scaled (fixed-point); `bucket`, `force_min` and
/// `force_max` are scaled too. Missing buckets get zero cells. Keys are
/// rendered unscaled afterwards, sorted ascending - the caller applies the
/// requested sort order on top.
pub fn histogram_fill(
    result: &mut Value,
    bucket: i64,
    force_min: Option<i64>,
    force_max: Option<i64>,
) {
    if bucket <= 0 {
        return;
    }
    let Some(rows) = rows_mut(result) else {
        return;
    };

    let mut existing: Vec<(i64, Value)> = Vec::with_capacity(rows.len());
    let mut column_count = 0usize;
    for row in rows.drain(..) {
        if let Some(key) = row["g"].as_i64() {
            column_count = column_count.max(row["c"].as_array().map_or(0, |c| c.len()));
            existing.push((key, row));
        }
    }

    let data_min = existing.iter().map(|(k, _)| *k).min();
    let data_max = existing.iter().map(|(k, _)| *k).max();
    let Some(low) = force_min.or(data_min) else {
        // No data and no forced range: nothing to fill.
        return;
    };
    let high = force_max.or(data_max).unwrap_or(low).max(low);

    let align = |v: i64| v.div_euclid(bucket) * bucket;
    let (low, high) = (align(low), align(high));

    let mut filled = Vec::new();
    let mut cursor = low;
    while cursor <= high {
        let row = existing
            .iter()
            .find(|(k, _)| *k == cursor)
            .map(|(_, row)| row.clone())
            .unwrap_or_else(|| json!({ "g": cursor, "c": vec![0i64; column_count.max(1)] }));
        filled.push(row);
        cursor += bucket;
    }

    *rows = filled;
    unscale_groups(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_result(rows: &[(i64, i64)]) -> Value {
        let mut set = ResultSet::new(1);
        for &(key, value) in rows {
            set.accumulate(&[key], 0, value);
        }
        result_set_to_json(&set)
    }

    #[test]
    fn sort_and_trim_by_column() {
        let mut result = make_result(&[(1, 30), (2, 10), (3, 20)]);
        sort_by_column(&mut result, SortOrder::Desc, 0);
        trim_rows(&mut result, 2);

        let rows = result["_"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["c"][0], 30);
        assert_eq!(rows[1]["c"][0], 20);
    }

    #[test]
    fn sort_by_group_orders_keys() {
        let mut result = make_result(&[(30, 1), (10, 1), (20, 1)]);
        sort_by_group(&mut result, SortOrder::Asc);
        let groups: Vec<i64> = result["_"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["g"].as_i64().unwrap())
            .collect();
        assert_eq!(groups, vec![10, 20, 30]);
    }

    #[test]
    fn literal_groups_render_as_strings() {
        let mut set = ResultSet::new(1);
        let hash = openset_core::hash_text("US");
        set.add_literal(hash, "US");
        set.accumulate(&[hash], 0, 3);
        let result = result_set_to_json(&set);
        assert_eq!(result["_"][0]["g"], "US");
    }

    #[test]
    fn histogram_fills_contiguous_buckets() {
        // Buckets of 10 (scaled), data at 0 and 30, forced max 50.
        let scale = FIXED_POINT_SCALE;
        let mut result = make_result(&[(0, 2), (30 * scale, 7)]);
        histogram_fill(
            &mut result,
            10 * scale,
            Some(0),
            Some(50 * scale),
        );

        let rows = result["_"].as_array().unwrap();
        let groups: Vec<i64> = rows.iter().map(|r| r["g"].as_i64().unwrap()).collect();
        assert_eq!(groups, vec![0, 10, 20, 30, 40, 50]);
        assert_eq!(rows[0]["c"][0], 2);
        assert_eq!(rows[1]["c"][0], 0, "missing bucket zero-fills");
        assert_eq!(rows[3]["c"][0], 7);
    }

    #[test]
    fn histogram_fill_without_data_or_range_is_noop() {
        let mut result = make_result(&[]);
        histogram_fill(&mut result, 10, None, None);
        assert_eq!(result["_"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn avg_cells_render_as_float() {
        let mut set = ResultSet::new(1);
        set.set_acc_types(&[AccType::Avg]);
        set.accumulate(&[1], 0, 10);
        set.accumulate(&[1], 0, 5);
        let result = result_set_to_json(&set);
        assert_eq!(result["_"][0]["c"][0], 7.5);
    }
}
