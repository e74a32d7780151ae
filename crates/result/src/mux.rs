//! Inter-node wire form for result sets.
//!
//! Fork nodes reply with a bincode-encoded merge of their worker-local sets,
//! prefixed with a magic tag so the originator can tell a binary partial
//! from a JSON error body.

use bytes::Bytes;
use thiserror::Error;

use crate::result_set::ResultSet;

/// Leading bytes of every internode result payload.
pub const INTERNODE_MAGIC: &[u8; 4] = b"OSRS";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("buffer is not an internode result payload")]
    NotInternode,
}

/// True when a reply buffer is the internode binary form (as opposed to a
/// JSON error body or an empty reply).
pub fn is_internode(data: &[u8]) -> bool {
    data.len() >= INTERNODE_MAGIC.len() && &data[..INTERNODE_MAGIC.len()] == INTERNODE_MAGIC
}

/// Merge the worker-local sets of one fork node and encode the result.
/// An all-empty merge still encodes: zero owned partitions reply with an
/// empty-but-well-formed buffer.
pub fn multi_set_to_internode(column_count: usize, sets: &[ResultSet]) -> Result<Bytes, WireError> {
    let merged = ResultSet::merge_sets(column_count, sets);
    set_to_internode(&merged)
}

/// Encode a single merged set.
pub fn set_to_internode(set: &ResultSet) -> Result<Bytes, WireError> {
    let body = bincode::serialize(set).map_err(|e| WireError::Encode(e.to_string()))?;
    let mut buffer = Vec::with_capacity(INTERNODE_MAGIC.len() + body.len());
    buffer.extend_from_slice(INTERNODE_MAGIC);
    buffer.extend_from_slice(&body);
    Ok(Bytes::from(buffer))
}

/// Decode one node's binary partial back into a result set.
pub fn internode_to_result_set(data: &[u8]) -> Result<ResultSet, WireError> {
    if !is_internode(data) {
        return Err(WireError::NotInternode);
    }
    bincode::deserialize(&data[INTERNODE_MAGIC.len()..])
        .map_err(|e| WireError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_set::AccType;

    fn sample(values: &[(i64, i64)]) -> ResultSet {
        let mut set = ResultSet::new(2);
        set.set_acc_types(&[AccType::Sum, AccType::Max]);
        for &(key, v) in values {
            set.accumulate(&[key], 0, v);
            set.accumulate(&[key], 1, v);
        }
        set
    }

    #[test]
    fn round_trip_equals_direct_merge() {
        let a = sample(&[(1, 10), (2, 5)]);
        let b = sample(&[(1, 3), (3, 8)]);

        let wire = multi_set_to_internode(2, &[a.clone(), b.clone()]).unwrap();
        assert!(is_internode(&wire));

        let decoded = internode_to_result_set(&wire).unwrap();
        let direct = ResultSet::merge_sets(2, &[a, b]);

        let mut decoded_rows: Vec<_> = decoded.rows().collect();
        let mut direct_rows: Vec<_> = direct.rows().collect();
        decoded_rows.sort_by(|x, y| x.0.cmp(y.0));
        direct_rows.sort_by(|x, y| x.0.cmp(y.0));
        assert_eq!(decoded_rows, direct_rows);
    }

    #[test]
    fn empty_merge_is_well_formed() {
        let wire = multi_set_to_internode(3, &[ResultSet::new(3), ResultSet::new(3)]).unwrap();
        assert!(is_internode(&wire));
        let decoded = internode_to_result_set(&wire).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.column_count(), 3);
    }

    #[test]
    fn json_bodies_are_not_internode() {
        assert!(!is_internode(br#"{"error":{"class":"query"}}"#));
        assert!(!is_internode(b""));
        let err = internode_to_result_set(b"{}").unwrap_err();
        assert!(matches!(err, WireError::NotInternode));
    }
}
