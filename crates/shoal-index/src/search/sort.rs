//! In-memory ordering of candidates by stored field values.

use std::cmp::Ordering;

use serde_json::Value;
use shoal_query::SortField;

use super::Candidate;
use crate::document::lookup_path;

/// A comparable view of a JSON scalar.
///
/// Values of different kinds order booleans first, then numbers, then strings.
#[derive(Debug, Clone, Copy, PartialEq)]
enum SortValue<'a> {
    Bool(bool),
    Number(f64),
    Text(&'a str),
}

impl<'a> SortValue<'a> {
    /// Extracts a sortable value; arrays sort by their first element.
    fn from_json(value: &'a Value) -> Option<Self> {
        match value {
            Value::Bool(flag) => Some(Self::Bool(*flag)),
            Value::Number(number) => number.as_f64().map(Self::Number),
            Value::String(text) => Some(Self::Text(text)),
            Value::Array(items) => items.first().and_then(Self::from_json),
            Value::Null | Value::Object(_) => None,
        }
    }

    /// Orders values of different kinds.
    fn rank(self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
        }
    }

    /// Compares two present values.
    fn cmp(self, other: Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(&b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(&b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// Sorts candidates by the keys in priority order.
///
/// Missing values sort last in either direction. Remaining ties go to the
/// higher score.
pub(crate) fn sort_candidates(candidates: &mut [Candidate], keys: &[SortField]) {
    candidates.sort_by(|a, b| {
        keys.iter()
            .map(|key| {
                let left = lookup_path(&a.stored.source, &key.field).and_then(SortValue::from_json);
                let right = lookup_path(&b.stored.source, &key.field).and_then(SortValue::from_json);
                compare(left, right, key.ascending)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| b.score.total_cmp(&a.score))
    });
}

/// Compares sort values, placing missing ones last.
fn compare(left: Option<SortValue<'_>>, right: Option<SortValue<'_>>, ascending: bool) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) if ascending => a.cmp(b),
        (Some(a), Some(b)) => b.cmp(a),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_sorts_last_both_ways() {
        let present = Some(SortValue::Number(1.0));
        assert_eq!(compare(None, present, true), Ordering::Greater);
        assert_eq!(compare(None, present, false), Ordering::Greater);
        assert_eq!(compare(present, None, false), Ordering::Less);
    }

    #[test]
    fn descending_reverses_values() {
        let a = Some(SortValue::Text("a"));
        let b = Some(SortValue::Text("b"));
        assert_eq!(compare(a, b, true), Ordering::Less);
        assert_eq!(compare(a, b, false), Ordering::Greater);
    }

    #[test]
    fn mixed_kinds_order_by_rank() {
        assert_eq!(
            SortValue::Number(100.0).cmp(SortValue::Text("0")),
            Ordering::Less
        );
        assert_eq!(
            SortValue::Bool(true).cmp(SortValue::Number(-1.0)),
            Ordering::Less
        );
    }

    #[test]
    fn arrays_use_first_element() {
        let value = json!([3, 1]);
        assert_eq!(SortValue::from_json(&value), Some(SortValue::Number(3.0)));
        assert_eq!(SortValue::from_json(&json!(null)), None);
        assert_eq!(SortValue::from_json(&json!({"a": 1})), None);
    }
}
