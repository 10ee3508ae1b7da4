use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Number, Value as JsonValue};

use crate::firestore::model::Timestamp;
use crate::firestore::value::{ArrayValue, BytesValue, MapValue};

#[derive(Clone, Debug, PartialEq)]
pub struct FirestoreValue {
    kind: ValueKind,
}

/// Write-only markers that the store resolves server-side.
#[derive(Clone, Debug, PartialEq)]
pub enum SentinelValue {
    /// Adds the operand to the stored numeric field.
    NumericIncrement(Box<FirestoreValue>),
    /// Removes the field from the stored document; distinct from writing `null`.
    DeleteField,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ValueKind {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Timestamp(Timestamp),
    String(String),
    Bytes(BytesValue),
    Reference(String),
    Array(ArrayValue),
    Map(MapValue),
    Sentinel(SentinelValue),
}

impl FirestoreValue {
    pub fn null() -> Self {
        Self {
            kind: ValueKind::Null,
        }
    }

    pub fn from_bool(value: bool) -> Self {
        Self {
            kind: ValueKind::Boolean(value),
        }
    }

    pub fn from_integer(value: i64) -> Self {
        Self {
            kind: ValueKind::Integer(value),
        }
    }

    pub fn from_double(value: f64) -> Self {
        Self {
            kind: ValueKind::Double(value),
        }
    }

    pub fn from_timestamp(value: Timestamp) -> Self {
        Self {
            kind: ValueKind::Timestamp(value),
        }
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::String(value.into()),
        }
    }

    pub fn from_bytes(value: BytesValue) -> Self {
        Self {
            kind: ValueKind::Bytes(value),
        }
    }

    /// A reference to a document, stored as its path relative to the database root.
    pub fn from_reference(path: impl Into<String>) -> Self {
        Self {
            kind: ValueKind::Reference(path.into()),
        }
    }

    pub fn from_array(values: Vec<FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Array(ArrayValue::new(values)),
        }
    }

    pub fn from_map(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self {
            kind: ValueKind::Map(MapValue::new(map)),
        }
    }

    /// Sentinel that increments the targeted numeric field by `operand`.
    pub fn numeric_increment(operand: FirestoreValue) -> Self {
        Self {
            kind: ValueKind::Sentinel(SentinelValue::NumericIncrement(Box::new(operand))),
        }
    }

    /// Sentinel that removes the targeted field. Only valid inside merge writes.
    pub fn delete_field() -> Self {
        Self {
            kind: ValueKind::Sentinel(SentinelValue::DeleteField),
        }
    }

    pub fn kind(&self) -> &ValueKind {
        &self.kind
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, ValueKind::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, ValueKind::Integer(_) | ValueKind::Double(_))
    }

    pub fn is_sentinel(&self) -> bool {
        matches!(self.kind, ValueKind::Sentinel(_))
    }

    pub fn is_delete_field(&self) -> bool {
        matches!(self.kind, ValueKind::Sentinel(SentinelValue::DeleteField))
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value as f64),
            ValueKind::Double(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.kind {
            ValueKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ValueKind::String(value) | ValueKind::Reference(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&MapValue> {
        match &self.kind {
            ValueKind::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match &self.kind {
            ValueKind::Array(array) => Some(array),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self.kind {
            ValueKind::Null => 0,
            ValueKind::Boolean(_) => 1,
            ValueKind::Integer(_) | ValueKind::Double(_) => 2,
            ValueKind::Timestamp(_) => 3,
            ValueKind::String(_) => 4,
            ValueKind::Bytes(_) => 5,
            ValueKind::Reference(_) => 6,
            ValueKind::Array(_) => 7,
            ValueKind::Map(_) => 8,
            ValueKind::Sentinel(_) => 9,
        }
    }

    /// Total order across value types following the store's index ordering:
    /// null, booleans, numbers, timestamps, strings, bytes, references, arrays, maps.
    pub fn compare(&self, other: &FirestoreValue) -> Ordering {
        match (&self.kind, &other.kind) {
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a.cmp(b),
            (ValueKind::Integer(a), ValueKind::Integer(b)) => a.cmp(b),
            (ValueKind::Integer(_) | ValueKind::Double(_), ValueKind::Integer(_) | ValueKind::Double(_)) => {
                let left = self.as_f64().unwrap_or_default();
                let right = other.as_f64().unwrap_or_default();
                left.total_cmp(&right)
            }
            (ValueKind::Timestamp(a), ValueKind::Timestamp(b)) => a.cmp(b),
            (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
            (ValueKind::Bytes(a), ValueKind::Bytes(b)) => a.as_slice().cmp(b.as_slice()),
            (ValueKind::Reference(a), ValueKind::Reference(b)) => a
                .split('/')
                .cmp(b.split('/')),
            (ValueKind::Array(a), ValueKind::Array(b)) => {
                for (left, right) in a.values().iter().zip(b.values()) {
                    match left.compare(right) {
                        Ordering::Equal => continue,
                        ordering => return ordering,
                    }
                }
                a.values().len().cmp(&b.values().len())
            }
            (ValueKind::Map(a), ValueKind::Map(b)) => {
                for ((lk, lv), (rk, rv)) in a.fields().iter().zip(b.fields()) {
                    match lk.cmp(rk).then_with(|| lv.compare(rv)) {
                        Ordering::Equal => continue,
                        ordering => return ordering,
                    }
                }
                a.fields().len().cmp(&b.fields().len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality as the store evaluates it: `1` equals `1.0`.
    pub fn store_equals(&self, other: &FirestoreValue) -> bool {
        self.type_rank() == other.type_rank() && self.compare(other) == Ordering::Equal
    }

    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::null(),
            JsonValue::Bool(value) => Self::from_bool(*value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(integer) => Self::from_integer(integer),
                None => Self::from_double(number.as_f64().unwrap_or_default()),
            },
            JsonValue::String(value) => Self::from_string(value.clone()),
            JsonValue::Array(values) => Self::from_array(values.iter().map(Self::from_json).collect()),
            JsonValue::Object(map) => Self::from_map(
                map.iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON view of the value. Timestamps become RFC 3339 strings, bytes
    /// become base64 and sentinels collapse to `null`.
    pub fn to_json(&self) -> JsonValue {
        match &self.kind {
            ValueKind::Null | ValueKind::Sentinel(_) => JsonValue::Null,
            ValueKind::Boolean(value) => JsonValue::Bool(*value),
            ValueKind::Integer(value) => JsonValue::Number((*value).into()),
            ValueKind::Double(value) => Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            ValueKind::Timestamp(value) => JsonValue::String(value.to_rfc3339()),
            ValueKind::String(value) | ValueKind::Reference(value) => {
                JsonValue::String(value.clone())
            }
            ValueKind::Bytes(bytes) => JsonValue::String(bytes.to_base64()),
            ValueKind::Array(array) => {
                JsonValue::Array(array.values().iter().map(FirestoreValue::to_json).collect())
            }
            ValueKind::Map(map) => JsonValue::Object(
                map.fields()
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for FirestoreValue {
    fn from(value: bool) -> Self {
        Self::from_bool(value)
    }
}

impl From<i64> for FirestoreValue {
    fn from(value: i64) -> Self {
        Self::from_integer(value)
    }
}

impl From<i32> for FirestoreValue {
    fn from(value: i32) -> Self {
        Self::from_integer(value as i64)
    }
}

impl From<u32> for FirestoreValue {
    fn from(value: u32) -> Self {
        Self::from_integer(value as i64)
    }
}

impl From<f64> for FirestoreValue {
    fn from(value: f64) -> Self {
        Self::from_double(value)
    }
}

impl From<&str> for FirestoreValue {
    fn from(value: &str) -> Self {
        Self::from_string(value)
    }
}

impl From<String> for FirestoreValue {
    fn from(value: String) -> Self {
        Self::from_string(value)
    }
}

impl From<Timestamp> for FirestoreValue {
    fn from(value: Timestamp) -> Self {
        Self::from_timestamp(value)
    }
}

impl From<DateTime<Utc>> for FirestoreValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_timestamp(Timestamp::from_datetime(&value))
    }
}

impl From<JsonValue> for FirestoreValue {
    fn from(value: JsonValue) -> Self {
        Self::from_json(&value)
    }
}

impl<T: Into<FirestoreValue>> From<Vec<T>> for FirestoreValue {
    fn from(values: Vec<T>) -> Self {
        Self::from_array(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FirestoreValue>> From<Option<T>> for FirestoreValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_else(Self::null)
    }
}

impl From<BTreeMap<String, FirestoreValue>> for FirestoreValue {
    fn from(map: BTreeMap<String, FirestoreValue>) -> Self {
        Self::from_map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delete_field_is_distinct_from_null() {
        let delete = FirestoreValue::delete_field();
        assert!(delete.is_delete_field());
        assert_ne!(delete, FirestoreValue::null());
        assert!(!FirestoreValue::null().is_delete_field());
    }

    #[test]
    fn numbers_compare_across_representations() {
        let int = FirestoreValue::from_integer(2);
        let double = FirestoreValue::from_double(2.0);
        assert!(int.store_equals(&double));
        assert_eq!(
            FirestoreValue::from_integer(1).compare(&FirestoreValue::from_double(1.5)),
            Ordering::Less
        );
    }

    #[test]
    fn type_order_puts_null_first() {
        let null = FirestoreValue::null();
        let text = FirestoreValue::from_string("a");
        assert_eq!(null.compare(&text), Ordering::Less);
        assert_eq!(text.compare(&FirestoreValue::from_integer(9)), Ordering::Greater);
    }

    #[test]
    fn json_conversion_keeps_integers() {
        let value = FirestoreValue::from_json(&json!({"age": 30, "score": 1.5, "tags": ["a"]}));
        let map = value.as_map().unwrap();
        assert_eq!(map.fields()["age"].as_i64(), Some(30));
        assert_eq!(map.fields()["score"].as_f64(), Some(1.5));
        assert_eq!(value.to_json(), json!({"age": 30, "score": 1.5, "tags": ["a"]}));
    }
}
