use std::collections::BTreeMap;

use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

/// Computes the merge payload that turns an original document into its
/// current state.
///
/// Changed and added leaves are copied from the current value, leaves that
/// disappeared become `delete_field()` markers. A nested map whose children are
/// all being deleted collapses into a single marker, except for top-level
/// fields. Arrays compare as whole values.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirtyFieldDiffer {
    loose: bool,
}

impl DirtyFieldDiffer {
    /// Values must have the same type to compare equal. Two doubles are
    /// compared through their string form.
    pub fn strict() -> Self {
        Self { loose: false }
    }

    /// Numbers and strings compare by their string form whenever either side
    /// is a double, so `1` and `1.0` are not reported as a change.
    pub fn loose() -> Self {
        Self { loose: true }
    }

    pub fn diff(&self, original: &MapValue, current: &MapValue) -> MapValue {
        MapValue::new(self.diff_fields(original.fields(), current.fields(), 0))
    }

    pub fn is_dirty(&self, original: &MapValue, current: &MapValue) -> bool {
        !self.diff(original, current).is_empty()
    }

    fn diff_fields(
        &self,
        original: &BTreeMap<String, FirestoreValue>,
        current: &BTreeMap<String, FirestoreValue>,
        depth: usize,
    ) -> BTreeMap<String, FirestoreValue> {
        let mut changes = BTreeMap::new();

        for (key, value) in current {
            let Some(previous) = original.get(key) else {
                changes.insert(key.clone(), value.clone());
                continue;
            };
            match (previous.kind(), value.kind()) {
                (ValueKind::Map(before), ValueKind::Map(after)) if !before.is_empty() => {
                    let nested = self.diff_fields(before.fields(), after.fields(), depth + 1);
                    if nested.is_empty() {
                        continue;
                    }
                    let collapse = depth > 0
                        && nested.len() == before.fields().len()
                        && nested.values().all(FirestoreValue::is_delete_field);
                    let change = if collapse {
                        FirestoreValue::delete_field()
                    } else {
                        FirestoreValue::from_map(nested)
                    };
                    changes.insert(key.clone(), change);
                }
                _ => {
                    if !self.same_value(previous, value) {
                        changes.insert(key.clone(), value.clone());
                    }
                }
            }
        }

        for key in original.keys() {
            if !current.contains_key(key) {
                changes.insert(key.clone(), FirestoreValue::delete_field());
            }
        }

        changes
    }

    fn same_value(&self, left: &FirestoreValue, right: &FirestoreValue) -> bool {
        let left_double = matches!(left.kind(), ValueKind::Double(_));
        let right_double = matches!(right.kind(), ValueKind::Double(_));
        let coerce = if self.loose {
            left_double || right_double
        } else {
            left_double && right_double
        };

        if coerce {
            if let (Some(left), Some(right)) = (scalar_text(left), scalar_text(right)) {
                return left == right;
            }
        }

        if self.loose {
            left.store_equals(right)
        } else {
            left == right
        }
    }
}

fn scalar_text(value: &FirestoreValue) -> Option<String> {
    match value.kind() {
        ValueKind::Integer(value) => Some(value.to_string()),
        ValueKind::Double(value) => Some(value.to_string()),
        ValueKind::String(value) => Some(value.clone()),
        ValueKind::Boolean(value) => Some(if *value { "1" } else { "" }.to_string()),
        ValueKind::Null => Some(String::new()),
        _ => None,
    }
}
