use std::collections::BTreeMap;

use crate::firestore::model::FieldPath;
use crate::firestore::value::{FirestoreValue, ValueKind};

#[derive(Clone, Debug, PartialEq, Default)]
pub struct MapValue {
    fields: BTreeMap<String, FirestoreValue>,
}

impl MapValue {
    pub fn new(fields: BTreeMap<String, FirestoreValue>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, FirestoreValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FirestoreValue> {
        self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Resolves a possibly nested field.
    pub fn get(&self, path: &FieldPath) -> Option<&FirestoreValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = self.fields.get(first)?;
        for segment in rest {
            match current.kind() {
                ValueKind::Map(child) => current = child.fields.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }

    /// Writes `value` at `path`, replacing non-map intermediates with maps.
    pub fn set(&mut self, path: &FieldPath, value: FirestoreValue) {
        set_in(&mut self.fields, path.segments(), value);
    }

    /// Removes the field at `path`, returning whether anything was removed.
    pub fn remove(&mut self, path: &FieldPath) -> bool {
        remove_in(&mut self.fields, path.segments())
    }
}

fn set_in(fields: &mut BTreeMap<String, FirestoreValue>, segments: &[String], value: FirestoreValue) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        fields.insert(first.clone(), value);
        return;
    }
    let mut child = match fields.remove(first).map(|existing| existing.kind().clone()) {
        Some(ValueKind::Map(map)) => map.into_fields(),
        _ => BTreeMap::new(),
    };
    set_in(&mut child, rest, value);
    fields.insert(first.clone(), FirestoreValue::from_map(child));
}

fn remove_in(fields: &mut BTreeMap<String, FirestoreValue>, segments: &[String]) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return false;
    };
    if rest.is_empty() {
        return fields.remove(first).is_some();
    }
    let Some(existing) = fields.get(first) else {
        return false;
    };
    let ValueKind::Map(map) = existing.kind() else {
        return false;
    };
    let mut child = map.fields().clone();
    let removed = remove_in(&mut child, rest);
    if removed {
        fields.insert(first.clone(), FirestoreValue::from_map(child));
    }
    removed
}
