use std::collections::BTreeMap;

use crate::firestore::model::{DocumentKey, FieldPath, Timestamp};
use crate::firestore::value::{FirestoreValue, MapValue};

use super::connection::FirestoreConnection;
use super::reference::DocumentReference;

/// A document read from the store. `data` is `None` when the document is missing.
///
/// Stores that track them also report when the document was created, last
/// updated and read.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    key: DocumentKey,
    data: Option<MapValue>,
    create_time: Option<Timestamp>,
    update_time: Option<Timestamp>,
    read_time: Option<Timestamp>,
}

impl DocumentSnapshot {
    pub fn new(key: DocumentKey, data: Option<MapValue>) -> Self {
        Self {
            key,
            data,
            create_time: None,
            update_time: None,
            read_time: None,
        }
    }

    pub fn with_write_times(
        mut self,
        create_time: Option<Timestamp>,
        update_time: Option<Timestamp>,
    ) -> Self {
        self.create_time = create_time;
        self.update_time = update_time;
        self
    }

    pub fn with_read_time(mut self, read_time: Option<Timestamp>) -> Self {
        self.read_time = read_time;
        self
    }

    /// Same document and times, different fields.
    pub(crate) fn with_data(mut self, data: MapValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn missing(key: DocumentKey) -> Self {
        Self::new(key, None)
    }

    /// Returns whether the document exists in the store.
    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&BTreeMap<String, FirestoreValue>> {
        self.data.as_ref().map(|map| map.fields())
    }

    pub fn map_value(&self) -> Option<&MapValue> {
        self.data.as_ref()
    }

    pub fn into_map_value(self) -> Option<MapValue> {
        self.data
    }

    /// Reads a dot-separated field; `__name__` yields the document reference.
    pub fn get(&self, field: &str) -> Option<FirestoreValue> {
        let path = FieldPath::from_dot_separated(field).ok()?;
        self.field(&path)
    }

    pub fn field(&self, path: &FieldPath) -> Option<FirestoreValue> {
        if path.is_document_id() {
            return Some(FirestoreValue::from_reference(self.path()));
        }
        self.data.as_ref()?.get(path).cloned()
    }

    /// Only the listed dot-separated fields, nested ones kept at their path.
    /// Unknown fields are skipped.
    pub fn only(&self, fields: &[&str]) -> MapValue {
        let mut selected = MapValue::default();
        for field in fields {
            let Ok(path) = FieldPath::from_dot_separated(field) else {
                continue;
            };
            if let Some(value) = self.data.as_ref().and_then(|data| data.get(&path)) {
                selected.set(&path, value.clone());
            }
        }
        selected
    }

    /// Every field except the listed dot-separated ones.
    pub fn except(&self, fields: &[&str]) -> MapValue {
        let mut remaining = self.data.clone().unwrap_or_default();
        for field in fields {
            if let Ok(path) = FieldPath::from_dot_separated(field) {
                remaining.remove(&path);
            }
        }
        remaining
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }

    pub fn read_time(&self) -> Option<Timestamp> {
        self.read_time
    }

    pub fn document_key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn path(&self) -> String {
        self.key.path().canonical_string()
    }

    pub fn reference(&self, connection: &FirestoreConnection) -> DocumentReference {
        DocumentReference::new(self.key.clone(), connection.datastore())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_existence() {
        let key = DocumentKey::from_string("users/alice").unwrap();
        let snapshot = DocumentSnapshot::missing(key);
        assert!(!snapshot.exists());
        assert_eq!(snapshot.get("age"), None);
    }

    #[test]
    fn name_field_is_the_document_path() {
        let key = DocumentKey::from_string("users/alice").unwrap();
        let snapshot = DocumentSnapshot::new(key, Some(MapValue::default()));
        assert_eq!(
            snapshot.get("__name__"),
            Some(FirestoreValue::from_reference("users/alice"))
        );
    }

    fn profile() -> DocumentSnapshot {
        let address = FirestoreValue::from_map(BTreeMap::from([
            ("city".to_string(), FirestoreValue::from_string("Oslo")),
            ("zip".to_string(), FirestoreValue::from_string("0150")),
        ]));
        let data = MapValue::new(BTreeMap::from([
            ("name".to_string(), FirestoreValue::from_string("Alice")),
            ("age".to_string(), FirestoreValue::from_integer(30)),
            ("address".to_string(), address),
        ]));
        DocumentSnapshot::new(DocumentKey::from_string("users/alice").unwrap(), Some(data))
    }

    #[test]
    fn only_keeps_listed_fields() {
        let picked = profile().only(&["name", "address.city", "missing"]);
        let keys: Vec<&str> = picked.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["address", "name"]);
        let city = FieldPath::from_dot_separated("address.city").unwrap();
        assert_eq!(picked.get(&city), Some(&FirestoreValue::from_string("Oslo")));
        let zip = FieldPath::from_dot_separated("address.zip").unwrap();
        assert_eq!(picked.get(&zip), None);
    }

    #[test]
    fn except_drops_listed_fields() {
        let rest = profile().except(&["age", "address.zip"]);
        assert!(!rest.fields().contains_key("age"));
        assert!(rest.fields().contains_key("name"));
        let zip = FieldPath::from_dot_separated("address.zip").unwrap();
        assert_eq!(rest.get(&zip), None);

        let missing = DocumentSnapshot::missing(DocumentKey::from_string("users/x").unwrap());
        assert!(missing.except(&["age"]).is_empty());
        assert!(missing.only(&["age"]).is_empty());
    }

    #[test]
    fn carries_store_times() {
        let created = Timestamp::new(100, 0);
        let updated = Timestamp::new(200, 5);
        let read = Timestamp::new(300, 0);
        let snapshot = profile()
            .with_write_times(Some(created), Some(updated))
            .with_read_time(Some(read));
        assert_eq!(snapshot.create_time(), Some(created));
        assert_eq!(snapshot.update_time(), Some(updated));
        assert_eq!(snapshot.read_time(), Some(read));

        let projected = snapshot.with_data(MapValue::default());
        assert_eq!(projected.update_time(), Some(updated));
        assert_eq!(profile().create_time(), None);
    }
}
