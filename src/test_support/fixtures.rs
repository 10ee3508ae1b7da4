use std::sync::Arc;

use crate::firestore::api::FirestoreConnection;
use crate::firestore::model::DatabaseId;
use crate::firestore::remote::datastore::Datastore;
use crate::firestore::value::{FirestoreValue, MapValue};

pub fn record(entries: Vec<(&str, FirestoreValue)>) -> MapValue {
    MapValue::new(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
    )
}

/// Connection for project `demo` on top of the given store.
pub fn connection_with(datastore: Arc<dyn Datastore>) -> FirestoreConnection {
    FirestoreConnection::new(DatabaseId::default("demo"), datastore)
}

/// Four users with stable ids, ages 17, 25, 30 and 42.
pub fn users_fixture() -> Vec<MapValue> {
    [("ann", 30, "admin"), ("bob", 17, "user"), ("cid", 42, "owner"), ("dee", 25, "user")]
        .into_iter()
        .map(|(id, age, role)| {
            record(vec![
                ("__name__", id.into()),
                ("name", id.into()),
                ("age", age.into()),
                ("role", role.into()),
            ])
        })
        .collect()
}
