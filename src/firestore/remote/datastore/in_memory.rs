use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::{already_exists, internal_error, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath, Timestamp};
use crate::firestore::mutation::{FieldTransform, TransformOperation};
use crate::firestore::query::NativeQuery;
use crate::firestore::query_evaluator::apply_query_to_documents;
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};

use super::{Datastore, WriteOperation};

type DocumentTable = BTreeMap<ResourcePath, StoredDocument>;

#[derive(Clone)]
struct StoredDocument {
    fields: MapValue,
    create_time: Timestamp,
    update_time: Timestamp,
}

impl StoredDocument {
    fn snapshot(&self, key: DocumentKey, read_time: Timestamp) -> DocumentSnapshot {
        DocumentSnapshot::new(key, Some(self.fields.clone()))
            .with_write_times(Some(self.create_time), Some(self.update_time))
            .with_read_time(Some(read_time))
    }
}

/// Process-local store with the same query and commit semantics as the remote one.
///
/// Clones share the same documents.
#[derive(Clone, Default)]
pub struct InMemoryDatastore {
    documents: Arc<Mutex<DocumentTable>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> FirestoreResult<MutexGuard<'_, DocumentTable>> {
        self.documents
            .lock()
            .map_err(|_| internal_error("In-memory datastore lock poisoned"))
    }

    /// Number of stored documents, across every collection.
    pub fn len(&self) -> usize {
        self.table().map(|table| table.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored document path, in path order.
    pub fn paths(&self) -> Vec<String> {
        self.table()
            .map(|table| table.keys().map(ResourcePath::canonical_string).collect())
            .unwrap_or_default()
    }
}

/// Applies one write stamped with the commit time. A set keeps the creation
/// time of the document it replaces.
fn apply_write(
    table: &mut DocumentTable,
    write: WriteOperation,
    commit_time: Timestamp,
) -> FirestoreResult<()> {
    match write {
        WriteOperation::Create {
            key,
            data,
            transforms,
        } => {
            if table.contains_key(key.path()) {
                return Err(already_exists(format!(
                    "Document already exists: {}",
                    key.path()
                )));
            }
            let fields = apply_transforms(data, &transforms);
            table.insert(
                key.path().clone(),
                StoredDocument {
                    fields,
                    create_time: commit_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Set {
            key,
            data,
            mask,
            transforms,
        } => {
            let existing = table.get(key.path());
            let create_time = existing.map_or(commit_time, |stored| stored.create_time);
            let next = match mask {
                Some(mask) => {
                    let mut fields = existing.map(|stored| stored.fields.clone()).unwrap_or_default();
                    for path in &mask {
                        match data.get(path) {
                            Some(value) => fields.set(path, value.clone()),
                            None => {
                                fields.remove(path);
                            }
                        }
                    }
                    fields
                }
                None => data,
            };
            let fields = apply_transforms(next, &transforms);
            table.insert(
                key.path().clone(),
                StoredDocument {
                    fields,
                    create_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOperation::Delete { key } => {
            table.remove(key.path());
        }
    }
    Ok(())
}

fn apply_transforms(mut fields: MapValue, transforms: &[FieldTransform]) -> MapValue {
    for transform in transforms {
        match transform.operation() {
            TransformOperation::NumericIncrement(operand) => {
                let current = fields.get(transform.field_path()).cloned();
                fields.set(transform.field_path(), increment(current, operand));
            }
        }
    }
    fields
}

/// Integer plus integer stays integral unless it overflows; any double widens.
/// A missing or non-numeric field is replaced by the operand.
fn increment(current: Option<FirestoreValue>, operand: &FirestoreValue) -> FirestoreValue {
    let Some(current) = current.filter(FirestoreValue::is_numeric) else {
        return operand.clone();
    };
    match (current.kind(), operand.kind()) {
        (ValueKind::Integer(a), ValueKind::Integer(b)) => match a.checked_add(*b) {
            Some(sum) => FirestoreValue::from_integer(sum),
            None => FirestoreValue::from_double(*a as f64 + *b as f64),
        },
        _ => FirestoreValue::from_double(
            current.as_f64().unwrap_or_default() + operand.as_f64().unwrap_or_default(),
        ),
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        let table = self.table()?;
        let read_time = Timestamp::now();
        Ok(match table.get(key.path()) {
            Some(stored) => stored.snapshot(key.clone(), read_time),
            None => DocumentSnapshot::missing(key.clone()).with_read_time(Some(read_time)),
        })
    }

    async fn run_query(&self, query: &NativeQuery) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let candidates = {
            let table = self.table()?;
            let read_time = Timestamp::now();
            table
                .iter()
                .filter(|(path, _)| path.is_document())
                .filter_map(|(path, stored)| {
                    let key = DocumentKey::from_path(path.clone()).ok()?;
                    query
                        .source()
                        .matches(&key)
                        .then(|| stored.snapshot(key, read_time))
                })
                .collect::<Vec<_>>()
        };
        Ok(apply_query_to_documents(candidates, query))
    }

    async fn list_collection_ids(&self, parent: &DocumentKey) -> FirestoreResult<Vec<String>> {
        let table = self.table()?;
        let depth = parent.path().len();
        let ids: BTreeSet<String> = table
            .keys()
            .filter(|path| parent.path().is_ancestor_of(path))
            .filter_map(|path| path.segment(depth).map(str::to_string))
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        let mut table = self.table()?;
        let mut staged = table.clone();
        let commit_time = Timestamp::now();
        for write in writes {
            apply_write(&mut staged, write, commit_time)?;
        }
        *table = staged;
        Ok(())
    }
}
