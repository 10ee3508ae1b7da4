use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

use crate::firestore::error::{invalid_argument, invalid_document_scope, FirestoreResult};
use crate::firestore::model::{DocumentKey, ResourcePath};
use crate::firestore::mutation::RecursiveDeleter;
use crate::firestore::query::NativeQuery;
use crate::firestore::remote::datastore::{Datastore, WriteOperation};

use super::snapshot::DocumentSnapshot;

const AUTO_ID_LENGTH: usize = 20;

/// Handle on a single document path. Holds no cached data.
#[derive(Clone)]
pub struct DocumentReference {
    key: DocumentKey,
    datastore: Arc<dyn Datastore>,
}

impl DocumentReference {
    pub fn new(key: DocumentKey, datastore: Arc<dyn Datastore>) -> Self {
        Self { key, datastore }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    /// Slash-separated path relative to the database root, e.g. `users/ann`.
    pub fn path(&self) -> String {
        self.key.path().canonical_string()
    }

    pub fn parent(&self) -> CollectionReference {
        CollectionReference {
            path: self.key.collection_path(),
            datastore: Arc::clone(&self.datastore),
        }
    }

    pub fn collection(&self, collection_id: &str) -> FirestoreResult<CollectionReference> {
        if collection_id.is_empty() || collection_id.contains('/') {
            return Err(invalid_argument(format!(
                "Invalid collection id '{collection_id}'"
            )));
        }
        Ok(CollectionReference {
            path: self.key.child_collection(collection_id),
            datastore: Arc::clone(&self.datastore),
        })
    }

    pub async fn snapshot(&self) -> FirestoreResult<DocumentSnapshot> {
        self.datastore.get_document(&self.key).await
    }

    /// Immediate subcollections of this document.
    pub async fn collections(&self) -> FirestoreResult<Vec<CollectionReference>> {
        let ids = self.datastore.list_collection_ids(&self.key).await?;
        Ok(ids
            .into_iter()
            .map(|id| CollectionReference {
                path: self.key.child_collection(&id),
                datastore: Arc::clone(&self.datastore),
            })
            .collect())
    }

    /// Deletes this document only; subcollections are left in place.
    pub async fn delete(&self) -> FirestoreResult<()> {
        self.datastore
            .commit(vec![WriteOperation::Delete {
                key: self.key.clone(),
            }])
            .await
    }

    /// Deletes this document and everything beneath it.
    pub async fn delete_recursive(&self, batch_size: u32) -> FirestoreResult<usize> {
        RecursiveDeleter::new(Arc::clone(&self.datastore))
            .with_batch_size(batch_size)
            .delete_document(&self.key)
            .await
    }
}

impl Debug for DocumentReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentReference")
            .field("path", &self.path())
            .finish()
    }
}

impl PartialEq for DocumentReference {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

#[derive(Clone)]
pub struct CollectionReference {
    path: ResourcePath,
    datastore: Arc<dyn Datastore>,
}

impl CollectionReference {
    pub fn new(path: ResourcePath, datastore: Arc<dyn Datastore>) -> FirestoreResult<Self> {
        if !path.is_collection() {
            return Err(invalid_argument(format!(
                "'{path}' is not a collection path (odd number of segments expected)"
            )));
        }
        Ok(Self { path, datastore })
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn id(&self) -> &str {
        self.path.last_segment().unwrap_or_default()
    }

    /// The document that contains this collection, if it is nested.
    pub fn parent(&self) -> Option<DocumentReference> {
        if !self.path.is_nested() {
            return None;
        }
        let key = DocumentKey::from_path(self.path.without_last()).ok()?;
        Some(DocumentReference::new(key, Arc::clone(&self.datastore)))
    }

    /// Reference to `document_id`, or to a random 20-character id when `None`.
    pub fn doc(&self, document_id: Option<&str>) -> FirestoreResult<DocumentReference> {
        let id = match document_id {
            Some(id) if !id.is_empty() && !id.contains('/') => id.to_string(),
            Some(id) => {
                return Err(invalid_argument(format!("Invalid document id '{id}'")));
            }
            None => thread_rng()
                .sample_iter(&Alphanumeric)
                .take(AUTO_ID_LENGTH)
                .map(char::from)
                .collect(),
        };
        let key = DocumentKey::from_path(self.path.child([id]))?;
        Ok(DocumentReference::new(key, Arc::clone(&self.datastore)))
    }

    /// Every document of the collection, in document-id order.
    pub async fn documents(&self) -> FirestoreResult<Vec<DocumentSnapshot>> {
        let query = NativeQuery::collection(self.path.clone())?;
        self.datastore.run_query(&query).await
    }
}

impl Debug for CollectionReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionReference")
            .field("path", &self.path.canonical_string())
            .finish()
    }
}

/// Anything that names a document: a path, a reference, a snapshot or a
/// persisted model's path.
#[derive(Clone, Debug)]
pub enum DocumentScope {
    Path(String),
    Reference(DocumentReference),
    Snapshot(DocumentSnapshot),
    /// A model's document path, `None` when it has not been saved yet.
    Model(Option<String>),
}

impl DocumentScope {
    /// Normalizes the scope to a document path.
    pub fn resolve(&self) -> FirestoreResult<String> {
        match self {
            DocumentScope::Path(path) => {
                let path = ResourcePath::from_string(path)
                    .map_err(|_| invalid_document_scope(format!("Invalid document reference [{path}]")))?;
                if !path.is_document() {
                    return Err(invalid_document_scope(format!(
                        "Invalid document reference [{path}]"
                    )));
                }
                Ok(path.canonical_string())
            }
            DocumentScope::Reference(reference) => Ok(reference.path()),
            DocumentScope::Snapshot(snapshot) => Ok(snapshot.path()),
            DocumentScope::Model(Some(path)) => DocumentScope::Path(path.clone()).resolve(),
            DocumentScope::Model(None) => Err(invalid_document_scope(
                "The model has no document yet, save it before using it as a scope",
            )),
        }
    }
}

impl From<&str> for DocumentScope {
    fn from(path: &str) -> Self {
        DocumentScope::Path(path.to_string())
    }
}

impl From<String> for DocumentScope {
    fn from(path: String) -> Self {
        DocumentScope::Path(path)
    }
}

impl From<DocumentReference> for DocumentScope {
    fn from(reference: DocumentReference) -> Self {
        DocumentScope::Reference(reference)
    }
}

impl From<&DocumentReference> for DocumentScope {
    fn from(reference: &DocumentReference) -> Self {
        DocumentScope::Reference(reference.clone())
    }
}

impl From<DocumentSnapshot> for DocumentScope {
    fn from(snapshot: DocumentSnapshot) -> Self {
        DocumentScope::Snapshot(snapshot)
    }
}

impl From<&DocumentSnapshot> for DocumentScope {
    fn from(snapshot: &DocumentSnapshot) -> Self {
        DocumentScope::Snapshot(snapshot.clone())
    }
}
