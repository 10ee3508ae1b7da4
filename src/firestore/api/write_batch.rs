use std::sync::Arc;

use crate::firestore::constants::MAX_BATCH_WRITES;
use crate::firestore::error::{resource_exhausted, FirestoreResult};
use crate::firestore::mutation::{encode_create_data, encode_set_data, SetOptions};
use crate::firestore::remote::datastore::{Datastore, WriteOperation};
use crate::firestore::value::MapValue;

use super::reference::DocumentReference;

/// Collects writes and commits them in one atomic request.
#[derive(Clone)]
pub struct WriteBatch {
    datastore: Arc<dyn Datastore>,
    writes: Vec<WriteOperation>,
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl WriteBatch {
    pub(crate) fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            writes: Vec::new(),
        }
    }

    /// Creates the document; the commit fails if it already exists.
    pub fn create(
        &mut self,
        reference: &DocumentReference,
        data: MapValue,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        let encoded = encode_create_data(data)?;
        self.writes.push(WriteOperation::Create {
            key: reference.key().clone(),
            data: encoded.map,
            transforms: encoded.transforms,
        });
        Ok(self)
    }

    pub fn set(
        &mut self,
        reference: &DocumentReference,
        data: MapValue,
        options: SetOptions,
    ) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        let encoded = encode_set_data(data, options)?;
        self.writes.push(WriteOperation::Set {
            key: reference.key().clone(),
            data: encoded.map,
            mask: encoded.mask,
            transforms: encoded.transforms,
        });
        Ok(self)
    }

    pub fn delete(&mut self, reference: &DocumentReference) -> FirestoreResult<&mut Self> {
        self.ensure_capacity()?;
        self.writes.push(WriteOperation::Delete {
            key: reference.key().clone(),
        });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commits every queued write. An empty batch is a no-op.
    pub async fn commit(self) -> FirestoreResult<()> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.datastore.commit(self.writes).await
    }

    fn ensure_capacity(&self) -> FirestoreResult<()> {
        if self.writes.len() >= MAX_BATCH_WRITES {
            return Err(resource_exhausted(format!(
                "A write batch holds at most {MAX_BATCH_WRITES} operations"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;
    use crate::firestore::model::DocumentKey;
    use crate::firestore::remote::datastore::InMemoryDatastore;
    use crate::firestore::value::FirestoreValue;
    use std::collections::BTreeMap;

    fn reference(store: &Arc<InMemoryDatastore>, path: &str) -> DocumentReference {
        DocumentReference::new(DocumentKey::from_string(path).unwrap(), store.clone())
    }

    fn data(name: &str) -> MapValue {
        MapValue::new(BTreeMap::from([(
            "name".to_string(),
            FirestoreValue::from_string(name),
        )]))
    }

    #[tokio::test]
    async fn commit_applies_all_writes() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut batch = WriteBatch::new(store.clone());
        batch.create(&reference(&store, "users/a"), data("a")).unwrap();
        batch
            .set(&reference(&store, "users/b"), data("b"), SetOptions::merge())
            .unwrap();
        batch.delete(&reference(&store, "users/c")).unwrap();
        assert_eq!(batch.len(), 3);

        batch.commit().await.unwrap();
        assert_eq!(store.paths(), vec!["users/a", "users/b"]);
    }

    #[tokio::test]
    async fn failing_create_rolls_back_whole_batch() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut seed = WriteBatch::new(store.clone());
        seed.create(&reference(&store, "users/a"), data("a")).unwrap();
        seed.commit().await.unwrap();

        let mut batch = WriteBatch::new(store.clone());
        batch.create(&reference(&store, "users/b"), data("b")).unwrap();
        batch.create(&reference(&store, "users/a"), data("again")).unwrap();
        let err = batch.commit().await.unwrap_err();

        assert_eq!(err.code, FirestoreErrorCode::AlreadyExists);
        assert_eq!(store.paths(), vec!["users/a"]);
    }

    #[test]
    fn refuses_more_than_five_hundred_writes() {
        let store = Arc::new(InMemoryDatastore::new());
        let mut batch = WriteBatch::new(store.clone());
        for n in 0..500 {
            batch.delete(&reference(&store, &format!("users/u{n}"))).unwrap();
        }
        let err = batch.delete(&reference(&store, "users/extra")).unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::ResourceExhausted);
        assert!(format!("{batch:?}").starts_with("WriteBatch { writes: ["));
    }
}
