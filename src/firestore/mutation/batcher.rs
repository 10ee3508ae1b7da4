use std::fmt::{Display, Formatter};
use std::sync::{Arc, LazyLock};

use crate::firestore::constants::{DELETE_CHUNK_SIZE, INSERT_CHUNK_SIZE, UPDATE_CHUNK_SIZE};
use crate::firestore::error::{invalid_argument, FirestoreError, FirestoreResult};
use crate::firestore::model::{next_ordered_id, DocumentKey, ResourcePath};
use crate::firestore::remote::datastore::{Datastore, WriteOperation};
use crate::firestore::value::{FirestoreValue, MapValue, ValueKind};
use crate::logger::Logger;

use super::encode::{
    encode_create_data, encode_set_data, strip_document_id, EncodedSetData, SetOptions,
};
use super::recursive_delete::RecursiveDeleter;

static LOGGER: LazyLock<Logger> = LazyLock::new(|| Logger::new("firestore-connection/mutation"));

/// Where a mutation currently is. A failed run stays at the phase it failed in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationPhase {
    Building,
    Compiling,
    Chunking,
    Committing { chunk: usize, total: usize },
    Done,
}

impl Display for MutationPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationPhase::Building => f.write_str("building"),
            MutationPhase::Compiling => f.write_str("compiling"),
            MutationPhase::Chunking => f.write_str("chunking"),
            MutationPhase::Committing { chunk, total } => {
                write!(f, "committing chunk {chunk}/{total}")
            }
            MutationPhase::Done => f.write_str("done"),
        }
    }
}

/// Turns bulk inserts, updates and deletes into sequential chunked commits.
///
/// Chunks are awaited one after another. When chunk `k` fails, chunks before
/// it stay applied, later chunks are never sent and the error carries `k/N`.
pub struct MutationBatcher {
    datastore: Arc<dyn Datastore>,
    phase: MutationPhase,
}

impl MutationBatcher {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            phase: MutationPhase::Building,
        }
    }

    pub fn phase(&self) -> MutationPhase {
        self.phase
    }

    /// Creates one document per record under `collection`.
    ///
    /// A record's `__name__` entry, when present, becomes the document id and is
    /// not stored. Records without one get a time-ordered id. Creating a
    /// document that already exists fails its chunk.
    pub async fn insert(
        &mut self,
        collection: &ResourcePath,
        records: Vec<MapValue>,
    ) -> FirestoreResult<Vec<DocumentKey>> {
        self.enter(MutationPhase::Building);
        if !collection.is_collection() {
            return Err(invalid_argument(format!(
                "Insert target '{collection}' is not a collection path"
            )));
        }
        if records.is_empty() {
            self.enter(MutationPhase::Done);
            return Ok(Vec::new());
        }

        self.enter(MutationPhase::Compiling);
        let mut keys = Vec::with_capacity(records.len());
        let mut writes = Vec::with_capacity(records.len());
        for record in records {
            let (data, id) = strip_document_id(record);
            let id = match id {
                Some(value) => document_id_from_value(&value)?,
                None => next_ordered_id(),
            };
            let key = DocumentKey::from_path(collection.child([id]))?;
            let encoded = encode_create_data(data)?;
            keys.push(key.clone());
            writes.push(WriteOperation::Create {
                key,
                data: encoded.map,
                transforms: encoded.transforms,
            });
        }

        self.commit_chunks(writes, INSERT_CHUNK_SIZE).await?;
        Ok(keys)
    }

    /// Merges `data` into each document. Returns how many documents were written.
    ///
    /// Data with no fields besides `__name__` writes nothing.
    pub async fn update(
        &mut self,
        documents: Vec<DocumentKey>,
        data: MapValue,
    ) -> FirestoreResult<usize> {
        self.enter(MutationPhase::Building);
        if documents.is_empty() {
            self.enter(MutationPhase::Done);
            return Ok(0);
        }
        self.enter(MutationPhase::Compiling);
        match encode_update_data(data)? {
            Some(encoded) => self.update_encoded(documents, encoded).await,
            None => {
                self.enter(MutationPhase::Done);
                Ok(0)
            }
        }
    }

    /// Merges data already run through [`encode_update_data`] into each document.
    pub async fn update_encoded(
        &mut self,
        documents: Vec<DocumentKey>,
        encoded: EncodedSetData,
    ) -> FirestoreResult<usize> {
        self.enter(MutationPhase::Building);
        if documents.is_empty() {
            self.enter(MutationPhase::Done);
            return Ok(0);
        }

        let count = documents.len();
        let writes = documents
            .into_iter()
            .map(|key| WriteOperation::Set {
                key,
                data: encoded.map.clone(),
                mask: encoded.mask.clone(),
                transforms: encoded.transforms.clone(),
            })
            .collect();
        self.commit_chunks(writes, UPDATE_CHUNK_SIZE).await?;
        Ok(count)
    }

    /// Deletes each document after removing everything beneath it.
    ///
    /// Descendants of the documents in a chunk are removed right before that
    /// chunk commits. Returns how many target documents were deleted.
    pub async fn delete(
        &mut self,
        documents: Vec<DocumentKey>,
        deleter: &RecursiveDeleter,
    ) -> FirestoreResult<usize> {
        self.enter(MutationPhase::Building);
        if documents.is_empty() {
            self.enter(MutationPhase::Done);
            return Ok(0);
        }

        self.enter(MutationPhase::Compiling);
        let count = documents.len();
        self.enter(MutationPhase::Chunking);
        let chunks: Vec<Vec<DocumentKey>> = documents
            .chunks(DELETE_CHUNK_SIZE)
            .map(<[DocumentKey]>::to_vec)
            .collect();
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let position = index + 1;
            self.enter(MutationPhase::Committing {
                chunk: position,
                total,
            });
            let mut writes = Vec::with_capacity(chunk.len());
            for key in chunk {
                deleter
                    .delete_descendants(&key)
                    .await
                    .map_err(|err| self.chunk_failed(err, position, total))?;
                writes.push(WriteOperation::Delete { key });
            }
            self.datastore
                .commit(writes)
                .await
                .map_err(|err| self.chunk_failed(err, position, total))?;
        }

        self.enter(MutationPhase::Done);
        Ok(count)
    }

    async fn commit_chunks(
        &mut self,
        writes: Vec<WriteOperation>,
        chunk_size: usize,
    ) -> FirestoreResult<()> {
        self.enter(MutationPhase::Chunking);
        let mut chunks = Vec::new();
        let mut remaining = writes.into_iter().peekable();
        while remaining.peek().is_some() {
            chunks.push(remaining.by_ref().take(chunk_size).collect::<Vec<_>>());
        }
        let total = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let position = index + 1;
            self.enter(MutationPhase::Committing {
                chunk: position,
                total,
            });
            self.datastore
                .commit(chunk)
                .await
                .map_err(|err| self.chunk_failed(err, position, total))?;
        }

        self.enter(MutationPhase::Done);
        Ok(())
    }

    fn chunk_failed(&self, err: FirestoreError, position: usize, total: usize) -> FirestoreError {
        LOGGER.warn(format!(
            "chunk {position}/{total} failed, {} earlier chunk(s) stay applied: {err}",
            position - 1
        ));
        err.with_chunk(position, total)
    }

    fn enter(&mut self, phase: MutationPhase) {
        self.phase = phase;
        LOGGER.debug(format!("mutation {phase}"));
    }
}

/// Encodes update data as a merge write. `None` when nothing but the identity
/// field was given.
pub fn encode_update_data(data: MapValue) -> FirestoreResult<Option<EncodedSetData>> {
    let (data, _) = strip_document_id(data);
    if data.is_empty() {
        return Ok(None);
    }
    encode_set_data(data, SetOptions::merge()).map(Some)
}

pub(crate) fn document_id_from_value(value: &FirestoreValue) -> FirestoreResult<String> {
    let id = match value.kind() {
        ValueKind::String(id) => id.clone(),
        ValueKind::Integer(id) => id.to_string(),
        ValueKind::Reference(path) => path
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string(),
        _ => {
            return Err(invalid_argument(
                "Document id must be a string, an integer or a reference",
            ))
        }
    };
    if id.is_empty() || id.contains('/') {
        return Err(invalid_argument(format!(
            "Document id '{id}' must be a non-empty single path segment"
        )));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firestore::error::FirestoreErrorCode;
    use crate::test_support::RecordingDatastore;
    use std::collections::BTreeMap;

    fn record(entries: Vec<(&str, FirestoreValue)>) -> MapValue {
        MapValue::new(
            entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }

    fn users() -> ResourcePath {
        ResourcePath::from_string("users").unwrap()
    }

    #[tokio::test]
    async fn insert_chunks_by_one_hundred() {
        let store = Arc::new(RecordingDatastore::new());
        let records = (0..250)
            .map(|n| record(vec![("n", FirestoreValue::from_integer(n))]))
            .collect();

        let mut batcher = MutationBatcher::new(store.clone());
        let keys = batcher.insert(&users(), records).await.unwrap();

        assert_eq!(keys.len(), 250);
        assert_eq!(store.commit_sizes(), vec![100, 100, 50]);
        assert_eq!(batcher.phase(), MutationPhase::Done);
        assert_eq!(store.inner().len(), 250);
    }

    #[tokio::test]
    async fn insert_uses_identity_field_and_strips_it() {
        let store = Arc::new(RecordingDatastore::new());
        let mut batcher = MutationBatcher::new(store.clone());
        let keys = batcher
            .insert(
                &users(),
                vec![record(vec![
                    ("__name__", "ann".into()),
                    ("age", 30.into()),
                ])],
            )
            .await
            .unwrap();

        assert_eq!(keys[0].path().canonical_string(), "users/ann");
        let snapshot = store.inner().get_document(&keys[0]).await.unwrap();
        assert_eq!(
            snapshot.map_value().cloned().unwrap(),
            record(vec![("age", 30.into())])
        );
    }

    #[tokio::test]
    async fn failed_chunk_stops_later_chunks() {
        let store = Arc::new(RecordingDatastore::new().failing_commit(2));
        let records = (0..250)
            .map(|n| record(vec![("n", FirestoreValue::from_integer(n))]))
            .collect();

        let mut batcher = MutationBatcher::new(store.clone());
        let err = batcher.insert(&users(), records).await.unwrap_err();

        let chunk = err.chunk().unwrap();
        assert_eq!((chunk.index, chunk.total), (2, 3));
        assert_eq!(store.commit_sizes(), vec![100, 100]);
        assert_eq!(store.inner().len(), 100);
        assert_eq!(
            batcher.phase(),
            MutationPhase::Committing { chunk: 2, total: 3 }
        );
    }

    #[tokio::test]
    async fn update_merges_into_every_document() {
        let store = Arc::new(RecordingDatastore::new());
        let mut batcher = MutationBatcher::new(store.clone());
        let keys = batcher
            .insert(
                &users(),
                vec![
                    record(vec![("__name__", "a".into()), ("visits", 1.into())]),
                    record(vec![("__name__", "b".into()), ("visits", 5.into())]),
                ],
            )
            .await
            .unwrap();

        let updated = batcher
            .update(
                keys.clone(),
                record(vec![
                    ("visits", FirestoreValue::numeric_increment(1.into())),
                    ("seen", true.into()),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(updated, 2);

        let b = store.inner().get_document(&keys[1]).await.unwrap();
        assert_eq!(b.get("visits"), Some(FirestoreValue::from_integer(6)));
        assert_eq!(b.get("seen"), Some(FirestoreValue::from_bool(true)));
    }

    #[tokio::test]
    async fn update_validates_before_any_commit() {
        let store = Arc::new(RecordingDatastore::new());
        let mut batcher = MutationBatcher::new(store.clone());
        let key = DocumentKey::from_string("users/a").unwrap();
        let err = batcher
            .update(
                vec![key],
                record(vec![(
                    "visits",
                    FirestoreValue::numeric_increment("x".into()),
                )]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, FirestoreErrorCode::InvalidArgument);
        assert!(store.commit_sizes().is_empty());
    }

    #[tokio::test]
    async fn delete_chunks_by_five_hundred_and_removes_subcollections() {
        let store = Arc::new(RecordingDatastore::new());
        let mut batcher = MutationBatcher::new(store.clone());
        let records = (0..501)
            .map(|n| record(vec![("__name__", format!("u{n:03}").into())]))
            .collect();
        let keys = batcher.insert(&users(), records).await.unwrap();
        batcher
            .insert(
                &ResourcePath::from_string("users/u000/posts").unwrap(),
                vec![record(vec![("title", "hello".into())])],
            )
            .await
            .unwrap();
        store.clear_commits();

        let deleter = RecursiveDeleter::new(store.clone());
        let deleted = batcher.delete(keys, &deleter).await.unwrap();

        assert_eq!(deleted, 501);
        assert!(store.inner().is_empty());
        // one commit for the post, then the two target chunks
        assert_eq!(store.commit_sizes(), vec![1, 500, 1]);
    }

    #[tokio::test]
    async fn update_without_documents_or_fields_writes_nothing() {
        let store = Arc::new(RecordingDatastore::new());
        let mut batcher = MutationBatcher::new(store.clone());
        assert_eq!(batcher.update(Vec::new(), MapValue::default()).await.unwrap(), 0);

        let key = DocumentKey::from_string("users/a").unwrap();
        let only_identity = record(vec![("__name__", "a".into())]);
        assert_eq!(batcher.update(vec![key], only_identity).await.unwrap(), 0);
        assert!(store.commit_sizes().is_empty());
        assert_eq!(batcher.phase(), MutationPhase::Done);
    }

    #[test]
    fn update_data_is_encoded_as_a_merge() {
        let encoded = encode_update_data(record(vec![
            ("__name__", "a".into()),
            ("seen", true.into()),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(encoded.map, record(vec![("seen", true.into())]));
        assert_eq!(encoded.mask.map(|mask| mask.len()), Some(1));
        assert!(encode_update_data(MapValue::default()).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_commit_count_follows_chunk_size() {
        for count in [1usize, 499, 500, 501, 1000, 1001] {
            let store = Arc::new(RecordingDatastore::new());
            let mut batcher = MutationBatcher::new(store.clone());
            let records = (0..count)
                .map(|n| record(vec![("__name__", format!("u{n:04}").into())]))
                .collect();
            let keys = batcher.insert(&users(), records).await.unwrap();
            store.clear_commits();

            let deleter = RecursiveDeleter::new(store.clone());
            assert_eq!(batcher.delete(keys, &deleter).await.unwrap(), count);

            let sizes = store.commit_sizes();
            assert_eq!(sizes.len(), count.div_ceil(DELETE_CHUNK_SIZE), "{count} deletes");
            assert!(sizes.iter().all(|size| *size <= DELETE_CHUNK_SIZE));
            assert_eq!(sizes.iter().sum::<usize>(), count);
            assert!(store.inner().is_empty());
        }
    }

    #[tokio::test]
    async fn insert_and_update_commit_counts_follow_chunk_size() {
        for count in [1usize, 99, 100, 101, 200, 201] {
            let store = Arc::new(RecordingDatastore::new());
            let mut batcher = MutationBatcher::new(store.clone());
            let records = (0..count)
                .map(|n| record(vec![("n", FirestoreValue::from_integer(n as i64))]))
                .collect();
            let keys = batcher.insert(&users(), records).await.unwrap();
            assert_eq!(store.commit_sizes().len(), count.div_ceil(INSERT_CHUNK_SIZE));
            store.clear_commits();

            let updated = batcher
                .update(keys, record(vec![("seen", true.into())]))
                .await
                .unwrap();
            assert_eq!(updated, count);
            assert_eq!(
                store.commit_sizes().len(),
                count.div_ceil(UPDATE_CHUNK_SIZE),
                "{count} updates"
            );
        }
    }

    #[test]
    fn document_ids_from_values() {
        assert_eq!(document_id_from_value(&"ann".into()).unwrap(), "ann");
        assert_eq!(document_id_from_value(&7.into()).unwrap(), "7");
        assert_eq!(
            document_id_from_value(&FirestoreValue::from_reference("users/bob")).unwrap(),
            "bob"
        );
        assert!(document_id_from_value(&"a/b".into()).is_err());
        assert!(document_id_from_value(&FirestoreValue::from_map(BTreeMap::new())).is_err());
    }
}
