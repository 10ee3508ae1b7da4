use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::{resource_exhausted, FirestoreResult};
use crate::firestore::model::DocumentKey;
use crate::firestore::query::NativeQuery;
use crate::firestore::remote::datastore::{Datastore, InMemoryDatastore, WriteOperation};

/// In-memory store that remembers every commit and query it served.
///
/// `failing_commit(n)` makes the n-th commit (1-based) fail with a
/// `RESOURCE_EXHAUSTED` error without applying it.
#[derive(Default)]
pub struct RecordingDatastore {
    inner: InMemoryDatastore,
    commits: Mutex<Vec<Vec<WriteOperation>>>,
    queries: Mutex<Vec<NativeQuery>>,
    commit_attempts: AtomicUsize,
    fail_on: Option<usize>,
}

impl RecordingDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_commit(mut self, attempt: usize) -> Self {
        self.fail_on = Some(attempt);
        self
    }

    pub fn inner(&self) -> &InMemoryDatastore {
        &self.inner
    }

    /// Write batches that reached the store, failed ones included.
    pub fn commits(&self) -> Vec<Vec<WriteOperation>> {
        self.commits.lock().unwrap().clone()
    }

    pub fn commit_sizes(&self) -> Vec<usize> {
        self.commits().iter().map(Vec::len).collect()
    }

    pub fn clear_commits(&self) {
        self.commits.lock().unwrap().clear();
    }

    pub fn queries(&self) -> Vec<NativeQuery> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Datastore for RecordingDatastore {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot> {
        self.inner.get_document(key).await
    }

    async fn run_query(&self, query: &NativeQuery) -> FirestoreResult<Vec<DocumentSnapshot>> {
        self.queries.lock().unwrap().push(query.clone());
        self.inner.run_query(query).await
    }

    async fn list_collection_ids(&self, parent: &DocumentKey) -> FirestoreResult<Vec<String>> {
        self.inner.list_collection_ids(parent).await
    }

    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()> {
        self.commits.lock().unwrap().push(writes.clone());
        let attempt = self.commit_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on == Some(attempt) {
            return Err(resource_exhausted("Quota exceeded."));
        }
        self.inner.commit(writes).await
    }
}
