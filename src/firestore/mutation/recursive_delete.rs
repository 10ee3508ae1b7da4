use std::sync::{Arc, LazyLock};

use futures::future::{BoxFuture, FutureExt};

use crate::firestore::constants::DEFAULT_RECURSIVE_DELETE_BATCH_SIZE;
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath};
use crate::firestore::query::NativeQuery;
use crate::firestore::remote::datastore::{Datastore, WriteOperation};
use crate::logger::Logger;

static LOGGER: LazyLock<Logger> =
    LazyLock::new(|| Logger::new("firestore-connection/recursive-delete"));

/// Removes a document together with every document beneath it.
///
/// Descendants are deleted depth-first before their parent. Each document is
/// its own commit, so a failure leaves everything deleted so far deleted.
#[derive(Clone)]
pub struct RecursiveDeleter {
    datastore: Arc<dyn Datastore>,
    batch_size: u32,
}

impl RecursiveDeleter {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            batch_size: DEFAULT_RECURSIVE_DELETE_BATCH_SIZE,
        }
    }

    /// Page size used when listing a subcollection. Zero falls back to the default.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = if batch_size == 0 {
            DEFAULT_RECURSIVE_DELETE_BATCH_SIZE
        } else {
            batch_size
        };
        self
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Deletes `key` and all of its descendants. Returns the number of
    /// documents removed, the target itself included.
    pub async fn delete_document(&self, key: &DocumentKey) -> FirestoreResult<usize> {
        self.delete_tree(key.clone()).await
    }

    /// Deletes every document under `key`'s subcollections, leaving `key` alone.
    pub fn delete_descendants<'a>(
        &'a self,
        key: &'a DocumentKey,
    ) -> BoxFuture<'a, FirestoreResult<usize>> {
        async move {
            let mut removed = 0;
            for collection_id in self.datastore.list_collection_ids(key).await? {
                let collection = key.child_collection(&collection_id);
                loop {
                    let page = NativeQuery::collection(collection.clone())?
                        .select(vec![FieldPath::document_id()])
                        .limit(self.batch_size);
                    let documents = self.datastore.run_query(&page).await?;
                    if documents.is_empty() {
                        break;
                    }
                    for document in documents {
                        removed += self.delete_tree(document.document_key().clone()).await?;
                    }
                }
            }
            Ok(removed)
        }
        .boxed()
    }

    fn delete_tree(&self, key: DocumentKey) -> BoxFuture<'_, FirestoreResult<usize>> {
        async move {
            let removed = self.delete_descendants(&key).await?;
            if removed > 0 {
                LOGGER.debug(format!(
                    "removed {removed} descendant document(s) of {}",
                    key.path()
                ));
            }
            self.datastore
                .commit(vec![WriteOperation::Delete { key }])
                .await?;
            Ok(removed + 1)
        }
        .boxed()
    }
}
