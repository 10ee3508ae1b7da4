use std::sync::Arc;

use async_trait::async_trait;

use crate::firestore::api::DocumentSnapshot;
use crate::firestore::error::FirestoreResult;
use crate::firestore::model::{DocumentKey, FieldPath};
use crate::firestore::mutation::FieldTransform;
use crate::firestore::query::NativeQuery;
use crate::firestore::value::MapValue;

pub mod http;
pub mod in_memory;

/// One write inside an atomic commit.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Fails with `already-exists` when the document is present.
    Create {
        key: DocumentKey,
        data: MapValue,
        transforms: Vec<FieldTransform>,
    },
    /// Replaces the document, or only the masked fields when `mask` is set.
    Set {
        key: DocumentKey,
        data: MapValue,
        mask: Option<Vec<FieldPath>>,
        transforms: Vec<FieldTransform>,
    },
    Delete {
        key: DocumentKey,
    },
}

impl WriteOperation {
    pub fn key(&self) -> &DocumentKey {
        match self {
            WriteOperation::Create { key, .. }
            | WriteOperation::Set { key, .. }
            | WriteOperation::Delete { key } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            WriteOperation::Create { .. } => "create",
            WriteOperation::Set { .. } => "set",
            WriteOperation::Delete { .. } => "delete",
        }
    }
}

/// Document-store client surface the query and mutation layers run against.
///
/// Each `commit` is atomic for its own writes only.
#[async_trait]
pub trait Datastore: Send + Sync + 'static {
    async fn get_document(&self, key: &DocumentKey) -> FirestoreResult<DocumentSnapshot>;
    async fn run_query(&self, query: &NativeQuery) -> FirestoreResult<Vec<DocumentSnapshot>>;
    /// Ids of the immediate subcollections of `parent`.
    async fn list_collection_ids(&self, parent: &DocumentKey) -> FirestoreResult<Vec<String>>;
    async fn commit(&self, writes: Vec<WriteOperation>) -> FirestoreResult<()>;
}

#[async_trait]
pub trait TokenProvider: Send + Sync + 'static {
    async fn get_token(&self) -> FirestoreResult<Option<String>>;
    fn invalidate_token(&self);
}

#[derive(Default, Clone)]
pub struct NoopTokenProvider;

#[async_trait]
impl TokenProvider for NoopTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(None)
    }

    fn invalidate_token(&self) {}
}

/// Hands out a fixed bearer token, e.g. one minted by `gcloud auth print-access-token`.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> FirestoreResult<Option<String>> {
        Ok(Some(self.token.clone()))
    }

    fn invalidate_token(&self) {}
}

pub type TokenProviderArc = Arc<dyn TokenProvider>;

pub use http::HttpDatastore;
pub use in_memory::InMemoryDatastore;
