//! Relational-style query builder and batched mutation engine over a
//! Firestore document store.

pub mod api;
mod constants;
pub mod error;
pub mod model;
pub mod mutation;
pub mod query;
mod query_evaluator;
pub mod remote;
pub mod value;

pub use api::{
    CollectionReference, ConnectionConfig, DocumentModel, DocumentReference, DocumentSnapshot,
    FirestoreConnection, ModelRepository, QueryBuilder, Records, WriteBatch,
};
pub use error::{FirestoreError, FirestoreErrorCode, FirestoreResult};
pub use model::{DatabaseId, FieldPath};
pub use value::{FirestoreValue, MapValue};
