mod aggregate;
mod builder;
mod config;
mod connection;
mod model;
mod reference;
mod snapshot;
mod write_batch;

pub use aggregate::{average_values, max_value, min_value, sum_values, Aggregate};
pub use builder::{QueryBuilder, Records};
pub use config::ConnectionConfig;
pub use connection::{FirestoreConnection, QueryLogEntry};
pub use model::{DocumentBacked, DocumentModel, LifecycleHooks, ModelRepository};
pub use reference::{CollectionReference, DocumentReference, DocumentScope};
pub use snapshot::DocumentSnapshot;
pub use write_batch::WriteBatch;
