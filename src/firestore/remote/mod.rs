//! REST transport: request plumbing, JSON encoding of values, writes and
//! structured queries, and the store backends behind [`Datastore`].

pub mod connection;
pub mod datastore;
pub mod rpc_error;
pub mod serializer;
pub(crate) mod structured_query;

pub use connection::FirestoreRestConnection;
pub use datastore::{
    Datastore, HttpDatastore, InMemoryDatastore, NoopTokenProvider, StaticTokenProvider,
    TokenProvider, TokenProviderArc, WriteOperation,
};
pub use rpc_error::map_http_error;
pub use serializer::JsonProtoSerializer;
