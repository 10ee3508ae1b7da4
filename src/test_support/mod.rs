//! Test utilities shared across crate-level unit tests.

pub mod datastore;
pub mod fixtures;
pub mod http;

pub use datastore::RecordingDatastore;
pub use fixtures::{connection_with, record, users_fixture};
pub use http::start_mock_server;
