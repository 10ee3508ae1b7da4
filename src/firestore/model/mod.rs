mod database_id;
mod document_key;
mod field_path;
mod ordered_id;
mod resource_path;
mod timestamp;

pub use database_id::DatabaseId;
pub use document_key::DocumentKey;
pub use field_path::{FieldPath, IntoFieldPath};
pub use ordered_id::next_ordered_id;
pub use resource_path::ResourcePath;
pub use timestamp::Timestamp;
