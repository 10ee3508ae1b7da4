//! Write-side machinery: data encoding, chunked bulk commits, recursive
//! deletion and dirty-field diffs for partial updates.

mod batcher;
mod dirty;
mod encode;
mod recursive_delete;

pub(crate) use batcher::document_id_from_value;
pub use batcher::{encode_update_data, MutationBatcher, MutationPhase};
pub use dirty::DirtyFieldDiffer;
pub use encode::{
    encode_create_data, encode_set_data, strip_document_id, EncodedSetData, FieldTransform,
    SetOptions, TransformOperation,
};
pub use recursive_delete::RecursiveDeleter;
