pub(crate) const DEFAULT_DATABASE_ID: &str = "(default)";

/// Reserved pseudo-field naming a document's own identifier.
pub(crate) const DOCUMENT_ID_FIELD: &str = "__name__";

/// Upper bound for the native `in`, `not-in` and `array-contains-any` operands.
pub(crate) const MAX_ARRAYABLE_VALUES: usize = 10;

pub(crate) const INSERT_CHUNK_SIZE: usize = 100;
pub(crate) const UPDATE_CHUNK_SIZE: usize = 100;
pub(crate) const DELETE_CHUNK_SIZE: usize = 500;

pub(crate) const MAX_BATCH_WRITES: usize = 500;

pub(crate) const DEFAULT_RECURSIVE_DELETE_BATCH_SIZE: u32 = 1000;

pub(crate) const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Highest code point used to build an inclusive prefix range over document names.
pub(crate) const PATH_RANGE_END: char = '\u{f8ff}';
