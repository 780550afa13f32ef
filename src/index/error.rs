use thiserror::Error;

use crate::file::{FileError, PageId};
use crate::record::RecordError;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Buffer pool exhausted")]
    BufferExhausted,

    #[error("Index page {0} could not be brought into the buffer pool")]
    NodeUnavailable(PageId),

    #[error("Corrupt index node at page {page_id}: {detail}")]
    CorruptNode { page_id: PageId, detail: String },

    #[error("Bulk loading requires sorted keys: {key:?} after {last:?}")]
    UnsortedBulkLoad { last: String, key: String },
}
