use thiserror::Error;

use crate::file::FileError;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Corrupt page {page_id}: {detail}")]
    CorruptPage { page_id: usize, detail: String },

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Buffer pool exhausted")]
    BufferExhausted,
}

pub type RecordResult<T> = Result<T, RecordError>;
