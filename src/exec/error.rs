use thiserror::Error;

use crate::file::FileError;
use crate::index::IndexError;
use crate::record::RecordError;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecResult<T> = Result<T, ExecError>;
