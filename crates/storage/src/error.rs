use quillbook_core::{BatchError, CapacityError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Corrupt {table} row: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

impl StorageError {
    pub fn corrupt(table: &'static str, detail: impl ToString) -> Self {
        StorageError::Corrupt { table, detail: detail.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::Batch(e) => e.kind(),
            StorageError::Capacity(_) => ErrorKind::Capacity,
            StorageError::Sqlx(_) | StorageError::Corrupt { .. } => ErrorKind::Internal,
        }
    }
}
