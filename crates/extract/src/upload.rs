use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// One uploaded receipt file, in submission order.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Lowercase hex SHA-256 of the file contents.
    pub fn content_hash(&self) -> String {
        Sha256::digest(&self.bytes).iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{0} is empty")]
    Empty(String),
    #[error("{filename} is {size} bytes; the limit is {limit} bytes")]
    TooLarge { filename: String, size: usize, limit: usize },
    #[error("{0} is not a PDF")]
    NotPdf(String),
}

pub fn validate_upload(upload: &Upload, max_bytes: usize) -> Result<(), UploadError> {
    if upload.bytes.is_empty() {
        return Err(UploadError::Empty(upload.filename.clone()));
    }
    if upload.bytes.len() > max_bytes {
        return Err(UploadError::TooLarge {
            filename: upload.filename.clone(),
            size: upload.bytes.len(),
            limit: max_bytes,
        });
    }
    if !upload.bytes.starts_with(PDF_MAGIC) {
        return Err(UploadError::NotPdf(upload.filename.clone()));
    }
    Ok(())
}
