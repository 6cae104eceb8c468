pub mod amount;
pub mod batch;
pub mod error;
pub mod extraction;
pub mod format;
pub mod usage;
pub mod validate;

pub use amount::{Amount, AmountError, MAX_AMOUNT};
pub use batch::{
    admit, Account, AccountId, Admission, AdmissionError, Batch, BatchError, BatchId,
    BatchRequest, BatchStatus, GatedAction, UserContext, MAX_FILES_PER_BATCH, PAGES_PER_FILE,
};
pub use error::ErrorKind;
pub use extraction::{
    is_known, EngineUsed, ExtractedData, Extraction, ExtractionId, Field, TransactionType, UNKNOWN,
};
pub use format::{CsvFormat, DateOrder, FormatError};
pub use usage::{next_reset_date, CapacityError, UsageLedger, MONTHLY_PAGE_LIMIT};
pub use validate::{validate_field, FieldError};
