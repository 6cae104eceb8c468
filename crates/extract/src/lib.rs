pub mod engine;
pub mod limiter;
pub mod pipeline;
pub mod upload;

pub use engine::{AiExtractor, ExtractError, ExtractionEngine, RawExtraction};
pub use limiter::RateLimiter;
pub use pipeline::{BatchPipeline, IngestedFile};
pub use upload::{validate_upload, Upload, UploadError, DEFAULT_MAX_UPLOAD_BYTES};
