use std::sync::Arc;

use async_trait::async_trait;
use quillbook_ai::{first_json_object, Attachment, CompletionClient, CompletionError, CompletionRequest};
use quillbook_core::{CsvFormat, EngineUsed, UNKNOWN};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::upload::Upload;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Extraction service failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("Extraction service returned no usable JSON")]
    Malformed,
}

/// The four loosely-typed fields the extractor returns. Each is "Unknown"
/// when the model could not read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawExtraction {
    pub date: String,
    pub vendor: String,
    pub amount: String,
    pub description: String,
}

impl Default for RawExtraction {
    fn default() -> Self {
        Self {
            date: UNKNOWN.to_string(),
            vendor: UNKNOWN.to_string(),
            amount: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
        }
    }
}

/// Abstraction over a receipt extraction backend.
#[async_trait]
pub trait ExtractionEngine: Send + Sync {
    fn engine(&self) -> EngineUsed;
    async fn extract(&self, upload: &Upload, format: CsvFormat) -> Result<RawExtraction, ExtractError>;
}

const PROMPT: &str = r#"Read this receipt and extract the transaction it records.

Return a single JSON object with exactly these string fields:
- "date": the transaction date formatted as {DATE_PATTERN}
- "vendor": the business that issued the receipt
- "amount": the grand total as a plain number without currency symbols or thousands separators
- "description": a short description of what was bought or paid for

Use "Unknown" for any field you cannot read. Reply with the JSON object only."#;

/// Sends the PDF to the AI completion service and parses the fields out of
/// its reply.
pub struct AiExtractor {
    client: Arc<dyn CompletionClient>,
    engine: EngineUsed,
}

impl AiExtractor {
    pub fn new(client: Arc<dyn CompletionClient>, engine: EngineUsed) -> Self {
        Self { client, engine }
    }
}

#[async_trait]
impl ExtractionEngine for AiExtractor {
    fn engine(&self) -> EngineUsed {
        self.engine
    }

    async fn extract(&self, upload: &Upload, format: CsvFormat) -> Result<RawExtraction, ExtractError> {
        let prompt = PROMPT.replace("{DATE_PATTERN}", format.date_pattern());
        let request = CompletionRequest {
            prompt: &prompt,
            attachment: Some(Attachment {
                filename: &upload.filename,
                media_type: "application/pdf",
                data: &upload.bytes,
            }),
        };
        let reply = self.client.complete(request).await?;
        parse_reply(&reply).ok_or(ExtractError::Malformed)
    }
}

fn parse_reply(reply: &str) -> Option<RawExtraction> {
    let obj = first_json_object(reply)?;
    Some(RawExtraction {
        date: field(&obj, "date"),
        vendor: field(&obj, "vendor"),
        amount: field(&obj, "amount"),
        description: field(&obj, "description"),
    })
}

fn field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => UNKNOWN.to_string(),
    }
}
