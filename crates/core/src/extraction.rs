use serde::{Deserialize, Serialize};
use std::fmt;

use crate::batch::BatchId;

/// Sentinel stored in any field the extractor could not read.
pub const UNKNOWN: &str = "Unknown";

/// Whether a raw field carries a real value rather than the sentinel.
pub fn is_known(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && v != UNKNOWN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionId(pub i64);

impl fmt::Display for ExtractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    /// Receipts are overwhelmingly purchases, so this is the default.
    #[default]
    Expense,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Income => write!(f, "income"),
            TransactionType::Expense => write!(f, "expense"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(format!("Unknown transaction type: '{other}'")),
        }
    }
}

/// Which upstream engine produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineUsed {
    #[serde(rename = "ocr-engine")]
    Ocr,
    #[serde(rename = "text-engine")]
    Text,
}

impl EngineUsed {
    /// The upstream service reports no per-document score, so each engine
    /// carries a fixed one.
    pub fn assumed_confidence(self) -> f32 {
        match self {
            EngineUsed::Ocr => 0.85,
            EngineUsed::Text => 0.95,
        }
    }
}

impl fmt::Display for EngineUsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineUsed::Ocr => write!(f, "ocr-engine"),
            EngineUsed::Text => write!(f, "text-engine"),
        }
    }
}

impl std::str::FromStr for EngineUsed {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ocr-engine" => Ok(EngineUsed::Ocr),
            "text-engine" => Ok(EngineUsed::Text),
            other => Err(format!("Unknown engine: '{other}'")),
        }
    }
}

/// The user-editable fields of an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Date,
    Vendor,
    Amount,
    Description,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Vendor => "vendor",
            Field::Amount => "amount",
            Field::Description => "description",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Field {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(Field::Date),
            "vendor" => Ok(Field::Vendor),
            "amount" => Ok(Field::Amount),
            "description" => Ok(Field::Description),
            other => Err(format!("Unknown field: '{other}'")),
        }
    }
}

/// Structured data pulled from one receipt plus its classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub date: String,
    pub vendor: String,
    pub amount: String,
    pub description: String,
    pub transaction_type: TransactionType,
    /// Classifier confidence (0.0–1.0), independent of extraction quality.
    pub classification_confidence: f32,
}

impl Default for ExtractedData {
    fn default() -> Self {
        Self {
            date: UNKNOWN.to_string(),
            vendor: UNKNOWN.to_string(),
            amount: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
            transaction_type: TransactionType::Expense,
            classification_confidence: 0.0,
        }
    }
}

impl ExtractedData {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::Date => &self.date,
            Field::Vendor => &self.vendor,
            Field::Amount => &self.amount,
            Field::Description => &self.description,
        }
    }

    /// Stores an already-validated value.
    pub fn set(&mut self, field: Field, value: String) {
        match field {
            Field::Date => self.date = value,
            Field::Vendor => self.vendor = value,
            Field::Amount => self.amount = value,
            Field::Description => self.description = value,
        }
    }
}

/// One processed receipt file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub id: ExtractionId,
    pub batch_id: BatchId,
    pub filename: String,
    /// SHA-256 of the uploaded file, lowercase hex.
    pub file_hash: String,
    pub data: ExtractedData,
    pub engine_used: EngineUsed,
    /// Extraction-quality score (0.0–1.0).
    pub confidence_score: f32,
    /// Set when extraction of this file failed; the batch still completes.
    pub error: Option<String>,
}
