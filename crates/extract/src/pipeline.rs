use std::sync::Arc;

use quillbook_classify::{ClassificationInput, TransactionClassifier};
use quillbook_core::{CsvFormat, EngineUsed, ExtractedData};

use crate::engine::{ExtractionEngine, RawExtraction};
use crate::limiter::RateLimiter;
use crate::upload::Upload;

/// Outcome of ingesting one uploaded file. A failed extraction still yields
/// a record, with every field "Unknown" and `error` set.
#[derive(Debug, Clone)]
pub struct IngestedFile {
    pub filename: String,
    pub file_hash: String,
    pub engine_used: EngineUsed,
    pub confidence_score: f32,
    pub data: ExtractedData,
    pub error: Option<String>,
}

/// Orchestrates, per file: rate limit → extract → classify.
pub struct BatchPipeline {
    engine: Arc<dyn ExtractionEngine>,
    classifier: Arc<TransactionClassifier>,
    limiter: Arc<RateLimiter>,
}

impl BatchPipeline {
    pub fn new(
        engine: Arc<dyn ExtractionEngine>,
        classifier: Arc<TransactionClassifier>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self { engine, classifier, limiter }
    }

    /// Process files one at a time in submission order. A failure on one
    /// file never stops the rest.
    pub async fn ingest(
        &self,
        uploads: &[Upload],
        format: CsvFormat,
        account_name: &str,
    ) -> Vec<IngestedFile> {
        let mut results = Vec::with_capacity(uploads.len());
        for upload in uploads {
            results.push(self.ingest_file(upload, format, account_name).await);
        }
        results
    }

    async fn ingest_file(&self, upload: &Upload, format: CsvFormat, account_name: &str) -> IngestedFile {
        let file_hash = upload.content_hash();
        let engine_used = self.engine.engine();

        self.limiter.acquire().await;
        let raw = match self.engine.extract(upload, format).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(filename = %upload.filename, error = %e, "Extraction failed");
                return IngestedFile {
                    filename: upload.filename.clone(),
                    file_hash,
                    engine_used,
                    confidence_score: 0.0,
                    data: ExtractedData::default(),
                    error: Some(e.to_string()),
                };
            }
        };

        let data = self.classify(raw, account_name).await;
        tracing::info!(
            filename = %upload.filename,
            vendor = %data.vendor,
            transaction_type = %data.transaction_type,
            "Receipt ingested"
        );

        IngestedFile {
            filename: upload.filename.clone(),
            file_hash,
            engine_used,
            confidence_score: engine_used.assumed_confidence(),
            data,
            error: None,
        }
    }

    async fn classify(&self, raw: RawExtraction, account_name: &str) -> ExtractedData {
        let classification = self
            .classifier
            .classify(&ClassificationInput {
                vendor: &raw.vendor,
                description: &raw.description,
                amount: &raw.amount,
                account_name,
            })
            .await;
        tracing::debug!(
            source = ?classification.source,
            reasoning = %classification.reasoning,
            "Transaction classified"
        );

        ExtractedData {
            date: raw.date,
            vendor: raw.vendor,
            amount: raw.amount,
            description: raw.description,
            transaction_type: classification.transaction_type,
            classification_confidence: classification.confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AiExtractor;
    use quillbook_ai::{CompletionError, MockCompletion};
    use quillbook_core::{TransactionType, UNKNOWN};
    use std::time::Duration;
    use tokio::time::Instant;

    fn upload(name: &str) -> Upload {
        Upload { filename: name.into(), bytes: format!("%PDF-1.7 {name}").into_bytes() }
    }

    /// Extraction replies keyed by the attached filename.
    fn extractor() -> MockCompletion {
        MockCompletion::from_fn(|req| {
            match req.attachment.map(|a| a.filename) {
                Some("a.pdf") => Ok(r#"{"date": "12/15/2024", "vendor": "Acme Corp", "amount": "25.99", "description": "Office supplies"}"#.into()),
                Some("b.pdf") => Ok(r#"{"date": "Unknown", "vendor": "ClientCo", "amount": "0", "description": "Unknown"}"#.into()),
                _ => Err(CompletionError::Unavailable("boom".into())),
            }
        })
    }

    fn pipeline(extract: MockCompletion, classify: MockCompletion, interval: Duration) -> BatchPipeline {
        BatchPipeline::new(
            Arc::new(AiExtractor::new(Arc::new(extract), EngineUsed::Ocr)),
            Arc::new(TransactionClassifier::new(Arc::new(classify))),
            Arc::new(RateLimiter::every(interval)),
        )
    }

    #[tokio::test]
    async fn results_follow_submission_order() {
        let p = pipeline(extractor(), MockCompletion::failing("offline"), Duration::ZERO);
        let out = p
            .ingest(&[upload("b.pdf"), upload("a.pdf")], CsvFormat::ThreeColumn, "ClientCo")
            .await;
        assert_eq!(out[0].filename, "b.pdf");
        assert_eq!(out[1].filename, "a.pdf");
        assert_eq!(out[1].data.vendor, "Acme Corp");
        assert_eq!(out[1].file_hash.len(), 64);
    }

    #[tokio::test]
    async fn failed_file_is_marked_and_does_not_stop_the_batch() {
        let p = pipeline(extractor(), MockCompletion::failing("offline"), Duration::ZERO);
        let out = p
            .ingest(&[upload("broken.pdf"), upload("a.pdf")], CsvFormat::ThreeColumn, "ClientCo")
            .await;
        assert_eq!(out.len(), 2);
        assert!(out[0].error.is_some());
        assert_eq!(out[0].data.amount, UNKNOWN);
        assert_eq!(out[0].confidence_score, 0.0);
        assert_eq!(out[0].data.transaction_type, TransactionType::Expense);
        assert!(out[1].error.is_none());
        assert_eq!(out[1].confidence_score, EngineUsed::Ocr.assumed_confidence());
    }

    #[tokio::test]
    async fn classification_fallback_applies_account_match() {
        let p = pipeline(extractor(), MockCompletion::replying("not json"), Duration::ZERO);
        let out = p.ingest(&[upload("b.pdf")], CsvFormat::ThreeColumn, "ClientCo").await;
        assert_eq!(out[0].data.transaction_type, TransactionType::Income);
        assert_eq!(out[0].data.classification_confidence, 0.7);
    }

    #[tokio::test]
    async fn failed_extraction_skips_classification() {
        let classify = Arc::new(MockCompletion::replying(r#"{"transaction_type": "income"}"#));
        let p = BatchPipeline::new(
            Arc::new(AiExtractor::new(Arc::new(extractor()), EngineUsed::Ocr)),
            Arc::new(TransactionClassifier::new(classify.clone())),
            Arc::new(RateLimiter::every(Duration::ZERO)),
        );
        p.ingest(&[upload("broken.pdf")], CsvFormat::ThreeColumn, "ClientCo").await;
        assert_eq!(classify.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_calls_are_spaced_by_the_limiter() {
        let p = pipeline(extractor(), MockCompletion::failing("offline"), Duration::from_secs(2));
        let start = Instant::now();
        p.ingest(
            &[upload("a.pdf"), upload("b.pdf"), upload("a.pdf")],
            CsvFormat::ThreeColumn,
            "ClientCo",
        )
        .await;
        assert!(start.elapsed() >= Duration::from_secs(4));
    }
}
