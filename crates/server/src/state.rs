use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jsonwebtoken::DecodingKey;
use quillbook_ai::{CompletionClient, OpenAiClient};
use quillbook_classify::TransactionClassifier;
use quillbook_extract::{AiExtractor, BatchPipeline, RateLimiter};
use quillbook_storage::{create_db, DbPool};

use crate::config::Config;

/// Shared by every handler. Identity is not stored here; it is extracted
/// per request and passed along explicitly.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub pipeline: Arc<BatchPipeline>,
    pub jwt_key: DecodingKey,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(db: DbPool, pipeline: BatchPipeline, jwt_secret: &str, max_upload_bytes: usize) -> Self {
        Self {
            db,
            pipeline: Arc::new(pipeline),
            jwt_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            max_upload_bytes,
        }
    }

    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db = create_db(&config.database_path)
            .await
            .with_context(|| format!("opening database {}", config.database_path.display()))?;

        let classification: Arc<dyn CompletionClient> =
            Arc::new(OpenAiClient::new(&config.ai).context("building AI client")?);
        let extraction: Arc<dyn CompletionClient> = Arc::new(
            OpenAiClient::new(&config.extraction_ai()).context("building extraction client")?,
        );

        let limiter = RateLimiter::new(
            config.rate_limit.burst,
            Duration::from_millis(config.rate_limit.interval_ms),
        );
        let pipeline = BatchPipeline::new(
            Arc::new(AiExtractor::new(extraction, config.extraction.engine)),
            Arc::new(TransactionClassifier::new(classification)),
            Arc::new(limiter),
        );

        tracing::info!(
            engine = %config.extraction.engine,
            model = %config.ai.model,
            burst = config.rate_limit.burst,
            interval_ms = config.rate_limit.interval_ms,
            "Pipeline configured"
        );

        Ok(Self::new(db, pipeline, &config.jwt_secret, config.max_upload_bytes))
    }
}
