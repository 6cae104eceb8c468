use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Request, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
        StatusCode,
    },
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use quillbook_core::{
    admit, validate_field, Account, AccountId, AdmissionError, Batch, BatchId, BatchRequest, Extraction,
    ExtractionId, Field, GatedAction, UserContext, MAX_FILES_PER_BATCH,
};
use quillbook_export::{export_filename, render_csv};
use quillbook_extract::{validate_upload, IngestedFile, Upload};
use quillbook_storage::{
    complete_batch, get_account, get_batch, get_extraction, get_extractions_for_batch,
    insert_account, insert_batch, insert_extraction, mark_batch_failed, record_download,
    update_extraction_field, NewExtraction,
};
use serde::{Deserialize, Serialize};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Room for the non-file multipart fields and boundaries.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_mul(MAX_FILES_PER_BATCH)
        .saturating_add(FORM_OVERHEAD_BYTES);

    let tracing_layer = TraceLayer::new_for_http().make_span_with(|req: &Request| {
        tracing::info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            method = %req.method(),
            uri = %req.uri(),
        )
    });

    Router::new()
        .route("/health", get(health))
        .route("/api/accounts", post(create_account))
        .route("/api/batches", post(create_batch))
        .route("/api/batches/{id}", get(batch_detail))
        .route("/api/batches/{id}/export", get(export_batch))
        .route("/api/extractions/{id}", patch(update_field))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(tracing_layer)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

// ── Accounts ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NewAccount {
    name: String,
}

async fn create_account(
    State(state): State<AppState>,
    AuthUser(profile): AuthUser,
    Json(body): Json<NewAccount>,
) -> Result<(StatusCode, Json<Account>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Account name must not be empty".into()));
    }
    let account = insert_account(&state.db, &profile.user_id, name).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

/// The batch and its account, provided the caller owns the account.
async fn owned_batch(
    state: &AppState,
    user: &UserContext,
    id: BatchId,
) -> Result<(Batch, Account), AppError> {
    let batch = get_batch(&state.db, id).await?.ok_or(AppError::NotFound("batch"))?;
    let account = get_account(&state.db, batch.account_id)
        .await?
        .ok_or(AppError::NotFound("account"))?;
    if !user.owns(&account) {
        return Err(AppError::NotOwned("batch"));
    }
    Ok((batch, account))
}

// ── Batches ───────────────────────────────────────────────────────────────────

struct BatchForm {
    account_id: AccountId,
    csv_format: String,
    uploads: Vec<Upload>,
}

async fn read_batch_form(multipart: &mut Multipart) -> Result<BatchForm, AppError> {
    let mut account_id = None;
    let mut csv_format = String::new();
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "account_id" => {
                let text = field.text().await?;
                let id = text
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| AppError::BadRequest(format!("Invalid account_id '{text}'")))?;
                account_id = Some(AccountId(id));
            }
            "csv_format" => csv_format = field.text().await?,
            "files" => {
                let filename = field.file_name().unwrap_or("receipt.pdf").to_string();
                let bytes = field.bytes().await?.to_vec();
                uploads.push(Upload { filename, bytes });
            }
            other => tracing::debug!(field = other, "Ignoring multipart field"),
        }
    }

    let account_id = account_id.ok_or_else(|| AppError::BadRequest("Missing account_id".into()))?;
    Ok(BatchForm { account_id, csv_format, uploads })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileSummary {
    pub extraction_id: ExtractionId,
    pub filename: String,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch: Batch,
    pub files: Vec<FileSummary>,
}

/// Admit, ingest every file in order, then complete the batch.
async fn create_batch(
    State(state): State<AppState>,
    AuthUser(profile): AuthUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<BatchSummary>), AppError> {
    let form = read_batch_form(&mut multipart).await?;
    let account = get_account(&state.db, form.account_id)
        .await?
        .ok_or(AppError::NotFound("account"))?;

    let today = Utc::now().date_naive();
    let admission = admit(
        &profile.context(),
        &BatchRequest {
            account: &account,
            csv_format: &form.csv_format,
            file_count: form.uploads.len(),
        },
        &profile.usage,
        today,
    )?;
    for upload in &form.uploads {
        validate_upload(upload, state.max_upload_bytes)?;
    }

    let batch = insert_batch(&state.db, account.id, &admission, Utc::now()).await?;
    let ingested = state
        .pipeline
        .ingest(&form.uploads, admission.csv_format, &account.name)
        .await;

    let files = match store_extractions(&state, batch.id, &ingested).await {
        Ok(files) => files,
        Err(e) => {
            if let Err(mark_err) = mark_batch_failed(&state.db, batch.id).await {
                tracing::error!(batch_id = %batch.id, error = %mark_err, "Could not mark batch failed");
            }
            return Err(e);
        }
    };

    let batch = complete_batch(&state.db, batch.id, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(BatchSummary { batch, files })))
}

async fn store_extractions(
    state: &AppState,
    batch_id: BatchId,
    ingested: &[IngestedFile],
) -> Result<Vec<FileSummary>, AppError> {
    let mut files = Vec::with_capacity(ingested.len());
    for file in ingested {
        let extraction_id = insert_extraction(
            &state.db,
            batch_id,
            &NewExtraction {
                filename: &file.filename,
                file_hash: &file.file_hash,
                data: &file.data,
                engine_used: file.engine_used,
                confidence_score: file.confidence_score,
                error: file.error.as_deref(),
            },
        )
        .await?;
        files.push(FileSummary {
            extraction_id,
            filename: file.filename.clone(),
            error: file.error.clone(),
        });
    }
    Ok(files)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchDetail {
    pub batch: Batch,
    pub extractions: Vec<Extraction>,
}

async fn batch_detail(
    State(state): State<AppState>,
    AuthUser(profile): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<BatchDetail>, AppError> {
    let (batch, _) = owned_batch(&state, &profile.context(), BatchId(id)).await?;
    let extractions = get_extractions_for_batch(&state.db, batch.id).await?;
    Ok(Json(BatchDetail { batch, extractions }))
}

async fn export_batch(
    State(state): State<AppState>,
    AuthUser(profile): AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user = profile.context();
    let (batch, account) = owned_batch(&state, &user, BatchId(id)).await?;
    if !user.subscription_active {
        return Err(AdmissionError::SubscriptionInactive.into());
    }
    batch.ensure_completed(GatedAction::Export)?;

    let extractions = get_extractions_for_batch(&state.db, batch.id).await?;
    let processed_on = batch.processed_at.date_naive();
    let body = render_csv(batch.csv_format, processed_on, &extractions)?;
    let filename = export_filename(&account.name, processed_on, batch.csv_format);
    record_download(&state.db, batch.id).await?;
    tracing::info!(batch_id = %batch.id, %filename, "Batch exported");

    Ok((
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        body,
    ))
}

// ── Extractions ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FieldUpdate {
    field: String,
    value: String,
}

async fn update_field(
    State(state): State<AppState>,
    AuthUser(profile): AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<FieldUpdate>,
) -> Result<Json<Extraction>, AppError> {
    let field: Field = update.field.parse().map_err(AppError::BadRequest)?;
    let extraction = get_extraction(&state.db, ExtractionId(id))
        .await?
        .ok_or(AppError::NotFound("extraction"))?;
    let (batch, _) = owned_batch(&state, &profile.context(), extraction.batch_id).await?;
    batch.ensure_completed(GatedAction::Edit)?;

    let value = validate_field(field, &update.value, batch.csv_format)?;
    let updated = update_extraction_field(&state.db, extraction.id, field, &value).await?;
    tracing::info!(extraction_id = %extraction.id, %field, "Extraction field updated");
    Ok(Json(updated))
}
