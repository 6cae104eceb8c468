use chrono::{DateTime, NaiveDate, Utc};
use quillbook_core::{
    Account, AccountId, Admission, Batch, BatchError, BatchId, BatchStatus, CapacityError,
    CsvFormat, EngineUsed, ExtractedData, Extraction, ExtractionId, Field, GatedAction,
    TransactionType, UsageLedger, UserContext, MONTHLY_PAGE_LIMIT,
};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StorageError;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS user_profiles (
            user_id TEXT PRIMARY KEY,
            subscription_status TEXT NOT NULL DEFAULT 'inactive',
            monthly_usage INTEGER NOT NULL DEFAULT 0 CHECK (monthly_usage >= 0),
            usage_reset_date TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (user_id) REFERENCES user_profiles(user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS batches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL,
            file_count INTEGER NOT NULL CHECK (file_count BETWEEN 1 AND 10),
            total_pages INTEGER NOT NULL CHECK (total_pages > 0),
            csv_format TEXT NOT NULL CHECK (csv_format IN ('3-column', '4-column')),
            status TEXT NOT NULL DEFAULT 'processing',
            processed_at TEXT NOT NULL,
            edit_count INTEGER NOT NULL DEFAULT 0,
            download_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS batches_csv_format_immutable
        BEFORE UPDATE OF csv_format ON batches
        WHEN NEW.csv_format <> OLD.csv_format
        BEGIN
            SELECT RAISE(ABORT, 'csv_format is immutable');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extractions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id INTEGER NOT NULL,
            filename TEXT NOT NULL,
            file_hash TEXT NOT NULL,
            date TEXT NOT NULL,
            vendor TEXT NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL,
            transaction_type TEXT NOT NULL DEFAULT 'expense',
            classification_confidence REAL NOT NULL DEFAULT 0,
            engine_used TEXT NOT NULL,
            confidence_score REAL NOT NULL,
            error TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (batch_id) REFERENCES batches(id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_extractions_batch ON extractions(batch_id)")
        .execute(pool)
        .await?;

    Ok(())
}

// ── User profiles ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionStatus::Active => write!(f, "active"),
            SubscriptionStatus::Inactive => write!(f, "inactive"),
        }
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            other => Err(format!("Unknown subscription status: '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: String,
    pub subscription_status: SubscriptionStatus,
    pub usage: UsageLedger,
}

impl UserProfile {
    pub fn context(&self) -> UserContext {
        UserContext {
            user_id: self.user_id.clone(),
            subscription_active: self.subscription_status == SubscriptionStatus::Active,
        }
    }
}

/// Create the profile on first sight: no subscription, empty usage.
pub async fn ensure_user_profile(
    pool: &DbPool,
    user_id: &str,
    today: NaiveDate,
) -> Result<UserProfile, StorageError> {
    let fresh = UsageLedger::fresh(today);
    sqlx::query("INSERT OR IGNORE INTO user_profiles (user_id, usage_reset_date) VALUES (?, ?)")
        .bind(user_id)
        .bind(fresh.usage_reset_date)
        .execute(pool)
        .await?;

    get_user_profile(pool, user_id)
        .await?
        .ok_or(StorageError::NotFound("user profile"))
}

pub async fn get_user_profile(
    pool: &DbPool,
    user_id: &str,
) -> Result<Option<UserProfile>, StorageError> {
    let row = sqlx::query(
        "SELECT user_id, subscription_status, monthly_usage, usage_reset_date FROM user_profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(profile_from_row).transpose()
}

pub async fn set_subscription_status(
    pool: &DbPool,
    user_id: &str,
    status: SubscriptionStatus,
) -> Result<(), StorageError> {
    let updated = sqlx::query("UPDATE user_profiles SET subscription_status = ? WHERE user_id = ?")
        .bind(status.to_string())
        .bind(user_id)
        .execute(pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(StorageError::NotFound("user profile"));
    }
    Ok(())
}

/// Apply the monthly reset if its date has passed and return the profile.
pub async fn refresh_usage_period(
    pool: &DbPool,
    user_id: &str,
    today: NaiveDate,
) -> Result<UserProfile, StorageError> {
    let profile = get_user_profile(pool, user_id)
        .await?
        .ok_or(StorageError::NotFound("user profile"))?;
    if !profile.usage.is_due(today) {
        return Ok(profile);
    }

    let rolled = profile.usage.rolled_over(today);
    sqlx::query(
        "UPDATE user_profiles SET monthly_usage = 0, usage_reset_date = ? WHERE user_id = ? AND usage_reset_date <= ?",
    )
    .bind(rolled.usage_reset_date)
    .bind(user_id)
    .bind(today)
    .execute(pool)
    .await?;
    tracing::info!(user_id, next_reset = %rolled.usage_reset_date, "Monthly usage reset");

    get_user_profile(pool, user_id)
        .await?
        .ok_or(StorageError::NotFound("user profile"))
}

fn profile_from_row(row: &SqliteRow) -> Result<UserProfile, StorageError> {
    let status: String = row.try_get("subscription_status")?;
    Ok(UserProfile {
        user_id: row.try_get("user_id")?,
        subscription_status: status
            .parse()
            .map_err(|e| StorageError::corrupt("user_profiles", e))?,
        usage: UsageLedger {
            monthly_usage: count(row.try_get("monthly_usage")?),
            usage_reset_date: row.try_get("usage_reset_date")?,
        },
    })
}

// ── Accounts ──────────────────────────────────────────────────────────────────

pub async fn insert_account(
    pool: &DbPool,
    user_id: &str,
    name: &str,
) -> Result<Account, StorageError> {
    let id: i64 = sqlx::query_scalar("INSERT INTO accounts (user_id, name) VALUES (?, ?) RETURNING id")
        .bind(user_id)
        .bind(name)
        .fetch_one(pool)
        .await?;

    Ok(Account { id: AccountId(id), user_id: user_id.to_string(), name: name.to_string() })
}

pub async fn get_account(pool: &DbPool, id: AccountId) -> Result<Option<Account>, StorageError> {
    let row = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, user_id, name FROM accounts WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Account { id: AccountId(r.0), user_id: r.1, name: r.2 }))
}

// ── Batches ───────────────────────────────────────────────────────────────────

const BATCH_COLUMNS: &str =
    "id, account_id, file_count, total_pages, csv_format, status, processed_at, edit_count, download_count";

/// Create an admitted batch in `processing`.
pub async fn insert_batch(
    pool: &DbPool,
    account_id: AccountId,
    admission: &Admission,
    now: DateTime<Utc>,
) -> Result<Batch, StorageError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO batches (account_id, file_count, total_pages, csv_format, status, processed_at) VALUES (?, ?, ?, ?, 'processing', ?) RETURNING id",
    )
    .bind(account_id.0)
    .bind(i64::from(admission.file_count))
    .bind(i64::from(admission.total_pages))
    .bind(admission.csv_format.as_str())
    .bind(now)
    .fetch_one(pool)
    .await?;

    tracing::info!(batch_id = id, %account_id, files = admission.file_count, "Batch created");
    get_batch(pool, BatchId(id))
        .await?
        .ok_or(StorageError::NotFound("batch"))
}

pub async fn get_batch(pool: &DbPool, id: BatchId) -> Result<Option<Batch>, StorageError> {
    let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM batches WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(batch_from_row).transpose()
}

/// Move a batch from `processing` to `completed` and charge its pages to the
/// owner's monthly usage, atomically.
///
/// A batch that is not in `processing` is rejected, so a retried completion
/// never charges twice. If the conditional usage increment fails because
/// other batches used up the cap in the meantime, nothing is charged and the
/// batch is marked `failed`.
pub async fn complete_batch(
    pool: &DbPool,
    id: BatchId,
    now: DateTime<Utc>,
) -> Result<Batch, StorageError> {
    let mut tx = pool.begin().await?;

    let flipped = sqlx::query(
        "UPDATE batches SET status = 'completed', processed_at = ? WHERE id = ? AND status = 'processing'",
    )
    .bind(now)
    .bind(id.0)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if flipped == 0 {
        tx.rollback().await?;
        let batch = get_batch(pool, id).await?.ok_or(StorageError::NotFound("batch"))?;
        return Err(BatchError::NotProcessing(batch.status).into());
    }

    let pages: i64 = sqlx::query_scalar("SELECT total_pages FROM batches WHERE id = ?")
        .bind(id.0)
        .fetch_one(&mut *tx)
        .await?;

    let charged = sqlx::query(
        r#"
        UPDATE user_profiles
        SET monthly_usage = monthly_usage + ?1
        WHERE user_id = (
            SELECT a.user_id FROM accounts a JOIN batches b ON b.account_id = a.id WHERE b.id = ?2
        )
        AND monthly_usage + ?1 <= ?3
        "#,
    )
    .bind(pages)
    .bind(id.0)
    .bind(i64::from(MONTHLY_PAGE_LIMIT))
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if charged == 0 {
        tx.rollback().await?;
        mark_batch_failed(pool, id).await?;
        let current: i64 = sqlx::query_scalar(
            r#"
            SELECT p.monthly_usage FROM user_profiles p
            JOIN accounts a ON a.user_id = p.user_id
            JOIN batches b ON b.account_id = a.id
            WHERE b.id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(pool)
        .await?
        .unwrap_or(0);
        tracing::warn!(batch_id = %id, current, pages, "Usage cap reached at completion, batch failed");
        return Err(CapacityError {
            current_usage: count(current),
            requested_pages: count(pages),
            limit: MONTHLY_PAGE_LIMIT,
        }
        .into());
    }

    tx.commit().await?;
    tracing::info!(batch_id = %id, pages, "Batch completed");

    get_batch(pool, id)
        .await?
        .ok_or(StorageError::NotFound("batch"))
}

/// Returns whether the batch was still `processing`.
pub async fn mark_batch_failed(pool: &DbPool, id: BatchId) -> Result<bool, StorageError> {
    let updated = sqlx::query("UPDATE batches SET status = 'failed' WHERE id = ? AND status = 'processing'")
        .bind(id.0)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(updated > 0)
}

pub async fn record_download(pool: &DbPool, id: BatchId) -> Result<(), StorageError> {
    sqlx::query("UPDATE batches SET download_count = download_count + 1 WHERE id = ?")
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch, StorageError> {
    let csv_format: String = row.try_get("csv_format")?;
    let status: String = row.try_get("status")?;
    Ok(Batch {
        id: BatchId(row.try_get("id")?),
        account_id: AccountId(row.try_get("account_id")?),
        file_count: count(row.try_get("file_count")?),
        total_pages: count(row.try_get("total_pages")?),
        csv_format: CsvFormat::from_str(&csv_format).map_err(|e| StorageError::corrupt("batches", e))?,
        status: BatchStatus::from_str(&status).map_err(|e| StorageError::corrupt("batches", e))?,
        processed_at: row.try_get("processed_at")?,
        edit_count: count(row.try_get("edit_count")?),
        download_count: count(row.try_get("download_count")?),
    })
}

// ── Extractions ───────────────────────────────────────────────────────────────

const EXTRACTION_COLUMNS: &str = "id, batch_id, filename, file_hash, date, vendor, amount, description, transaction_type, classification_confidence, engine_used, confidence_score, error";

pub struct NewExtraction<'a> {
    pub filename: &'a str,
    pub file_hash: &'a str,
    pub data: &'a ExtractedData,
    pub engine_used: EngineUsed,
    pub confidence_score: f32,
    pub error: Option<&'a str>,
}

pub async fn insert_extraction(
    pool: &DbPool,
    batch_id: BatchId,
    new: &NewExtraction<'_>,
) -> Result<ExtractionId, StorageError> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO extractions (
            batch_id, filename, file_hash, date, vendor, amount, description,
            transaction_type, classification_confidence, engine_used, confidence_score, error
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(batch_id.0)
    .bind(new.filename)
    .bind(new.file_hash)
    .bind(new.data.date.as_str())
    .bind(new.data.vendor.as_str())
    .bind(new.data.amount.as_str())
    .bind(new.data.description.as_str())
    .bind(new.data.transaction_type.to_string())
    .bind(f64::from(new.data.classification_confidence))
    .bind(new.engine_used.to_string())
    .bind(f64::from(new.confidence_score))
    .bind(new.error)
    .fetch_one(pool)
    .await?;

    Ok(ExtractionId(id))
}

pub async fn get_extraction(
    pool: &DbPool,
    id: ExtractionId,
) -> Result<Option<Extraction>, StorageError> {
    let row = sqlx::query(&format!("SELECT {EXTRACTION_COLUMNS} FROM extractions WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(extraction_from_row).transpose()
}

/// All extractions of a batch in ingestion order.
pub async fn get_extractions_for_batch(
    pool: &DbPool,
    batch_id: BatchId,
) -> Result<Vec<Extraction>, StorageError> {
    let rows = sqlx::query(&format!(
        "SELECT {EXTRACTION_COLUMNS} FROM extractions WHERE batch_id = ? ORDER BY id"
    ))
    .bind(batch_id.0)
    .fetch_all(pool)
    .await?;

    rows.iter().map(extraction_from_row).collect()
}

/// Store an already-validated field value and bump the batch's edit counter.
/// The write only happens while the owning batch is `completed`.
pub async fn update_extraction_field(
    pool: &DbPool,
    id: ExtractionId,
    field: Field,
    value: &str,
) -> Result<Extraction, StorageError> {
    let mut tx = pool.begin().await?;

    // Column names come from the closed `Field` enum, never from input.
    let updated = sqlx::query(&format!(
        "UPDATE extractions SET {} = ? WHERE id = ? AND batch_id IN (SELECT id FROM batches WHERE status = 'completed')",
        field.as_str()
    ))
    .bind(value)
    .bind(id.0)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if updated == 0 {
        tx.rollback().await?;
        let extraction = get_extraction(pool, id)
            .await?
            .ok_or(StorageError::NotFound("extraction"))?;
        let batch = get_batch(pool, extraction.batch_id)
            .await?
            .ok_or(StorageError::NotFound("batch"))?;
        return Err(BatchError::NotCompleted { action: GatedAction::Edit, status: batch.status }.into());
    }

    sqlx::query(
        "UPDATE batches SET edit_count = edit_count + 1 WHERE id = (SELECT batch_id FROM extractions WHERE id = ?)",
    )
    .bind(id.0)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    get_extraction(pool, id)
        .await?
        .ok_or(StorageError::NotFound("extraction"))
}

fn extraction_from_row(row: &SqliteRow) -> Result<Extraction, StorageError> {
    let transaction_type: String = row.try_get("transaction_type")?;
    let engine_used: String = row.try_get("engine_used")?;
    let classification_confidence: f64 = row.try_get("classification_confidence")?;
    let confidence_score: f64 = row.try_get("confidence_score")?;

    Ok(Extraction {
        id: ExtractionId(row.try_get("id")?),
        batch_id: BatchId(row.try_get("batch_id")?),
        filename: row.try_get("filename")?,
        file_hash: row.try_get("file_hash")?,
        data: ExtractedData {
            date: row.try_get("date")?,
            vendor: row.try_get("vendor")?,
            amount: row.try_get("amount")?,
            description: row.try_get("description")?,
            transaction_type: TransactionType::from_str(&transaction_type)
                .map_err(|e| StorageError::corrupt("extractions", e))?,
            classification_confidence: classification_confidence as f32,
        },
        engine_used: EngineUsed::from_str(&engine_used)
            .map_err(|e| StorageError::corrupt("extractions", e))?,
        confidence_score: confidence_score as f32,
        error: row.try_get("error")?,
    })
}

fn count(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
