use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::error::ErrorKind;
use crate::format::CsvFormat;
use crate::usage::{CapacityError, UsageLedger};

pub const MAX_FILES_PER_BATCH: usize = 10;

/// Page counting is not implemented; every file is billed as one page.
pub const PAGES_PER_FILE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(pub i64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A client account a bookkeeper processes receipts for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: String,
    pub name: String,
}

/// Identity and entitlement of the caller, passed explicitly into every
/// operation instead of being read from shared session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub subscription_active: bool,
}

impl UserContext {
    pub fn owns(&self, account: &Account) -> bool {
        account.user_id == self.user_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    /// Only reached when completion loses a race for the last pages of
    /// the monthly cap, or through manual intervention.
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Processing => write!(f, "processing"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(format!("Unknown batch status: '{other}'")),
        }
    }
}

/// Operations that require a completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedAction {
    Edit,
    Export,
}

impl fmt::Display for GatedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatedAction::Edit => write!(f, "edit"),
            GatedAction::Export => write!(f, "export"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub account_id: AccountId,
    pub file_count: u32,
    pub total_pages: u32,
    pub csv_format: CsvFormat,
    pub status: BatchStatus,
    pub processed_at: DateTime<Utc>,
    pub edit_count: u32,
    pub download_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Cannot {action} a batch that is {status}; wait until processing has completed")]
    NotCompleted { action: GatedAction, status: BatchStatus },
    #[error("Batch is already {0}")]
    NotProcessing(BatchStatus),
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Conflict
    }
}

impl Batch {
    /// Edits and exports are only allowed once every file has been ingested.
    pub fn ensure_completed(&self, action: GatedAction) -> Result<(), BatchError> {
        if self.status != BatchStatus::Completed {
            return Err(BatchError::NotCompleted { action, status: self.status });
        }
        Ok(())
    }

    /// Completion is a one-shot transition out of `processing`.
    pub fn ensure_processing(&self) -> Result<(), BatchError> {
        if self.status != BatchStatus::Processing {
            return Err(BatchError::NotProcessing(self.status));
        }
        Ok(())
    }
}

// ── Admission control ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error("A batch must contain between 1 and {MAX_FILES_PER_BATCH} files, got {0}")]
    FileCount(usize),
    #[error(transparent)]
    Format(#[from] crate::format::FormatError),
    #[error("Account does not belong to the current user")]
    AccountNotOwned,
    #[error("An active subscription is required")]
    SubscriptionInactive,
    #[error(transparent)]
    Capacity(#[from] CapacityError),
}

impl AdmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmissionError::FileCount(_) | AdmissionError::Format(_) => ErrorKind::Validation,
            AdmissionError::AccountNotOwned => ErrorKind::Authorization,
            AdmissionError::SubscriptionInactive => ErrorKind::Subscription,
            AdmissionError::Capacity(_) => ErrorKind::Capacity,
        }
    }
}

pub struct BatchRequest<'a> {
    pub account: &'a Account,
    pub csv_format: &'a str,
    pub file_count: usize,
}

/// What a batch was admitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub csv_format: CsvFormat,
    pub file_count: u32,
    pub total_pages: u32,
}

/// Checks run, in order, before a batch may enter `processing`.
pub fn admit(
    user: &UserContext,
    request: &BatchRequest<'_>,
    usage: &UsageLedger,
    today: NaiveDate,
) -> Result<Admission, AdmissionError> {
    if !(1..=MAX_FILES_PER_BATCH).contains(&request.file_count) {
        return Err(AdmissionError::FileCount(request.file_count));
    }
    let csv_format: CsvFormat = request.csv_format.parse()?;
    if !user.owns(request.account) {
        return Err(AdmissionError::AccountNotOwned);
    }
    if !user.subscription_active {
        return Err(AdmissionError::SubscriptionInactive);
    }

    // Bounded by MAX_FILES_PER_BATCH above.
    let file_count = request.file_count as u32;
    let total_pages = file_count * PAGES_PER_FILE;
    usage.check_capacity(total_pages, today)?;

    Ok(Admission { csv_format, file_count, total_pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn account() -> Account {
        Account { id: AccountId(1), user_id: "user-1".into(), name: "ClientCo".into() }
    }

    fn user() -> UserContext {
        UserContext { user_id: "user-1".into(), subscription_active: true }
    }

    fn usage(n: u32) -> UsageLedger {
        UsageLedger { monthly_usage: n, usage_reset_date: date(2024, 7, 1) }
    }

    fn request(account: &Account, files: usize) -> BatchRequest<'_> {
        BatchRequest { account, csv_format: "3-column", file_count: files }
    }

    fn batch(status: BatchStatus) -> Batch {
        Batch {
            id: BatchId(1),
            account_id: AccountId(1),
            file_count: 1,
            total_pages: 1,
            csv_format: CsvFormat::ThreeColumn,
            status,
            processed_at: Utc::now(),
            edit_count: 0,
            download_count: 0,
        }
    }

    fn today() -> NaiveDate {
        date(2024, 6, 10)
    }

    #[test]
    fn admits_valid_request() {
        let acct = account();
        let a = admit(&user(), &request(&acct, 3), &usage(0), today()).unwrap();
        assert_eq!(a.csv_format, CsvFormat::ThreeColumn);
        assert_eq!(a.total_pages, 3);
    }

    #[test]
    fn file_count_bounds() {
        let acct = account();
        assert_eq!(
            admit(&user(), &request(&acct, 0), &usage(0), today()),
            Err(AdmissionError::FileCount(0))
        );
        assert_eq!(
            admit(&user(), &request(&acct, 11), &usage(0), today()),
            Err(AdmissionError::FileCount(11))
        );
        assert!(admit(&user(), &request(&acct, 10), &usage(0), today()).is_ok());
    }

    #[test]
    fn rejects_unknown_format() {
        let acct = account();
        let req = BatchRequest { account: &acct, csv_format: "5-column", file_count: 1 };
        let err = admit(&user(), &req, &usage(0), today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn rejects_foreign_account() {
        let acct = Account { user_id: "someone-else".into(), ..account() };
        let err = admit(&user(), &request(&acct, 1), &usage(0), today()).unwrap_err();
        assert_eq!(err, AdmissionError::AccountNotOwned);
        assert_eq!(err.kind(), ErrorKind::Authorization);
    }

    #[test]
    fn rejects_inactive_subscription() {
        let acct = account();
        let u = UserContext { subscription_active: false, ..user() };
        let err = admit(&u, &request(&acct, 1), &usage(0), today()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Subscription);
    }

    #[test]
    fn usage_cap_boundary() {
        let acct = account();
        assert!(admit(&user(), &request(&acct, 5), &usage(1495), today()).is_ok());
        let err = admit(&user(), &request(&acct, 10), &usage(1495), today()).unwrap_err();
        assert!(matches!(
            err,
            AdmissionError::Capacity(CapacityError { current_usage: 1495, requested_pages: 10, limit: 1500 })
        ));
    }

    #[test]
    fn validation_runs_before_authorization() {
        let acct = Account { user_id: "someone-else".into(), ..account() };
        let err = admit(&user(), &request(&acct, 0), &usage(0), today()).unwrap_err();
        assert_eq!(err, AdmissionError::FileCount(0));
    }

    #[test]
    fn edit_and_export_require_completed() {
        assert!(batch(BatchStatus::Completed).ensure_completed(GatedAction::Export).is_ok());
        let err = batch(BatchStatus::Processing)
            .ensure_completed(GatedAction::Edit)
            .unwrap_err();
        assert_eq!(
            err,
            BatchError::NotCompleted { action: GatedAction::Edit, status: BatchStatus::Processing }
        );
        assert!(batch(BatchStatus::Failed).ensure_completed(GatedAction::Export).is_err());
    }

    #[test]
    fn completion_only_from_processing() {
        assert!(batch(BatchStatus::Processing).ensure_processing().is_ok());
        assert_eq!(
            batch(BatchStatus::Completed).ensure_processing(),
            Err(BatchError::NotProcessing(BatchStatus::Completed))
        );
    }
}
