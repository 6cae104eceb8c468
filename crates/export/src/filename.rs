use std::sync::OnceLock;

use chrono::NaiveDate;
use quillbook_core::CsvFormat;
use regex::Regex;

const FALLBACK_ACCOUNT_SEGMENT: &str = "Account";

fn re_unsafe_run() -> &'static Regex {
    static R: OnceLock<Regex> = OnceLock::new();
    R.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("invalid regex"))
}

/// Replace every run of characters outside `[A-Za-z0-9]` with a single `_`
/// and trim underscores from both ends.
pub fn sanitize_account_name(name: &str) -> String {
    re_unsafe_run().replace_all(name, "_").trim_matches('_').to_string()
}

/// `QuickBooks_{Account}_{YYYY-MM-DD}_{format}.csv`. The date is always ISO
/// so downloads sort chronologically whatever the CSV's own date convention.
pub fn export_filename(account_name: &str, processed_on: NaiveDate, format: CsvFormat) -> String {
    let account = sanitize_account_name(account_name);
    let account = if account.is_empty() { FALLBACK_ACCOUNT_SEGMENT } else { account.as_str() };
    format!("QuickBooks_{account}_{}_{format}.csv", processed_on.format("%Y-%m-%d"))
}
