use chrono::NaiveDate;
use quillbook_core::{is_known, Amount, CsvFormat, Extraction, TransactionType};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer error: {0}")]
    Buffer(String),
    #[error("CSV output is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

const FALLBACK_DESCRIPTION: &str = "Receipt";

/// Render a batch's extractions as a header-less QuickBooks CSV body.
///
/// Extractions without a usable non-zero amount are left out. An empty
/// string is a valid result.
pub fn render_csv(
    format: CsvFormat,
    processed_on: NaiveDate,
    extractions: &[Extraction],
) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    let mut written = 0usize;
    for extraction in extractions {
        if let Some(row) = build_row(format, processed_on, extraction) {
            writer.write_record(&row)?;
            written += 1;
        }
    }
    tracing::info!(rows = written, skipped = extractions.len() - written, "CSV rendered");

    let bytes = writer.into_inner().map_err(|e| ExportError::Buffer(e.to_string()))?;
    let mut body = String::from_utf8(bytes)?;
    // Rows are newline-joined, not newline-terminated.
    if body.ends_with('\n') {
        body.pop();
    }
    Ok(body)
}

/// The CSV fields for one extraction, or `None` when it must be skipped.
pub fn build_row(
    format: CsvFormat,
    processed_on: NaiveDate,
    extraction: &Extraction,
) -> Option<Vec<String>> {
    let data = &extraction.data;

    if !is_known(&data.amount) {
        return None;
    }
    let amount = match Amount::magnitude_of(&data.amount) {
        Some(a) if !a.is_zero() => a,
        Some(_) => return None,
        None => {
            tracing::warn!(
                extraction_id = %extraction.id,
                amount = %data.amount,
                "Skipping row with unparseable amount"
            );
            return None;
        }
    };

    let date = if is_known(&data.date) {
        data.date.trim().to_string()
    } else {
        format.format_date(processed_on)
    };
    let description = describe(&data.vendor, &data.description, &extraction.filename);

    let row = match format {
        CsvFormat::ThreeColumn => {
            vec![date, description, amount.signed(data.transaction_type).to_string()]
        }
        CsvFormat::FourColumn => {
            let (credit, debit) = match data.transaction_type {
                TransactionType::Income => (amount.to_string(), String::new()),
                TransactionType::Expense => (String::new(), amount.to_string()),
            };
            vec![date, description, credit, debit]
        }
    };
    Some(row)
}

fn describe(vendor: &str, description: &str, filename: &str) -> String {
    match (is_known(vendor), is_known(description)) {
        (true, true) => format!("{} - {}", vendor.trim(), description.trim()),
        (true, false) => vendor.trim().to_string(),
        (false, true) => description.trim().to_string(),
        (false, false) if !filename.trim().is_empty() => filename.trim().to_string(),
        (false, false) => FALLBACK_DESCRIPTION.to_string(),
    }
}
