use quillbook_core::{is_known, TransactionType};

use crate::classifier::{Classification, ClassificationInput, ClassificationSource};

pub const INCOME_KEYWORDS: &[&str] = &["payment received", "invoice", "deposit"];
pub const EXPENSE_KEYWORDS: &[&str] = &["purchase", "bill", "expense", "fee"];

/// Deterministic classification used whenever the AI path is unavailable.
///
/// Rules are checked in priority order and the first hit wins:
/// account-name match, income keyword, expense keyword, default expense.
pub fn classify_by_rules(input: &ClassificationInput<'_>) -> Classification {
    let vendor = input.vendor.trim().to_lowercase();
    let account = input.account_name.trim().to_lowercase();
    let description = input.description.to_lowercase();

    if is_known(input.vendor)
        && !account.is_empty()
        && (vendor.contains(&account) || account.contains(&vendor))
    {
        return rule(
            TransactionType::Income,
            0.7,
            "Vendor matches the account name, so the client is paying us",
        );
    }

    if let Some(k) = first_keyword(INCOME_KEYWORDS, &[description.as_str(), vendor.as_str()]) {
        return rule(TransactionType::Income, 0.6, &format!("Mentions income keyword \"{k}\""));
    }
    if let Some(k) = first_keyword(EXPENSE_KEYWORDS, &[description.as_str(), vendor.as_str()]) {
        return rule(TransactionType::Expense, 0.6, &format!("Mentions expense keyword \"{k}\""));
    }

    rule(TransactionType::Expense, 0.3, "No strong signal; receipts default to expense")
}

/// First keyword contained in any of the (lowercased) texts.
fn first_keyword(keywords: &'static [&'static str], texts: &[&str]) -> Option<&'static str> {
    keywords.iter().copied().find(|k| texts.iter().any(|t| t.contains(k)))
}

fn rule(transaction_type: TransactionType, confidence: f32, reasoning: &str) -> Classification {
    Classification {
        transaction_type,
        confidence,
        reasoning: reasoning.to_string(),
        source: ClassificationSource::Rules,
    }
}
