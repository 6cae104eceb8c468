use std::sync::Arc;

use quillbook_ai::{first_json_object, CompletionClient, CompletionRequest};
use quillbook_core::TransactionType;
use serde::Serialize;
use serde_json::Value;

use crate::rules::classify_by_rules;

const DEFAULT_AI_CONFIDENCE: f32 = 0.5;
const DEFAULT_REASONING: &str = "Classified by AI";

#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    pub vendor: &'a str,
    pub description: &'a str,
    pub amount: &'a str,
    pub account_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Ai,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub transaction_type: TransactionType,
    pub confidence: f32,
    pub reasoning: String,
    pub source: ClassificationSource,
}

/// Income/expense classifier: asks the AI first and falls back to
/// deterministic rules when the call or its reply is unusable. Never fails.
pub struct TransactionClassifier {
    client: Arc<dyn CompletionClient>,
}

impl TransactionClassifier {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn classify(&self, input: &ClassificationInput<'_>) -> Classification {
        let prompt = build_prompt(input);
        let reply = match self.client.complete(CompletionRequest::text(&prompt)).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, vendor = input.vendor, "Classification call failed, using rules");
                return classify_by_rules(input);
            }
        };

        match parse_reply(&reply) {
            Some(c) => c,
            None => {
                tracing::warn!(vendor = input.vendor, "Unusable classification reply, using rules");
                classify_by_rules(input)
            }
        }
    }
}

/// Inputs are substituted in a single pass, so text inside a value is
/// never treated as a placeholder.
fn build_prompt(input: &ClassificationInput<'_>) -> String {
    format!(
        r#"You classify a bookkeeping transaction for the client account "{account}" as income or expense.

Transaction:
- Vendor: {vendor}
- Description: {description}
- Amount: {amount}

Guidelines:
1. If the vendor name is the same as or similar to the account name (allow for abbreviations, suffixes like Inc/LLC/Ltd, and typos), the account's client is paying us: income.
2. Wording such as "payment received", "invoice" or "deposit" suggests income.
3. Wording such as "purchase", "bill", "expense" or "fee" suggests expense.
4. Receipts are usually expenses when nothing else applies.

Reply with a single JSON object and nothing else:
{{"transaction_type": "income" | "expense", "confidence": <number between 0 and 1>, "reasoning": "<one sentence>"}}"#,
        account = input.account_name,
        vendor = input.vendor,
        description = input.description,
        amount = input.amount,
    )
}

/// `None` means the reply must be replaced by the rule-based result.
fn parse_reply(reply: &str) -> Option<Classification> {
    let obj = first_json_object(reply)?;

    let transaction_type = match obj.get("transaction_type").and_then(Value::as_str)? {
        "income" => TransactionType::Income,
        "expense" => TransactionType::Expense,
        _ => return None,
    };

    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| (0.0..=1.0).contains(c))
        .map(|c| c as f32)
        .unwrap_or(DEFAULT_AI_CONFIDENCE);

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(DEFAULT_REASONING)
        .to_string();

    Some(Classification { transaction_type, confidence, reasoning, source: ClassificationSource::Ai })
}
