pub mod classifier;
pub mod rules;

pub use classifier::{
    Classification, ClassificationInput, ClassificationSource, TransactionClassifier,
};
pub use rules::{classify_by_rules, EXPENSE_KEYWORDS, INCOME_KEYWORDS};
