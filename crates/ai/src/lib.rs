//! Boundary to the external AI completion service used for receipt
//! extraction and transaction classification.

pub mod client;
pub mod json;

pub use client::{
    AiSettings, Attachment, CompletionClient, CompletionError, CompletionRequest, MockCompletion,
    OpenAiClient,
};
pub use json::first_json_object;
