pub mod db;
pub mod error;

pub use db::{
    complete_batch, create_db, ensure_user_profile, get_account, get_batch, get_extraction,
    get_extractions_for_batch, get_user_profile, insert_account, insert_batch, insert_extraction,
    mark_batch_failed, record_download, refresh_usage_period, set_subscription_status,
    update_extraction_field, DbPool, NewExtraction, SubscriptionStatus, UserProfile,
};
pub use error::StorageError;
