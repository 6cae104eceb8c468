pub mod csv;
pub mod filename;

pub use crate::csv::{build_row, render_csv, ExportError};
pub use filename::{export_filename, sanitize_account_name};
