pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use auth::{AuthUser, Claims};
pub use config::Config;
pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
pub use telemetry::init_tracing;
