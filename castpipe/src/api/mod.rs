//! HTTP API: submission, status polling, and byte-range audio streaming.

pub mod error;
pub mod models;
pub mod range;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{serve, ApiServerConfig, AppState};
