//! HTTP API for the CRM

pub mod ai_handlers;
pub mod client_handlers;
pub mod handlers;
pub mod pipeline_handlers;
pub mod query;
pub mod routes;
pub mod task_handlers;

pub use query::*;
pub use routes::create_router;
