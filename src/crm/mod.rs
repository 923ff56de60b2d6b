//! CRM domain: clients, stages, pipeline and tasks
//!
//! [`CrmManager`] holds the business rules on top of a [`crate::store::CrmStore`];
//! the HTTP layer only maps requests and errors.

pub mod manager;
pub mod models;
pub mod pipeline;
pub mod seed;
pub mod validation;

pub use manager::{CrmError, CrmManager, CrmResult};
pub use models::*;
pub use pipeline::StageTier;
pub use validation::FieldError;
