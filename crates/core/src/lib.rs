//! Shared data model, error taxonomy, configuration, and template rendering
//! for the DispatchExpress scheduled-delivery engine.

pub mod config;
pub mod error;
pub mod templates;
pub mod types;

pub use error::{DispatchError, DispatchResult};
