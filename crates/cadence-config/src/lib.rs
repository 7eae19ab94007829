//! # Cadence Config
//!
//! TOML configuration for the Cadence scheduler: engine settings, logging
//! and the jobs to schedule at startup.

mod error;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
