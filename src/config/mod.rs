//! Configuration module
//!
//! Loads and validates session configuration files: the zone ladder,
//! challenge policies, exemptions, and runtime settings.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator, check_zone_references, suggest_zone};
