//! Pure JSON-to-JSON payload transformation.
//!
//! The engine has no I/O and never fails on bad data: data problems degrade
//! into warnings on the [`MappingOutput`], and only structurally invalid
//! mappings return an error.

pub mod condition;
pub mod engine;
pub mod error;
pub mod path;
pub mod transform;

pub use engine::{MappingOutput, apply};
pub use error::MappingError;
pub use transform::TransformOutcome;
