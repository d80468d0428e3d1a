//! Everything derived from a collection's field descriptors: write validation,
//! document shaping, and the join pipeline used on reads.

pub mod document;
pub mod join;
pub mod validation;

pub use document::{Document, FieldValue, ShapeError};
pub use join::{JoinPipeline, Lookup, ReadPlan};
pub use validation::{Rule, RuleKind, ValidationErrors, ValidationSchema};
