//! Abstract types inferred for declarations and expressions.
//!
//! - `types` holds the type variants and how they render
//! - `merge` combines types and validates call site hints

pub mod merge;
pub mod types;
