//! Error types and problem reporting.
//!
//! This module defines the error type shared by every stage of the
//! analysis. It includes:
//!
//! - Error structures with source position information
//! - Specific error variants for lexing, parsing and analysis problems
//! - Helpful tips shown next to a problem

pub mod errors;

#[cfg(test)]
mod tests;
