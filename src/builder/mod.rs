//! Turns a parsed module into declarations, contexts and uses.
//!
//! - `declaration_builder` runs the build phases of a document and records
//!   parameter hints learned from call sites
//! - `expression_visitor` computes the type of an expression
//! - `use_builder` resolves the names a document reads

pub mod declaration_builder;
pub mod expression_visitor;
pub mod use_builder;

#[cfg(test)]
mod tests;
