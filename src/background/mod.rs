//! Background analysis of documents.
//!
//! - `source` provides document contents and revisions
//! - `job` parses and builds a single document, checking for aborts
//!   between phases
//! - `parser` runs jobs on worker threads in priority order and requeues
//!   documents whose imports were not analysed yet

pub mod job;
pub mod parser;
pub mod source;

#[cfg(test)]
mod tests;
