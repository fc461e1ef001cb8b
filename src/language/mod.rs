//! The query surface of the analysis.
//!
//! [`language::LanguageSupport`] ties the configuration, the document
//! source and the background parser together and answers questions about
//! analysed documents: the declaration under a cursor, the type of a
//! declaration and the problems of a document.

pub mod language;

#[cfg(test)]
mod tests;
