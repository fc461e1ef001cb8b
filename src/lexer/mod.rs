//! Lexical analysis.
//!
//! This module contains the lexer (tokenizer) that converts source text
//! into a stream of tokens for parsing. It handles:
//!
//! - Tokenization of source code using regex patterns
//! - Recognition of keywords, identifiers, literals, and operators
//! - Indentation tracking (`Indent`/`Dedent`) and significant newlines
//! - Line joining inside brackets and after a trailing backslash
//! - Comments and whitespace handling

pub mod lexer;
pub mod tokens;
