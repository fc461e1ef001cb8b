use std::fmt::Display;

use thiserror::Error;

use crate::Position;

/// A problem found while reading, parsing or analysing a document.
///
/// Problems are attached to a document's top context and rebuilt on every
/// analysis run; the same type is used for failures outside analysis
/// (missing documents, unreadable configuration).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{internal_error} at {position}")]
pub struct Error {
    internal_error: ErrorImpl,
    position: Position,
}

impl Error {
    pub fn new(error_impl: ErrorImpl, position: Position) -> Self {
        Error {
            internal_error: error_impl,
            position,
        }
    }

    pub fn get_position(&self) -> &Position {
        &self.position
    }

    pub fn get_internal_error(&self) -> &ErrorImpl {
        &self.internal_error
    }

    pub fn get_error_name(&self) -> &str {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => "UnrecognisedToken",
            ErrorImpl::UnexpectedToken { .. } => "UnexpectedToken",
            ErrorImpl::UnexpectedTokenDetailed { .. } => "UnexpectedTokenDetailed",
            ErrorImpl::NumberParseError { .. } => "NumberParseError",
            ErrorImpl::InconsistentIndentation => "InconsistentIndentation",
            ErrorImpl::NestingTooDeep { .. } => "NestingTooDeep",
            ErrorImpl::ModuleNotFound { .. } => "ModuleNotFound",
            ErrorImpl::UnresolvedImport { .. } => "UnresolvedImport",
            ErrorImpl::FirstArgumentName { .. } => "FirstArgumentName",
            ErrorImpl::DocumentNotFound { .. } => "DocumentNotFound",
            ErrorImpl::DocumentUnreadable { .. } => "DocumentUnreadable",
            ErrorImpl::InvalidConfiguration { .. } => "InvalidConfiguration",
        }
    }

    pub fn get_tip(&self) -> ErrorTip {
        match &self.internal_error {
            ErrorImpl::UnrecognisedToken { .. } => ErrorTip::None,
            ErrorImpl::UnexpectedToken { token } => {
                ErrorTip::Suggestion(format!("Unexpected token: `{}`", token))
            }
            ErrorImpl::UnexpectedTokenDetailed { token, message } => {
                ErrorTip::Suggestion(format!("Unexpected token: `{}`, {}", token, message))
            }
            ErrorImpl::NumberParseError { token } => {
                ErrorTip::Suggestion(format!("Invalid number literal: `{}`", token))
            }
            ErrorImpl::InconsistentIndentation => ErrorTip::Suggestion(String::from(
                "Dedent does not match any outer indentation level",
            )),
            ErrorImpl::NestingTooDeep { limit } => ErrorTip::Suggestion(format!(
                "Expressions and blocks can be nested at most {} levels deep",
                limit
            )),
            ErrorImpl::ModuleNotFound { module } => ErrorTip::Suggestion(format!(
                "Module `{}` was not found in the search paths",
                module
            )),
            ErrorImpl::UnresolvedImport { name, module } => ErrorTip::Suggestion(format!(
                "Module `{}` has no declaration named `{}`",
                module, name
            )),
            ErrorImpl::FirstArgumentName { function, expected } => ErrorTip::Suggestion(format!(
                "First argument of `{}` should usually be called `{}`",
                function, expected
            )),
            ErrorImpl::DocumentNotFound { .. } => ErrorTip::None,
            ErrorImpl::DocumentUnreadable { message, .. } => ErrorTip::Suggestion(message.clone()),
            ErrorImpl::InvalidConfiguration { message } => ErrorTip::Suggestion(message.clone()),
        }
    }
}

pub enum ErrorTip {
    None,
    Suggestion(String),
}

impl Display for ErrorTip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorTip::None => write!(f, ""),
            ErrorTip::Suggestion(suggestion) => write!(f, "{}", suggestion),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ErrorImpl {
    #[error("unrecognised token: {token:?}")]
    UnrecognisedToken { token: String },
    #[error("unexpected token: {token:?}")]
    UnexpectedToken { token: String },
    #[error("unexpected token ({message:?}): {token:?}")]
    UnexpectedTokenDetailed { token: String, message: String },
    #[error("error parsing number: {token:?}")]
    NumberParseError { token: String },
    #[error("inconsistent indentation")]
    InconsistentIndentation,
    #[error("nesting deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
    #[error("module {module:?} not found")]
    ModuleNotFound { module: String },
    #[error("cannot import {name:?} from {module:?}")]
    UnresolvedImport { name: String, module: String },
    #[error("first argument of {function:?} should be {expected:?}")]
    FirstArgumentName { function: String, expected: String },
    #[error("document {document:?} not found")]
    DocumentNotFound { document: String },
    #[error("document {document:?} could not be read: {message}")]
    DocumentUnreadable { document: String, message: String },
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}
