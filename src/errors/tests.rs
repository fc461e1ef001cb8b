//! Unit tests for error handling.
//!
//! This module contains tests for error types and error reporting.

use crate::errors::errors::{Error, ErrorImpl, ErrorTip};
use crate::Position;

#[test]
fn test_error_creation() {
    let error = Error::new(
        ErrorImpl::UnrecognisedToken {
            token: "$".to_string(),
        },
        Position::new(1, 10, 10),
    );

    assert_eq!(error.get_error_name(), "UnrecognisedToken");
    assert!(matches!(error.get_tip(), ErrorTip::None));
}

#[test]
fn test_error_position() {
    let pos = Position::new(3, 7, 42);
    let error = Error::new(
        ErrorImpl::UnexpectedToken {
            token: "identifier".to_string(),
        },
        pos,
    );

    assert_eq!(error.get_position().line, 3);
    assert_eq!(error.get_position().column, 7);
}

#[test]
fn test_module_not_found_tip() {
    let error = Error::new(
        ErrorImpl::ModuleNotFound {
            module: "this_does_not_exist".to_string(),
        },
        Position::new(1, 5, 5),
    );

    assert_eq!(error.get_error_name(), "ModuleNotFound");
    assert_eq!(
        error.get_tip().to_string(),
        "Module `this_does_not_exist` was not found in the search paths"
    );
}

#[test]
fn test_first_argument_tip() {
    let error = Error::new(
        ErrorImpl::FirstArgumentName {
            function: "__new__".to_string(),
            expected: "cls".to_string(),
        },
        Position::new(2, 9, 20),
    );

    assert_eq!(error.get_error_name(), "FirstArgumentName");
    assert!(error.get_tip().to_string().contains("`cls`"));
}

#[test]
fn test_error_display_includes_position() {
    let error = Error::new(
        ErrorImpl::UnresolvedImport {
            name: "nor_does_this".to_string(),
            module: "missing".to_string(),
        },
        Position::new(4, 2, 30),
    );

    assert_eq!(
        error.to_string(),
        "cannot import \"nor_does_this\" from \"missing\" at 4:2"
    );
}

#[test]
fn test_errors_compare_by_value() {
    let a = Error::new(ErrorImpl::InconsistentIndentation, Position::new(1, 0, 0));
    let b = Error::new(ErrorImpl::InconsistentIndentation, Position::new(1, 0, 0));
    let c = Error::new(ErrorImpl::InconsistentIndentation, Position::new(2, 0, 5));

    assert_eq!(a, b);
    assert_ne!(a, c);
}
