//! Unit tests for the parser module.
//!
//! This module contains tests for parsing various language constructs including:
//! - Assignments and augmented assignments
//! - Function and class definitions
//! - Expressions and operator precedence
//! - Control flow statements
//! - Imports
//! - Error recovery

use super::parser::{parse_source, ParseResult};
use crate::ast::{
    expressions::{BinaryOperator, CompareOperator, ExprKind, ParameterKind},
    statements::{Stmt, StmtKind},
};

fn parse_ok(source: &str) -> Vec<Stmt> {
    let result: ParseResult = parse_source(source).unwrap();
    assert!(result.errors.is_empty(), "unexpected errors: {:?}", result.errors);
    result.module.body
}

#[test]
fn test_parse_assignment() {
    let body = parse_ok("a = 3");
    assert_eq!(body.len(), 1);

    let StmtKind::Assign { targets, value } = &body[0].kind else {
        panic!("expected assignment");
    };
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].as_name(), Some("a"));
    assert_eq!(value.kind, ExprKind::Number("3".to_string()));
}

#[test]
fn test_parse_chained_and_tuple_assignment() {
    let body = parse_ok("a = b = 1\nx, y = 1, 'two'");

    let StmtKind::Assign { targets, .. } = &body[0].kind else {
        panic!("expected assignment");
    };
    assert_eq!(targets.len(), 2);

    let StmtKind::Assign { targets, value } = &body[1].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(&targets[0].kind, ExprKind::Tuple(items) if items.len() == 2));
    assert!(matches!(&value.kind, ExprKind::Tuple(items) if items.len() == 2));
}

#[test]
fn test_parse_augmented_assignment() {
    let body = parse_ok("a += 1\nb //= 2");
    assert!(matches!(
        body[0].kind,
        StmtKind::AugAssign {
            operator: BinaryOperator::Add,
            ..
        }
    ));
    assert!(matches!(
        body[1].kind,
        StmtKind::AugAssign {
            operator: BinaryOperator::FloorDiv,
            ..
        }
    ));
}

#[test]
fn test_parse_semicolon_separated_statements() {
    let body = parse_ok("a = 1; b = 2; pass");
    assert_eq!(body.len(), 3);
    assert!(matches!(body[2].kind, StmtKind::Pass));
}

#[test]
fn test_parse_operator_precedence() {
    let body = parse_ok("a + b * c");
    let StmtKind::Expression(expr) = &body[0].kind else {
        panic!("expected expression");
    };
    let ExprKind::Binary { operator, right, .. } = &expr.kind else {
        panic!("expected binary expression");
    };
    assert_eq!(*operator, BinaryOperator::Add);
    assert!(matches!(
        right.kind,
        ExprKind::Binary {
            operator: BinaryOperator::Mul,
            ..
        }
    ));
}

#[test]
fn test_parse_compare_not_in() {
    let body = parse_ok("a not in b");
    let StmtKind::Expression(expr) = &body[0].kind else {
        panic!("expected expression");
    };
    assert!(matches!(
        expr.kind,
        ExprKind::Compare {
            operator: CompareOperator::NotIn,
            ..
        }
    ));
}

#[test]
fn test_parse_function_definition() {
    let body = parse_ok("def foo(self, a, b=3, *args, **kwargs):\n    return a + b\n");
    let StmtKind::FunctionDef(def) = &body[0].kind else {
        panic!("expected function");
    };
    assert_eq!(def.name.name, "foo");
    assert_eq!(def.parameters.len(), 5);
    assert!(def.parameters[2].default.is_some());
    assert_eq!(def.parameters[3].kind, ParameterKind::VarArgs);
    assert_eq!(def.parameters[4].kind, ParameterKind::KwArgs);
    assert_eq!(def.body.len(), 1);
    assert!(matches!(def.body[0].kind, StmtKind::Return(Some(_))));
}

#[test]
fn test_parse_function_name_span() {
    let body = parse_ok("def foo(): pass");
    let StmtKind::FunctionDef(def) = &body[0].kind else {
        panic!("expected function");
    };
    assert_eq!(def.name.span.start.column, 4);
    assert_eq!(def.name.span.end.column, 7);
}

#[test]
fn test_parse_decorated_class() {
    let body = parse_ok("@decorator\nclass A(B, metaclass=M):\n    x = 1\n    def f(self): pass\n");
    let StmtKind::ClassDef(class) = &body[0].kind else {
        panic!("expected class");
    };
    assert_eq!(class.name.name, "A");
    assert_eq!(class.decorators.len(), 1);
    assert_eq!(class.bases.len(), 1);
    assert_eq!(class.body.len(), 2);
}

#[test]
fn test_parse_if_elif_else() {
    let body = parse_ok("if a:\n    pass\nelif b:\n    pass\nelse:\n    c = 1\n");
    let StmtKind::If { orelse, .. } = &body[0].kind else {
        panic!("expected if");
    };
    let StmtKind::If { orelse, .. } = &orelse[0].kind else {
        panic!("expected elif");
    };
    assert!(matches!(orelse[0].kind, StmtKind::Assign { .. }));
}

#[test]
fn test_parse_for_and_while() {
    let body = parse_ok("for i, j in pairs:\n    pass\nelse:\n    pass\nwhile x < 3:\n    x += 1\n");
    assert!(matches!(&body[0].kind, StmtKind::For { target, orelse, .. }
        if matches!(target.kind, ExprKind::Tuple(_)) && orelse.len() == 1));
    assert!(matches!(body[1].kind, StmtKind::While { .. }));
}

#[test]
fn test_parse_try_except() {
    let source = "try:\n    a = 1\nexcept ValueError as e:\n    pass\nexcept:\n    pass\nfinally:\n    pass\n";
    let body = parse_ok(source);
    let StmtKind::Try { handlers, finalbody, .. } = &body[0].kind else {
        panic!("expected try");
    };
    assert_eq!(handlers.len(), 2);
    assert_eq!(handlers[0].name.as_ref().map(|name| name.name.as_str()), Some("e"));
    assert!(handlers[1].exception.is_none());
    assert_eq!(finalbody.len(), 1);
}

#[test]
fn test_parse_with_statement() {
    let body = parse_ok("with open(f) as handle, lock:\n    pass\n");
    let StmtKind::With { items, .. } = &body[0].kind else {
        panic!("expected with");
    };
    assert_eq!(items.len(), 2);
    assert!(items[0].target.is_some());
    assert!(items[1].target.is_none());
}

#[test]
fn test_parse_imports() {
    let body = parse_ok("import os.path as p, sys\nfrom ..pkg.mod import (a, b as c,)\nfrom m import *\n");

    let StmtKind::Import(names) = &body[0].kind else {
        panic!("expected import");
    };
    assert_eq!(names[0].name.name, "os.path");
    assert_eq!(names[0].alias.as_ref().map(|alias| alias.name.as_str()), Some("p"));
    assert_eq!(names[1].name.name, "sys");

    let StmtKind::ImportFrom { module, level, names } = &body[1].kind else {
        panic!("expected from-import");
    };
    assert_eq!(module.as_ref().map(|module| module.name.as_str()), Some("pkg.mod"));
    assert_eq!(*level, 2);
    assert_eq!(names.len(), 2);

    let StmtKind::ImportFrom { names, .. } = &body[2].kind else {
        panic!("expected from-import");
    };
    assert_eq!(names[0].name.name, "*");
}

#[test]
fn test_parse_comprehensions_and_lambda() {
    let body = parse_ok("a = [x * 2 for x in range(3) if x]\nb = {k: v for k, v in d}\nc = lambda x, y=2: x");

    let StmtKind::Assign { value, .. } = &body[0].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(&value.kind, ExprKind::ListComp { generators, .. } if generators[0].conditions.len() == 1));

    let StmtKind::Assign { value, .. } = &body[1].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(value.kind, ExprKind::DictComp { .. }));

    let StmtKind::Assign { value, .. } = &body[2].kind else {
        panic!("expected assignment");
    };
    assert!(matches!(&value.kind, ExprKind::Lambda { parameters, .. } if parameters.len() == 2));
}

#[test]
fn test_parse_displays() {
    let body = parse_ok("a = ()\nb = (1,)\nc = {}\nd = {1, 2}\ne = x[1:2]\nf = 'a' 'b'");
    let values: Vec<&ExprKind> = body
        .iter()
        .map(|stmt| match &stmt.kind {
            StmtKind::Assign { value, .. } => &value.kind,
            _ => panic!("expected assignment"),
        })
        .collect();

    assert!(matches!(values[0], ExprKind::Tuple(items) if items.is_empty()));
    assert!(matches!(values[1], ExprKind::Tuple(items) if items.len() == 1));
    assert!(matches!(values[2], ExprKind::Dict(items) if items.is_empty()));
    assert!(matches!(values[3], ExprKind::Set(items) if items.len() == 2));
    assert!(matches!(values[4], ExprKind::Subscript { .. }));
    assert_eq!(*values[5], ExprKind::String("ab".to_string()));
}

#[test]
fn test_parse_yield_and_ternary() {
    let body = parse_ok("def g():\n    x = yield 1\n    yield\n    return a if b else c\n");
    let StmtKind::FunctionDef(def) = &body[0].kind else {
        panic!("expected function");
    };
    assert!(matches!(&def.body[0].kind, StmtKind::Assign { value, .. } if matches!(value.kind, ExprKind::Yield(Some(_)))));
    assert!(matches!(&def.body[1].kind, StmtKind::Expression(expr) if matches!(expr.kind, ExprKind::Yield(None))));
    assert!(matches!(&def.body[2].kind, StmtKind::Return(Some(expr)) if matches!(expr.kind, ExprKind::IfExpr { .. })));
}

#[test]
fn test_parse_error_recovery() {
    let result = parse_source("a = 1\nb = = 2\nc = 3\n").unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.module.body.len(), 2);
    assert_eq!(result.errors[0].get_position().line, 2);
}

#[test]
fn test_parse_error_recovery_skips_broken_block() {
    let result = parse_source("def f(x y):\n    pass\nx = 1\n").unwrap();
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.module.body.len(), 1);
    assert!(matches!(result.module.body[0].kind, StmtKind::Assign { .. }));
}

#[test]
fn test_parse_deep_but_bounded_nesting() {
    let source = format!("a = {}1{}", "(".repeat(150), ")".repeat(150));
    let body = parse_ok(&source);
    assert_eq!(body.len(), 1);
}

#[test]
fn test_parse_nesting_limit_reports_problem() {
    let source = format!("a = 1\nb = {}1{}\nc = 2\n", "(".repeat(400), ")".repeat(400));
    let result = parse_source(&source).unwrap();

    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].get_error_name(), "NestingTooDeep");
    assert_eq!(result.errors[0].get_position().line, 2);
    assert_eq!(result.module.body.len(), 2);
}

#[test]
fn test_parse_nesting_limit_counts_blocks() {
    let mut source = String::new();
    for level in 0..250 {
        source.push_str(&" ".repeat(level));
        source.push_str("if x:\n");
    }
    source.push_str(&" ".repeat(250));
    source.push_str("pass\ny = 1\n");

    let result = parse_source(&source).unwrap();
    assert!(result
        .errors
        .iter()
        .any(|error| error.get_error_name() == "NestingTooDeep"));
    assert!(result
        .module
        .body
        .iter()
        .any(|stmt| matches!(&stmt.kind, StmtKind::Assign { targets, .. } if targets[0].as_name() == Some("y"))));
}
