use std::collections::HashMap;

use crate::{ast::{expressions::Expr, statements::Stmt}, errors::errors::Error, lexer::tokens::TokenKind};

use super::{expr::*, parser::Parser, stmt::*};

#[derive(PartialEq, PartialOrd, Clone, Copy, Debug)]
pub enum BindingPower {
    Default,
    Lambda,
    Ternary,
    LogicalOr,
    LogicalAnd,
    LogicalNot,
    Relational,
    BitOr,
    BitXor,
    BitAnd,
    Shift,
    Additive,
    Multiplicative,
    Unary,
    Power,
    Call,
    Member,
    Primary,
}

pub type StmtHandler = fn(&mut Parser) -> Result<Stmt, Error>;
pub type NUDHandler = fn(&mut Parser) -> Result<Expr, Error>;
pub type LEDHandler = fn(&mut Parser, Expr, BindingPower) -> Result<Expr, Error>;

pub fn create_token_lookups(parser: &mut Parser) {
    // Conditional expression
    parser.led(TokenKind::If, BindingPower::Ternary, parse_if_expr);

    // Logical
    parser.led(TokenKind::Or, BindingPower::LogicalOr, parse_bool_expr);
    parser.led(TokenKind::And, BindingPower::LogicalAnd, parse_bool_expr);

    // Relational
    parser.led(TokenKind::Less, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::LessEquals, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::Greater, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::GreaterEquals, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::Equals, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::NotEquals, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::In, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::Not, BindingPower::Relational, parse_compare_expr);
    parser.led(TokenKind::Is, BindingPower::Relational, parse_compare_expr);

    // Bitwise
    parser.led(TokenKind::Pipe, BindingPower::BitOr, parse_binary_expr);
    parser.led(TokenKind::Caret, BindingPower::BitXor, parse_binary_expr);
    parser.led(TokenKind::Ampersand, BindingPower::BitAnd, parse_binary_expr);
    parser.led(TokenKind::ShiftLeft, BindingPower::Shift, parse_binary_expr);
    parser.led(TokenKind::ShiftRight, BindingPower::Shift, parse_binary_expr);

    // Additive and multiplicative
    parser.led(TokenKind::Plus, BindingPower::Additive, parse_binary_expr);
    parser.led(TokenKind::Dash, BindingPower::Additive, parse_binary_expr);
    parser.led(TokenKind::Star, BindingPower::Multiplicative, parse_binary_expr);
    parser.led(TokenKind::At, BindingPower::Multiplicative, parse_binary_expr);
    parser.led(TokenKind::Slash, BindingPower::Multiplicative, parse_binary_expr);
    parser.led(TokenKind::DoubleSlash, BindingPower::Multiplicative, parse_binary_expr);
    parser.led(TokenKind::Percent, BindingPower::Multiplicative, parse_binary_expr);
    parser.led(TokenKind::DoubleStar, BindingPower::Power, parse_binary_expr);

    // Call, subscript and member
    parser.led(TokenKind::OpenParen, BindingPower::Call, parse_call_expr);
    parser.led(TokenKind::OpenBracket, BindingPower::Call, parse_subscript_expr);
    parser.led(TokenKind::Dot, BindingPower::Member, parse_member_expr);

    // Literals and symbols
    parser.nud(TokenKind::Number, parse_primary_expr);
    parser.nud(TokenKind::Float, parse_primary_expr);
    parser.nud(TokenKind::String, parse_primary_expr);
    parser.nud(TokenKind::Bytes, parse_primary_expr);
    parser.nud(TokenKind::Identifier, parse_primary_expr);
    parser.nud(TokenKind::True, parse_primary_expr);
    parser.nud(TokenKind::False, parse_primary_expr);
    parser.nud(TokenKind::None, parse_primary_expr);
    parser.nud(TokenKind::Ellipsis, parse_primary_expr);
    parser.nud(TokenKind::Dash, parse_prefix_expr);
    parser.nud(TokenKind::Plus, parse_prefix_expr);
    parser.nud(TokenKind::Tilde, parse_prefix_expr);
    parser.nud(TokenKind::Not, parse_not_expr);
    parser.nud(TokenKind::OpenParen, parse_grouping_expr);
    parser.nud(TokenKind::OpenBracket, parse_list_expr);
    parser.nud(TokenKind::OpenCurly, parse_curly_expr);
    parser.nud(TokenKind::Lambda, parse_lambda_expr);
    parser.nud(TokenKind::Yield, parse_yield_expr);

    // Statements
    parser.stmt(TokenKind::Def, parse_function_def_stmt);
    parser.stmt(TokenKind::Class, parse_class_def_stmt);
    parser.stmt(TokenKind::At, parse_decorated_stmt);
    parser.stmt(TokenKind::If, parse_if_stmt);
    parser.stmt(TokenKind::For, parse_for_stmt);
    parser.stmt(TokenKind::While, parse_while_stmt);
    parser.stmt(TokenKind::Try, parse_try_stmt);
    parser.stmt(TokenKind::With, parse_with_stmt);
    parser.stmt(TokenKind::Return, parse_return_stmt);
    parser.stmt(TokenKind::Import, parse_import_stmt);
    parser.stmt(TokenKind::From, parse_import_from_stmt);
    parser.stmt(TokenKind::Global, parse_global_stmt);
    parser.stmt(TokenKind::Nonlocal, parse_global_stmt);
    parser.stmt(TokenKind::Assert, parse_assert_stmt);
    parser.stmt(TokenKind::Raise, parse_raise_stmt);
    parser.stmt(TokenKind::Del, parse_delete_stmt);
    parser.stmt(TokenKind::Pass, parse_keyword_stmt);
    parser.stmt(TokenKind::Break, parse_keyword_stmt);
    parser.stmt(TokenKind::Continue, parse_keyword_stmt);
}

/// Statements that own an indented block and end their own line.
pub fn is_compound_statement(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Def
            | TokenKind::Class
            | TokenKind::At
            | TokenKind::If
            | TokenKind::For
            | TokenKind::While
            | TokenKind::Try
            | TokenKind::With
    )
}

// Lookup tables inside parser struct, so it's easier
pub type StmtLookup = HashMap<TokenKind, StmtHandler>;
pub type NUDLookup = HashMap<TokenKind, NUDHandler>;
pub type LEDLookup = HashMap<TokenKind, LEDHandler>;
pub type BPLookup = HashMap<TokenKind, BindingPower>;
