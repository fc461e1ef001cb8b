use crate::{
    ast::{
        ast::Identifier,
        expressions::{BinaryOperator, Expr, ExprKind},
        statements::{ClassDef, ExceptHandler, FunctionDef, ImportAlias, Stmt, StmtKind, WithItem},
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
    parser::{
        expr::{parse_expr, parse_expr_list, parse_parameters, parse_target_list, parse_yield_expr},
        lookups::{is_compound_statement, BindingPower},
    },
    Position, Span,
};

use super::parser::Parser;

/// Parses one logical line, or one compound statement with its block.
///
/// A line may hold several `;`-separated simple statements.
pub fn parse_statement(parser: &mut Parser) -> Result<Vec<Stmt>, Error> {
    match parser.current_token_kind() {
        TokenKind::Newline | TokenKind::Semicolon => {
            parser.advance();
            return Ok(vec![]);
        }
        TokenKind::Indent | TokenKind::Dedent => {
            return Err(Error::new(ErrorImpl::InconsistentIndentation, parser.get_position()));
        }
        kind if is_compound_statement(kind) => {
            let handler = parser.get_stmt_lookup().get(&kind).copied().ok_or_else(|| parser.unexpected())?;
            return Ok(vec![handler(parser)?]);
        }
        _ => {}
    }

    let mut stmts = vec![parse_simple_stmt(parser)?];
    while parser.eat(TokenKind::Semicolon) {
        if matches!(parser.current_token_kind(), TokenKind::Newline | TokenKind::EOF) {
            break;
        }
        stmts.push(parse_simple_stmt(parser)?);
    }

    if parser.current_token_kind() != TokenKind::EOF {
        parser.expect(TokenKind::Newline)?;
    }

    Ok(stmts)
}

fn parse_simple_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    if let Some(handler) = parser.get_stmt_lookup().get(&parser.current_token_kind()).copied() {
        return handler(parser);
    }

    let start = parser.get_position();
    let first = parse_expr_list(parser, BindingPower::Default)?;

    if parser.current_token_kind() == TokenKind::Assignment {
        let mut targets = vec![first];
        while parser.eat(TokenKind::Assignment) {
            targets.push(parse_assigned_value(parser)?);
        }
        let value = targets.pop().ok_or_else(|| parser.unexpected())?;

        return Ok(Stmt::new(StmtKind::Assign { targets, value }, parser.span_from(start)));
    }

    if parser.current_token_kind().is_augmented_assignment() {
        let operator = augmented_operator(parser.advance().kind);
        let value = parse_assigned_value(parser)?;

        return Ok(Stmt::new(
            StmtKind::AugAssign {
                target: first,
                operator,
                value,
            },
            parser.span_from(start),
        ));
    }

    if parser.eat(TokenKind::Colon) {
        let annotation = parse_expr(parser, BindingPower::Default)?;
        let value = if parser.eat(TokenKind::Assignment) {
            Some(parse_assigned_value(parser)?)
        } else {
            None
        };

        return Ok(Stmt::new(
            StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            },
            parser.span_from(start),
        ));
    }

    Ok(Stmt::new(StmtKind::Expression(first), parser.span_from(start)))
}

fn parse_assigned_value(parser: &mut Parser) -> Result<Expr, Error> {
    if parser.current_token_kind() == TokenKind::Yield {
        parse_yield_expr(parser)
    } else {
        parse_expr_list(parser, BindingPower::Default)
    }
}

fn augmented_operator(kind: TokenKind) -> BinaryOperator {
    match kind {
        TokenKind::PlusEquals => BinaryOperator::Add,
        TokenKind::MinusEquals => BinaryOperator::Sub,
        TokenKind::StarEquals => BinaryOperator::Mul,
        TokenKind::SlashEquals => BinaryOperator::Div,
        TokenKind::DoubleSlashEquals => BinaryOperator::FloorDiv,
        TokenKind::PercentEquals => BinaryOperator::Mod,
        TokenKind::PowerEquals => BinaryOperator::Pow,
        TokenKind::AmpersandEquals => BinaryOperator::BitAnd,
        TokenKind::PipeEquals => BinaryOperator::BitOr,
        TokenKind::CaretEquals => BinaryOperator::BitXor,
        TokenKind::ShiftLeftEquals => BinaryOperator::LShift,
        _ => BinaryOperator::RShift,
    }
}

/// Parses `: <block>`, either an indented suite or simple statements on the same line.
pub fn parse_block(parser: &mut Parser) -> Result<(Vec<Stmt>, Span), Error> {
    parser.nested(parse_suite)
}

fn parse_suite(parser: &mut Parser) -> Result<(Vec<Stmt>, Span), Error> {
    parser.expect(TokenKind::Colon)?;
    let mut body = vec![];

    if parser.eat(TokenKind::Newline) {
        parser.expect(TokenKind::Indent)?;
        while !matches!(parser.current_token_kind(), TokenKind::Dedent | TokenKind::EOF) {
            body.extend(parse_statement(parser)?);
        }
        parser.eat(TokenKind::Dedent);
    } else {
        body.extend(parse_statement(parser)?);
    }

    let span = match (body.first(), body.last()) {
        (Some(first), Some(last)) => Span::new(first.span.start, last.span.end),
        _ => Span::new(parser.last_end(), parser.last_end()),
    };

    Ok((body, span))
}

fn parse_identifier(parser: &mut Parser, message: &str) -> Result<Identifier, Error> {
    let error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from(message),
        },
        parser.get_position(),
    );
    let token = parser.expect_error(TokenKind::Identifier, Some(error))?;

    Ok(Identifier::new(token.value, token.span))
}

/// Parses `a.b.c` into a single identifier spanning all parts.
fn parse_dotted_name(parser: &mut Parser) -> Result<Identifier, Error> {
    let first = parse_identifier(parser, "expected module name")?;
    let mut name = first.name;
    let mut span = first.span;

    while parser.current_token_kind() == TokenKind::Dot && parser.peek_kind(1) == TokenKind::Identifier {
        parser.advance();
        let part = parser.advance();
        name.push('.');
        name.push_str(&part.value);
        span.end = part.span.end;
    }

    Ok(Identifier::new(name, span))
}

pub fn parse_function_def_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    parse_function_def(parser, vec![], None)
}

fn parse_function_def(parser: &mut Parser, decorators: Vec<Expr>, start: Option<Position>) -> Result<Stmt, Error> {
    let def = parser.advance();
    let start = start.unwrap_or(def.span.start);
    let name = parse_identifier(parser, "expected function name")?;

    let open = parser.expect(TokenKind::OpenParen)?;
    let parameters = parse_parameters(parser, TokenKind::CloseParen, true)?;
    parser.expect(TokenKind::CloseParen)?;
    let parameters_span = parser.span_from(open.span.start);

    let returns = if parser.eat(TokenKind::Arrow) {
        Some(parse_expr(parser, BindingPower::Default)?)
    } else {
        None
    };

    let (body, body_span) = parse_block(parser)?;

    Ok(Stmt::new(
        StmtKind::FunctionDef(FunctionDef {
            name,
            parameters,
            returns,
            decorators,
            body,
            parameters_span,
            body_span,
        }),
        parser.span_from(start),
    ))
}

pub fn parse_class_def_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    parse_class_def(parser, vec![], None)
}

fn parse_class_def(parser: &mut Parser, decorators: Vec<Expr>, start: Option<Position>) -> Result<Stmt, Error> {
    let class = parser.advance();
    let start = start.unwrap_or(class.span.start);
    let name = parse_identifier(parser, "expected class name")?;

    let mut bases = vec![];
    if parser.eat(TokenKind::OpenParen) {
        while parser.current_token_kind() != TokenKind::CloseParen {
            if parser.current_token_kind() == TokenKind::Identifier && parser.peek_kind(1) == TokenKind::Assignment {
                // Keywords such as `metaclass=` do not contribute bases.
                parser.advance();
                parser.advance();
                parse_expr(parser, BindingPower::Default)?;
            } else {
                bases.push(parse_expr(parser, BindingPower::Default)?);
            }

            if !parser.eat(TokenKind::Comma) {
                break;
            }
        }
        parser.expect(TokenKind::CloseParen)?;
    }

    let (body, body_span) = parse_block(parser)?;

    Ok(Stmt::new(
        StmtKind::ClassDef(ClassDef {
            name,
            bases,
            decorators,
            body,
            body_span,
        }),
        parser.span_from(start),
    ))
}

pub fn parse_decorated_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.get_position();
    let mut decorators = vec![];

    while parser.eat(TokenKind::At) {
        decorators.push(parse_expr(parser, BindingPower::Default)?);
        parser.expect(TokenKind::Newline)?;
    }

    match parser.current_token_kind() {
        TokenKind::Def => parse_function_def(parser, decorators, Some(start)),
        TokenKind::Class => parse_class_def(parser, decorators, Some(start)),
        _ => Err(Error::new(
            ErrorImpl::UnexpectedTokenDetailed {
                token: parser.current_token().value.clone(),
                message: String::from("expected function or class after decorator"),
            },
            parser.get_position(),
        )),
    }
}

pub fn parse_if_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let test = parse_expr(parser, BindingPower::Default)?;
    let (body, _) = parse_block(parser)?;

    let orelse = match parser.current_token_kind() {
        TokenKind::Elif => vec![parse_if_stmt(parser)?],
        TokenKind::Else => {
            parser.advance();
            parse_block(parser)?.0
        }
        _ => vec![],
    };

    Ok(Stmt::new(StmtKind::If { test, body, orelse }, parser.span_from(start)))
}

fn parse_else_block(parser: &mut Parser) -> Result<Vec<Stmt>, Error> {
    if parser.eat(TokenKind::Else) {
        Ok(parse_block(parser)?.0)
    } else {
        Ok(vec![])
    }
}

pub fn parse_for_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let target = parse_target_list(parser)?;
    parser.expect(TokenKind::In)?;
    let iter = parse_expr_list(parser, BindingPower::Default)?;
    let (body, _) = parse_block(parser)?;
    let orelse = parse_else_block(parser)?;

    Ok(Stmt::new(
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        },
        parser.span_from(start),
    ))
}

pub fn parse_while_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let test = parse_expr(parser, BindingPower::Default)?;
    let (body, _) = parse_block(parser)?;
    let orelse = parse_else_block(parser)?;

    Ok(Stmt::new(StmtKind::While { test, body, orelse }, parser.span_from(start)))
}

pub fn parse_try_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let (body, _) = parse_block(parser)?;

    let mut handlers = vec![];
    while parser.current_token_kind() == TokenKind::Except {
        let handler_start = parser.advance().span.start;
        let mut exception = None;
        let mut name = None;

        if parser.current_token_kind() != TokenKind::Colon {
            exception = Some(parse_expr_list(parser, BindingPower::Default)?);
            if parser.eat(TokenKind::As) || parser.eat(TokenKind::Comma) {
                name = Some(parse_identifier(parser, "expected exception name")?);
            }
        }

        let (handler_body, _) = parse_block(parser)?;
        handlers.push(ExceptHandler {
            exception,
            name,
            body: handler_body,
            span: parser.span_from(handler_start),
        });
    }

    let orelse = parse_else_block(parser)?;
    let finalbody = if parser.eat(TokenKind::Finally) {
        parse_block(parser)?.0
    } else {
        vec![]
    };

    Ok(Stmt::new(
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        },
        parser.span_from(start),
    ))
}

pub fn parse_with_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let mut items = vec![];

    loop {
        let context = parse_expr(parser, BindingPower::Default)?;
        let target = if parser.eat(TokenKind::As) {
            Some(parse_expr(parser, BindingPower::Relational)?)
        } else {
            None
        };
        items.push(WithItem { context, target });

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    let (body, _) = parse_block(parser)?;

    Ok(Stmt::new(StmtKind::With { items, body }, parser.span_from(start)))
}

pub fn parse_return_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let value = if parser.current_token_kind().ends_expression() {
        None
    } else {
        Some(parse_expr_list(parser, BindingPower::Default)?)
    };

    Ok(Stmt::new(StmtKind::Return(value), parser.span_from(start)))
}

pub fn parse_import_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let mut names = vec![];

    loop {
        let name = parse_dotted_name(parser)?;
        let alias = if parser.eat(TokenKind::As) {
            Some(parse_identifier(parser, "expected alias name")?)
        } else {
            None
        };
        names.push(ImportAlias { name, alias });

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    Ok(Stmt::new(StmtKind::Import(names), parser.span_from(start)))
}

pub fn parse_import_from_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;

    let mut level = 0;
    loop {
        match parser.current_token_kind() {
            TokenKind::Dot => level += 1,
            TokenKind::Ellipsis => level += 3,
            _ => break,
        }
        parser.advance();
    }

    let module = if parser.current_token_kind() == TokenKind::Identifier {
        Some(parse_dotted_name(parser)?)
    } else {
        None
    };

    parser.expect(TokenKind::Import)?;

    let mut names = vec![];
    if parser.current_token_kind() == TokenKind::Star {
        let star = parser.advance();
        names.push(ImportAlias {
            name: Identifier::new("*", star.span),
            alias: None,
        });
    } else {
        let parenthesized = parser.eat(TokenKind::OpenParen);

        loop {
            if parenthesized && parser.current_token_kind() == TokenKind::CloseParen {
                break;
            }

            let name = parse_identifier(parser, "expected name to import")?;
            let alias = if parser.eat(TokenKind::As) {
                Some(parse_identifier(parser, "expected alias name")?)
            } else {
                None
            };
            names.push(ImportAlias { name, alias });

            if !parser.eat(TokenKind::Comma) {
                break;
            }
        }

        if parenthesized {
            parser.expect(TokenKind::CloseParen)?;
        }
    }

    Ok(Stmt::new(StmtKind::ImportFrom { module, level, names }, parser.span_from(start)))
}

pub fn parse_global_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let keyword = parser.advance();
    let mut names = vec![parse_identifier(parser, "expected name")?];
    while parser.eat(TokenKind::Comma) {
        names.push(parse_identifier(parser, "expected name")?);
    }

    let kind = if keyword.kind == TokenKind::Global {
        StmtKind::Global(names)
    } else {
        StmtKind::Nonlocal(names)
    };

    Ok(Stmt::new(kind, parser.span_from(keyword.span.start)))
}

pub fn parse_assert_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let test = parse_expr(parser, BindingPower::Default)?;
    let message = if parser.eat(TokenKind::Comma) {
        Some(parse_expr(parser, BindingPower::Default)?)
    } else {
        None
    };

    Ok(Stmt::new(StmtKind::Assert { test, message }, parser.span_from(start)))
}

pub fn parse_raise_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let exception = if parser.current_token_kind().ends_expression() {
        None
    } else {
        let exception = parse_expr(parser, BindingPower::Default)?;
        if parser.eat(TokenKind::From) {
            parse_expr(parser, BindingPower::Default)?;
        }
        Some(exception)
    };

    Ok(Stmt::new(StmtKind::Raise(exception), parser.span_from(start)))
}

pub fn parse_delete_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let start = parser.advance().span.start;
    let targets = match parse_expr_list(parser, BindingPower::Default)? {
        Expr {
            kind: ExprKind::Tuple(elements),
            ..
        } => elements,
        target => vec![target],
    };

    Ok(Stmt::new(StmtKind::Delete(targets), parser.span_from(start)))
}

pub fn parse_keyword_stmt(parser: &mut Parser) -> Result<Stmt, Error> {
    let token = parser.advance();
    let kind = match token.kind {
        TokenKind::Break => StmtKind::Break,
        TokenKind::Continue => StmtKind::Continue,
        _ => StmtKind::Pass,
    };

    Ok(Stmt::new(kind, token.span))
}
