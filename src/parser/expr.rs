use crate::{
    ast::{
        ast::Identifier,
        expressions::{
            BinaryOperator, BoolOperator, CompareOperator, Comprehension, Expr, ExprKind, Keyword,
            Parameter, ParameterKind, UnaryOperator,
        },
    },
    errors::errors::{Error, ErrorImpl},
    lexer::tokens::TokenKind,
    Span,
};

use super::{lookups::BindingPower, parser::Parser};

pub fn parse_expr(parser: &mut Parser, bp: BindingPower) -> Result<Expr, Error> {
    parser.nested(|parser| parse_nud_and_leds(parser, bp))
}

fn parse_nud_and_leds(parser: &mut Parser, bp: BindingPower) -> Result<Expr, Error> {
    // First parse NUD
    let token_kind = parser.current_token_kind();
    let Some(nud) = parser.get_nud_lookup().get(&token_kind).copied() else {
        return Err(parser.unexpected());
    };

    let mut left = nud(parser)?;

    // While LED and current BP is less than BP of current token, continue parsing lhs
    while parser.binding_power(parser.current_token_kind()) > bp {
        let token_kind = parser.current_token_kind();
        let Some(led) = parser.get_led_lookup().get(&token_kind).copied() else {
            return Err(parser.unexpected());
        };

        left = led(parser, left, parser.binding_power(token_kind))?;
    }

    Ok(left)
}

/// Parses `a, b, c` into a tuple, or a single expression when there is no comma.
/// Starred items (`*rest`) are accepted.
pub fn parse_expr_list(parser: &mut Parser, bp: BindingPower) -> Result<Expr, Error> {
    let first = parse_star_or_expr(parser, bp)?;
    if parser.current_token_kind() != TokenKind::Comma {
        return Ok(first);
    }

    let start = first.span.start;
    let mut elements = vec![first];
    while parser.eat(TokenKind::Comma) {
        if parser.current_token_kind().ends_expression() || parser.current_token_kind() == TokenKind::In {
            break;
        }
        elements.push(parse_star_or_expr(parser, bp)?);
    }

    Ok(Expr::new(ExprKind::Tuple(elements), parser.span_from(start)))
}

fn parse_star_or_expr(parser: &mut Parser, bp: BindingPower) -> Result<Expr, Error> {
    if parser.current_token_kind() == TokenKind::Star {
        let start = parser.advance().span.start;
        let inner = parse_expr(parser, BindingPower::BitOr)?;
        return Ok(Expr::new(ExprKind::Starred(Box::new(inner)), parser.span_from(start)));
    }

    parse_expr(parser, bp)
}

pub fn parse_primary_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let token = parser.advance();
    let kind = match token.kind {
        TokenKind::Number => {
            if token.value.is_empty() {
                return Err(Error::new(ErrorImpl::NumberParseError { token: token.value }, token.span.start));
            }
            ExprKind::Number(token.value)
        }
        TokenKind::Float => ExprKind::Float(token.value),
        TokenKind::Identifier => ExprKind::Name(token.value),
        TokenKind::True => ExprKind::Bool(true),
        TokenKind::False => ExprKind::Bool(false),
        TokenKind::None => ExprKind::None,
        TokenKind::Ellipsis => ExprKind::Ellipsis,
        TokenKind::String | TokenKind::Bytes => {
            // Adjacent literals are concatenated.
            let mut value = token.value;
            while matches!(parser.current_token_kind(), TokenKind::String | TokenKind::Bytes) {
                value.push_str(&parser.advance().value);
            }
            if token.kind == TokenKind::Bytes {
                ExprKind::Bytes(value)
            } else {
                ExprKind::String(value)
            }
        }
        _ => {
            return Err(Error::new(ErrorImpl::UnexpectedToken { token: token.value }, token.span.start));
        }
    };

    Ok(Expr::new(kind, parser.span_from(token.span.start)))
}

pub fn parse_binary_expr(parser: &mut Parser, left: Expr, bp: BindingPower) -> Result<Expr, Error> {
    let operator_token = parser.advance();
    let operator = match operator_token.kind {
        TokenKind::Plus => BinaryOperator::Add,
        TokenKind::Dash => BinaryOperator::Sub,
        TokenKind::Star => BinaryOperator::Mul,
        TokenKind::At => BinaryOperator::MatMul,
        TokenKind::Slash => BinaryOperator::Div,
        TokenKind::DoubleSlash => BinaryOperator::FloorDiv,
        TokenKind::Percent => BinaryOperator::Mod,
        TokenKind::DoubleStar => BinaryOperator::Pow,
        TokenKind::ShiftLeft => BinaryOperator::LShift,
        TokenKind::ShiftRight => BinaryOperator::RShift,
        TokenKind::Ampersand => BinaryOperator::BitAnd,
        TokenKind::Caret => BinaryOperator::BitXor,
        _ => BinaryOperator::BitOr,
    };

    // `**` is right associative and binds tighter than a unary minus on its right.
    let right_bp = if operator == BinaryOperator::Pow { BindingPower::Unary } else { bp };
    let right = parse_expr(parser, right_bp)?;
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        },
        parser.span_from(start),
    ))
}

pub fn parse_compare_expr(parser: &mut Parser, left: Expr, bp: BindingPower) -> Result<Expr, Error> {
    let operator_token = parser.advance();
    let operator = match operator_token.kind {
        TokenKind::Less => CompareOperator::Less,
        TokenKind::LessEquals => CompareOperator::LessEquals,
        TokenKind::Greater => CompareOperator::Greater,
        TokenKind::GreaterEquals => CompareOperator::GreaterEquals,
        TokenKind::Equals => CompareOperator::Equals,
        TokenKind::NotEquals => CompareOperator::NotEquals,
        TokenKind::In => CompareOperator::In,
        TokenKind::Not => {
            parser.expect(TokenKind::In)?;
            CompareOperator::NotIn
        }
        _ => {
            if parser.eat(TokenKind::Not) {
                CompareOperator::IsNot
            } else {
                CompareOperator::Is
            }
        }
    };

    let right = parse_expr(parser, bp)?;
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::Compare {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        },
        parser.span_from(start),
    ))
}

pub fn parse_bool_expr(parser: &mut Parser, left: Expr, bp: BindingPower) -> Result<Expr, Error> {
    let operator = if parser.advance().kind == TokenKind::And {
        BoolOperator::And
    } else {
        BoolOperator::Or
    };
    let right = parse_expr(parser, bp)?;
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::BoolOp {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        },
        parser.span_from(start),
    ))
}

pub fn parse_if_expr(parser: &mut Parser, body: Expr, bp: BindingPower) -> Result<Expr, Error> {
    parser.advance();
    let test = parse_expr(parser, bp)?;
    parser.expect(TokenKind::Else)?;
    let orelse = parse_expr(parser, BindingPower::Default)?;
    let start = body.span.start;

    Ok(Expr::new(
        ExprKind::IfExpr {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        },
        parser.span_from(start),
    ))
}

pub fn parse_prefix_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let operator_token = parser.advance();
    let operator = match operator_token.kind {
        TokenKind::Dash => UnaryOperator::Minus,
        TokenKind::Plus => UnaryOperator::Plus,
        _ => UnaryOperator::Invert,
    };
    let rhs = parse_expr(parser, BindingPower::Unary)?;

    Ok(Expr::new(
        ExprKind::Unary {
            operator,
            operand: Box::new(rhs),
        },
        parser.span_from(operator_token.span.start),
    ))
}

pub fn parse_not_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;
    let rhs = parse_expr(parser, BindingPower::LogicalNot)?;

    Ok(Expr::new(
        ExprKind::Unary {
            operator: UnaryOperator::Not,
            operand: Box::new(rhs),
        },
        parser.span_from(start),
    ))
}

pub fn parse_grouping_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;

    if parser.eat(TokenKind::CloseParen) {
        return Ok(Expr::new(ExprKind::Tuple(vec![]), parser.span_from(start)));
    }

    if parser.current_token_kind() == TokenKind::Yield {
        let expr = parse_yield_expr(parser)?;
        parser.expect(TokenKind::CloseParen)?;
        return Ok(expr);
    }

    let first = parse_star_or_expr(parser, BindingPower::Default)?;

    if parser.current_token_kind() == TokenKind::For {
        let generators = parse_comprehension_clauses(parser)?;
        parser.expect(TokenKind::CloseParen)?;
        return Ok(Expr::new(
            ExprKind::Generator {
                element: Box::new(first),
                generators,
            },
            parser.span_from(start),
        ));
    }

    if parser.current_token_kind() == TokenKind::Comma {
        let mut elements = vec![first];
        while parser.eat(TokenKind::Comma) {
            if parser.current_token_kind() == TokenKind::CloseParen {
                break;
            }
            elements.push(parse_star_or_expr(parser, BindingPower::Default)?);
        }
        parser.expect(TokenKind::CloseParen)?;
        return Ok(Expr::new(ExprKind::Tuple(elements), parser.span_from(start)));
    }

    parser.expect(TokenKind::CloseParen)?;
    Ok(first)
}

pub fn parse_list_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;

    if parser.eat(TokenKind::CloseBracket) {
        return Ok(Expr::new(ExprKind::List(vec![]), parser.span_from(start)));
    }

    let first = parse_star_or_expr(parser, BindingPower::Default)?;

    if parser.current_token_kind() == TokenKind::For {
        let generators = parse_comprehension_clauses(parser)?;
        parser.expect(TokenKind::CloseBracket)?;
        return Ok(Expr::new(
            ExprKind::ListComp {
                element: Box::new(first),
                generators,
            },
            parser.span_from(start),
        ));
    }

    let mut elements = vec![first];
    while parser.eat(TokenKind::Comma) {
        if parser.current_token_kind() == TokenKind::CloseBracket {
            break;
        }
        elements.push(parse_star_or_expr(parser, BindingPower::Default)?);
    }
    parser.expect(TokenKind::CloseBracket)?;

    Ok(Expr::new(ExprKind::List(elements), parser.span_from(start)))
}

/// Parses `{}` displays: dicts, sets and their comprehensions.
pub fn parse_curly_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;

    if parser.eat(TokenKind::CloseCurly) {
        return Ok(Expr::new(ExprKind::Dict(vec![]), parser.span_from(start)));
    }

    if parser.current_token_kind() == TokenKind::DoubleStar {
        // `{**other, ...}`; the unpacked mapping is kept as a key-less entry.
        return parse_dict_items(parser, start, None);
    }

    let first = parse_star_or_expr(parser, BindingPower::Default)?;

    if parser.eat(TokenKind::Colon) {
        let value = parse_expr(parser, BindingPower::Default)?;

        if parser.current_token_kind() == TokenKind::For {
            let generators = parse_comprehension_clauses(parser)?;
            parser.expect(TokenKind::CloseCurly)?;
            return Ok(Expr::new(
                ExprKind::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                },
                parser.span_from(start),
            ));
        }

        return parse_dict_items(parser, start, Some((first, value)));
    }

    if parser.current_token_kind() == TokenKind::For {
        let generators = parse_comprehension_clauses(parser)?;
        parser.expect(TokenKind::CloseCurly)?;
        return Ok(Expr::new(
            ExprKind::SetComp {
                element: Box::new(first),
                generators,
            },
            parser.span_from(start),
        ));
    }

    let mut elements = vec![first];
    while parser.eat(TokenKind::Comma) {
        if parser.current_token_kind() == TokenKind::CloseCurly {
            break;
        }
        elements.push(parse_star_or_expr(parser, BindingPower::Default)?);
    }
    parser.expect(TokenKind::CloseCurly)?;

    Ok(Expr::new(ExprKind::Set(elements), parser.span_from(start)))
}

fn parse_dict_items(
    parser: &mut Parser,
    start: crate::Position,
    first: Option<(Expr, Expr)>,
) -> Result<Expr, Error> {
    let mut items = vec![];
    let mut expect_item = first.is_none();
    if let Some(first) = first {
        items.push(first);
    }

    loop {
        if !expect_item && !parser.eat(TokenKind::Comma) {
            break;
        }
        expect_item = false;

        if parser.current_token_kind() == TokenKind::CloseCurly {
            break;
        }

        if parser.eat(TokenKind::DoubleStar) {
            parse_expr(parser, BindingPower::BitOr)?;
            continue;
        }

        let key = parse_expr(parser, BindingPower::Default)?;
        parser.expect(TokenKind::Colon)?;
        let value = parse_expr(parser, BindingPower::Default)?;
        items.push((key, value));
    }

    parser.expect(TokenKind::CloseCurly)?;
    Ok(Expr::new(ExprKind::Dict(items), parser.span_from(start)))
}

/// Parses one or more `for target in iter [if cond]` clauses.
pub fn parse_comprehension_clauses(parser: &mut Parser) -> Result<Vec<Comprehension>, Error> {
    let mut generators = vec![];

    while parser.current_token_kind() == TokenKind::For {
        let start = parser.advance().span.start;
        let target = parse_target_list(parser)?;
        parser.expect(TokenKind::In)?;
        let iter = parse_expr(parser, BindingPower::Ternary)?;

        let mut conditions = vec![];
        while parser.eat(TokenKind::If) {
            conditions.push(parse_expr(parser, BindingPower::Ternary)?);
        }

        generators.push(Comprehension {
            target,
            iter,
            conditions,
            span: parser.span_from(start),
        });
    }

    Ok(generators)
}

/// Parses the target of a `for` clause, stopping before `in`.
pub fn parse_target_list(parser: &mut Parser) -> Result<Expr, Error> {
    parse_expr_list(parser, BindingPower::Relational)
}

pub fn parse_lambda_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;
    let parameters = parse_parameters(parser, TokenKind::Colon, false)?;
    parser.expect(TokenKind::Colon)?;
    let body = parse_expr(parser, BindingPower::Default)?;

    Ok(Expr::new(
        ExprKind::Lambda {
            parameters,
            body: Box::new(body),
        },
        parser.span_from(start),
    ))
}

pub fn parse_yield_expr(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.advance().span.start;
    parser.eat(TokenKind::From);

    let value = if parser.current_token_kind().ends_expression() {
        None
    } else {
        Some(Box::new(parse_expr_list(parser, BindingPower::Default)?))
    };

    Ok(Expr::new(ExprKind::Yield(value), parser.span_from(start)))
}

/// Parses a parameter list up to (not including) `end`.
///
/// `annotations` enables `name: annotation`, which lambdas do not allow.
pub fn parse_parameters(parser: &mut Parser, end: TokenKind, annotations: bool) -> Result<Vec<Parameter>, Error> {
    let mut parameters = vec![];

    while parser.current_token_kind() != end {
        let kind = if parser.eat(TokenKind::Star) {
            ParameterKind::VarArgs
        } else if parser.eat(TokenKind::DoubleStar) {
            ParameterKind::KwArgs
        } else {
            ParameterKind::Positional
        };

        // A bare `*` or `/` only separates parameter groups.
        if parser.current_token_kind() == TokenKind::Comma || parser.eat(TokenKind::Slash) {
            parser.eat(TokenKind::Comma);
            continue;
        }

        let token = parser.expect_error(
            TokenKind::Identifier,
            Some(Error::new(
                ErrorImpl::UnexpectedTokenDetailed {
                    token: parser.current_token().value.clone(),
                    message: String::from("expected parameter name"),
                },
                parser.get_position(),
            )),
        )?;

        let annotation = if annotations && parser.eat(TokenKind::Colon) {
            Some(parse_expr(parser, BindingPower::Default)?)
        } else {
            None
        };

        let default = if parser.eat(TokenKind::Assignment) {
            Some(parse_expr(parser, BindingPower::Default)?)
        } else {
            None
        };

        parameters.push(Parameter {
            name: Identifier::new(token.value, token.span),
            kind,
            annotation,
            default,
        });

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    Ok(parameters)
}

pub fn parse_call_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.advance();

    let mut arguments = vec![];
    let mut keywords = vec![];
    let mut star_args = None;
    let mut kwargs = None;

    while parser.current_token_kind() != TokenKind::CloseParen {
        if parser.eat(TokenKind::Star) {
            star_args = Some(Box::new(parse_expr(parser, BindingPower::Default)?));
        } else if parser.eat(TokenKind::DoubleStar) {
            kwargs = Some(Box::new(parse_expr(parser, BindingPower::Default)?));
        } else if parser.current_token_kind() == TokenKind::Identifier && parser.peek_kind(1) == TokenKind::Assignment {
            let name = parser.advance();
            parser.advance();
            let value = parse_expr(parser, BindingPower::Default)?;
            keywords.push(Keyword {
                name: Identifier::new(name.value, name.span),
                value,
            });
        } else {
            let argument = parse_expr(parser, BindingPower::Default)?;

            if parser.current_token_kind() == TokenKind::For {
                let start = argument.span.start;
                let generators = parse_comprehension_clauses(parser)?;
                arguments.push(Expr::new(
                    ExprKind::Generator {
                        element: Box::new(argument),
                        generators,
                    },
                    parser.span_from(start),
                ));
            } else {
                arguments.push(argument);
            }
        }

        if !parser.eat(TokenKind::Comma) {
            break;
        }
    }

    parser.expect(TokenKind::CloseParen)?;
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::Call {
            callee: Box::new(left),
            arguments,
            keywords,
            star_args,
            kwargs,
        },
        parser.span_from(start),
    ))
}

pub fn parse_subscript_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    let open = parser.advance();

    let mut items = vec![parse_slice_item(parser)?];
    let mut is_tuple = false;
    while parser.eat(TokenKind::Comma) {
        is_tuple = true;
        if parser.current_token_kind() == TokenKind::CloseBracket {
            break;
        }
        items.push(parse_slice_item(parser)?);
    }
    parser.expect(TokenKind::CloseBracket)?;

    let index = if is_tuple {
        Expr::new(ExprKind::Tuple(items), parser.span_from(open.span.end))
    } else {
        items.remove(0)
    };
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::Subscript {
            value: Box::new(left),
            index: Box::new(index),
        },
        parser.span_from(start),
    ))
}

fn parse_slice_item(parser: &mut Parser) -> Result<Expr, Error> {
    let start = parser.get_position();
    let bound = |parser: &mut Parser| -> Result<Option<Box<Expr>>, Error> {
        if matches!(parser.current_token_kind(), TokenKind::Colon | TokenKind::Comma | TokenKind::CloseBracket) {
            Ok(None)
        } else {
            Ok(Some(Box::new(parse_expr(parser, BindingPower::Default)?)))
        }
    };

    let lower = bound(parser)?;
    if !parser.eat(TokenKind::Colon) {
        return lower.map(|lower| *lower).ok_or_else(|| parser.unexpected());
    }

    let upper = bound(parser)?;
    let step = if parser.eat(TokenKind::Colon) { bound(parser)? } else { None };

    Ok(Expr::new(ExprKind::Slice { lower, upper, step }, Span::new(start, parser.last_end())))
}

pub fn parse_member_expr(parser: &mut Parser, left: Expr, _bp: BindingPower) -> Result<Expr, Error> {
    parser.advance();
    let error = Error::new(
        ErrorImpl::UnexpectedTokenDetailed {
            token: parser.current_token().value.clone(),
            message: String::from("expected attribute name"),
        },
        parser.get_position(),
    );
    let member = parser.expect_error(TokenKind::Identifier, Some(error))?;
    let start = left.span.start;

    Ok(Expr::new(
        ExprKind::Attribute {
            value: Box::new(left),
            attribute: Identifier::new(member.value, member.span),
        },
        parser.span_from(start),
    ))
}
