//! # Expression parser
//!
//! A standard precedence ladder (spec.md §4.2), right-recursive at each
//! binary level so associativity matches C exactly: assignment and the
//! conditional operator are right-associative, comma is left-associative
//! overall but implemented as right-recursion with itself as the lowest
//! level (the usual trick — each level only ever recurses into the next
//! tighter level on its left operand, and into itself on the right, which
//! reproduces left-associativity for all but assignment/conditional/comma).
//!
//! `primary` is also where the two lexer-hack disambiguations happen: a
//! parenthesized group is a cast if what follows `(` is a type-start token,
//! a statement-expression if it's `{`, otherwise a parenthesized expression;
//! and `sizeof`/`alignof` take a type argument under the same rule.

use std::rc::Rc;

use crate::ast::expr::{BinOp, Expression, ExpressionKind, InitializerElement, UnOp};
use crate::ast::types::{BuiltinKind, Type};
use crate::lexer::{IntBase, Location, TokenKind};
use crate::parser::{ParseError, ParseResult, Parser};

pub fn parse_expression(parser: &mut Parser) -> ParseResult<Expression> {
    parse_comma(parser)
}

fn parse_comma(parser: &mut Parser) -> ParseResult<Expression> {
    let lhs = parse_assignment(parser)?;
    if parser.eat(&TokenKind::Comma) {
        let loc = lhs.location;
        let rhs = parse_comma(parser)?;
        return Ok(Expression::new(
            ExpressionKind::BinOp {
                op: BinOp::Comma,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc,
        ));
    }
    Ok(lhs)
}

/// Assignment is right-associative: `a = b = c` parses as `a = (b = c)`.
pub fn parse_assignment(parser: &mut Parser) -> ParseResult<Expression> {
    let lhs = parse_conditional(parser)?;
    let op = match &parser.peek().kind {
        TokenKind::Assign => BinOp::Assign,
        TokenKind::PlusAssign => BinOp::AddAssign,
        TokenKind::MinusAssign => BinOp::SubAssign,
        TokenKind::StarAssign => BinOp::MulAssign,
        TokenKind::SlashAssign => BinOp::DivAssign,
        TokenKind::PercentAssign => BinOp::ModAssign,
        TokenKind::ShlAssign => BinOp::ShlAssign,
        TokenKind::ShrAssign => BinOp::ShrAssign,
        TokenKind::AndAssign => BinOp::AndAssign,
        TokenKind::OrAssign => BinOp::OrAssign,
        TokenKind::XorAssign => BinOp::XorAssign,
        _ => return Ok(lhs),
    };
    let loc = lhs.location;
    parser.bump();
    let rhs = parse_assignment(parser)?;
    Ok(Expression::new(
        ExpressionKind::BinOp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        loc,
    ))
}

fn parse_conditional(parser: &mut Parser) -> ParseResult<Expression> {
    let cond = parse_logical_or(parser)?;
    if parser.eat(&TokenKind::Question) {
        let loc = cond.location;
        let then_branch = parse_expression(parser)?;
        parser.expect(TokenKind::Colon, "':' in conditional expression")?;
        let else_branch = parse_conditional(parser)?;
        return Ok(Expression::new(
            ExpressionKind::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            },
            loc,
        ));
    }
    Ok(cond)
}

macro_rules! left_assoc_level {
    ($name:ident, $next:ident, { $($tok:pat => $op:expr),+ $(,)? }) => {
        fn $name(parser: &mut Parser) -> ParseResult<Expression> {
            let mut lhs = $next(parser)?;
            loop {
                let op = match &parser.peek().kind {
                    $($tok => $op,)+
                    _ => break,
                };
                let loc = lhs.location;
                parser.bump();
                let rhs = $next(parser)?;
                lhs = Expression::new(
                    ExpressionKind::BinOp { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    loc,
                );
            }
            Ok(lhs)
        }
    };
}

left_assoc_level!(parse_logical_or, parse_logical_and, { TokenKind::PipePipe => BinOp::LogOr });
left_assoc_level!(parse_logical_and, parse_bit_or, { TokenKind::AmpAmp => BinOp::LogAnd });
left_assoc_level!(parse_bit_or, parse_bit_xor, { TokenKind::Pipe => BinOp::BitOr });
left_assoc_level!(parse_bit_xor, parse_bit_and, { TokenKind::Caret => BinOp::BitXor });
left_assoc_level!(parse_bit_and, parse_equality, { TokenKind::Amp => BinOp::BitAnd });
left_assoc_level!(parse_equality, parse_relational, {
    TokenKind::Equal => BinOp::Eq,
    TokenKind::NotEqual => BinOp::Ne,
});
left_assoc_level!(parse_relational, parse_shift, {
    TokenKind::Lt => BinOp::Lt,
    TokenKind::Gt => BinOp::Gt,
    TokenKind::Le => BinOp::Le,
    TokenKind::Ge => BinOp::Ge,
});
left_assoc_level!(parse_shift, parse_additive, {
    TokenKind::Shl => BinOp::Shl,
    TokenKind::Shr => BinOp::Shr,
});
left_assoc_level!(parse_additive, parse_multiplicative, {
    TokenKind::Plus => BinOp::Add,
    TokenKind::Minus => BinOp::Sub,
});
left_assoc_level!(parse_multiplicative, parse_cast, {
    TokenKind::Star => BinOp::Mul,
    TokenKind::Slash => BinOp::Div,
    TokenKind::Percent => BinOp::Mod,
});

/// `( type-name ) cast-expr`, recognized by the same type-start lookahead
/// the declarator specifier pass uses. Anything else falls through to
/// unary (a plain parenthesized expression is handled in `primary`).
fn parse_cast(parser: &mut Parser) -> ParseResult<Expression> {
    if parser.check(&TokenKind::LParen) && looks_like_type_in_parens(parser) {
        let loc = parser.location();
        parser.bump();
        let target = parse_type_name(parser)?;
        parser.expect(TokenKind::RParen, "')' closing cast")?;
        let operand = parse_cast(parser)?;
        return Ok(Expression::new(
            ExpressionKind::Cast {
                target,
                operand: Box::new(operand),
            },
            loc,
        ));
    }
    parse_unary(parser)
}

fn looks_like_type_in_parens(parser: &Parser) -> bool {
    // peek_at(1) is the token right after '('; must itself start a type.
    matches!(
        &parser.peek_at(1).kind,
        TokenKind::Void
            | TokenKind::Char
            | TokenKind::Short
            | TokenKind::Int
            | TokenKind::Long
            | TokenKind::Float
            | TokenKind::Double
            | TokenKind::Signed
            | TokenKind::Unsigned
            | TokenKind::Bool
            | TokenKind::Complex
            | TokenKind::Float128
            | TokenKind::BuiltinVaList
            | TokenKind::Struct
            | TokenKind::Union
            | TokenKind::Enum
            | TokenKind::Const
            | TokenKind::Volatile
            | TokenKind::Restrict
    ) || matches!(&parser.peek_at(1).kind, TokenKind::Identifier(name) if parser.is_typedef_name(name))
}

/// Parses an abstract declarator's base type plus its (possibly empty)
/// suffix/pointer chunk, used for casts, `sizeof(T)`, and `alignof(T)`.
fn parse_type_name(parser: &mut Parser) -> ParseResult<Type> {
    let specs = crate::parser::declarator::parse_specifiers(parser)?;
    let base = specs.resolve_base_type(parser.location())?;
    let declarator = crate::parser::declarator::parse_declarator(parser)?;
    let (_, ty) = crate::parser::declarator::fold(&declarator, base);
    Ok(ty)
}

fn parse_unary(parser: &mut Parser) -> ParseResult<Expression> {
    let loc = parser.location();
    let op = match &parser.peek().kind {
        TokenKind::PlusPlus => Some(UnOp::PreInc),
        TokenKind::MinusMinus => Some(UnOp::PreDec),
        TokenKind::Amp => Some(UnOp::Addr),
        TokenKind::Star => Some(UnOp::Deref),
        TokenKind::Plus => None, // unary plus is a no-op, not represented
        TokenKind::Minus => Some(UnOp::Neg),
        TokenKind::Bang => Some(UnOp::Not),
        TokenKind::Tilde => Some(UnOp::BitNot),
        _ => {
            if parser.check(&TokenKind::Sizeof) || parser.check(&TokenKind::Alignof) {
                return parse_sizeof_alignof(parser);
            }
            return parse_postfix(parser);
        }
    };

    if parser.check(&TokenKind::Plus) {
        parser.bump();
        return parse_cast(parser);
    }

    parser.bump();
    match op {
        Some(op) => {
            let operand = parse_cast(parser)?;
            Ok(Expression::new(
                ExpressionKind::UnOp {
                    op,
                    operand: Box::new(operand),
                },
                loc,
            ))
        }
        None => parse_cast(parser),
    }
}

fn parse_sizeof_alignof(parser: &mut Parser) -> ParseResult<Expression> {
    let loc = parser.location();
    let is_sizeof = parser.check(&TokenKind::Sizeof);
    parser.bump();

    if parser.check(&TokenKind::LParen) && looks_like_type_in_parens(parser) {
        parser.bump();
        let ty = parse_type_name(parser)?;
        parser.expect(TokenKind::RParen, "')' closing sizeof/alignof type argument")?;
        let kind = if is_sizeof {
            ExpressionKind::SizeOfType(ty)
        } else {
            ExpressionKind::AlignOfType(ty)
        };
        return Ok(Expression::new(kind, loc));
    }

    let operand = parse_unary(parser)?;
    let kind = if is_sizeof {
        ExpressionKind::SizeOfExpr(Box::new(operand))
    } else {
        ExpressionKind::AlignOfExpr(Box::new(operand))
    };
    Ok(Expression::new(kind, loc))
}

fn parse_postfix(parser: &mut Parser) -> ParseResult<Expression> {
    let mut expr = parse_primary(parser)?;
    loop {
        let loc = expr.location;
        match &parser.peek().kind {
            TokenKind::LBracket => {
                parser.bump();
                let index = parse_expression(parser)?;
                parser.expect(TokenKind::RBracket, "']' closing index expression")?;
                expr = Expression::new(
                    ExpressionKind::Index {
                        base: Box::new(expr),
                        index: Box::new(index),
                    },
                    loc,
                );
            }
            TokenKind::LParen => {
                parser.bump();
                let mut args = Vec::new();
                if !parser.check(&TokenKind::RParen) {
                    loop {
                        args.push(parse_assignment(parser)?);
                        if !parser.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                parser.expect(TokenKind::RParen, "')' closing call arguments")?;
                expr = Expression::new(
                    ExpressionKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    loc,
                );
            }
            TokenKind::Dot | TokenKind::Arrow => {
                let is_arrow = parser.check(&TokenKind::Arrow);
                parser.bump();
                let member = match &parser.peek().kind {
                    TokenKind::Identifier(name) => name.clone(),
                    _ => return Err(ParseError::expected("a member name", parser.peek())),
                };
                parser.bump();
                expr = Expression::new(
                    ExpressionKind::MemberAccess {
                        base: Box::new(expr),
                        member,
                        is_arrow,
                    },
                    loc,
                );
            }
            TokenKind::PlusPlus => {
                parser.bump();
                expr = Expression::new(
                    ExpressionKind::UnOp {
                        op: UnOp::PostInc,
                        operand: Box::new(expr),
                    },
                    loc,
                );
            }
            TokenKind::MinusMinus => {
                parser.bump();
                expr = Expression::new(
                    ExpressionKind::UnOp {
                        op: UnOp::PostDec,
                        operand: Box::new(expr),
                    },
                    loc,
                );
            }
            _ => break,
        }
    }
    Ok(expr)
}

fn parse_primary(parser: &mut Parser) -> ParseResult<Expression> {
    let loc = parser.location();

    if parser.eat(&TokenKind::LParen) {
        if parser.check(&TokenKind::LBrace) {
            let body = crate::parser::stmt::parse_compound(parser)?;
            parser.expect(TokenKind::RParen, "')' closing statement expression")?;
            return Ok(Expression::new(ExpressionKind::StmtExpr(Box::new(body)), loc));
        }
        let inner = parse_expression(parser)?;
        parser.expect(TokenKind::RParen, "')' closing parenthesized expression")?;
        return Ok(inner);
    }

    if parser.eat(&TokenKind::LBrace) {
        return parse_initializer_list(parser, loc);
    }

    if parser.eat(&TokenKind::PrettyFunction) {
        return Ok(Expression::new(ExpressionKind::PrettyFunction, loc));
    }

    if parser.eat(&TokenKind::True) {
        return Ok(Expression::new(ExpressionKind::Bool(true), loc));
    }
    if parser.eat(&TokenKind::False) {
        return Ok(Expression::new(ExpressionKind::Bool(false), loc));
    }

    match parser.peek().kind.clone() {
        TokenKind::Identifier(name) => {
            parser.bump();
            Ok(Expression::new(ExpressionKind::DeclRef(name), loc))
        }
        TokenKind::Integer { value, base } => {
            parser.bump();
            let kind = integer_literal_kind(value, base);
            Ok(Expression::new(ExpressionKind::Int { value, kind }, loc))
        }
        TokenKind::CharLiteral(c) => {
            parser.bump();
            Ok(Expression::new(ExpressionKind::Char(c), loc))
        }
        TokenKind::StringLiteral(_) => parse_string_literal_run(parser, loc),
        _ => Err(ParseError::expected("an expression", parser.peek())),
    }
}

/// The literal's inferred builtin kind: a value that overflows `int` widens
/// to the next integer rank, matching how an unsuffixed literal in C is
/// classified by its value rather than its spelling.
fn integer_literal_kind(value: u64, _base: IntBase) -> BuiltinKind {
    if value <= i32::MAX as u64 {
        BuiltinKind::Int
    } else if value <= u32::MAX as u64 {
        BuiltinKind::UnsignedInt
    } else if value <= i64::MAX as u64 {
        BuiltinKind::Long
    } else {
        BuiltinKind::UnsignedLong
    }
}

/// Adjacent string literals are concatenated into a single `String`
/// expression node (spec §4.2).
fn parse_string_literal_run(parser: &mut Parser, loc: Location) -> ParseResult<Expression> {
    let mut combined = String::new();
    while let TokenKind::StringLiteral(raw) = &parser.peek().kind {
        combined.push_str(&unescape_string_lexeme(raw));
        parser.bump();
    }
    Ok(Expression::new(ExpressionKind::String(combined), loc))
}

/// Strips the surrounding quotes the lexer retained and keeps the escapes
/// already resolved to their literal characters.
fn unescape_string_lexeme(raw: &str) -> String {
    raw.trim_start_matches('"').trim_end_matches('"').to_string()
}

fn parse_initializer_list(parser: &mut Parser, loc: Location) -> ParseResult<Expression> {
    let mut elements = Vec::new();
    if !parser.check(&TokenKind::RBrace) {
        loop {
            let designator = if parser.check(&TokenKind::Dot) {
                parser.bump();
                let name = match &parser.peek().kind {
                    TokenKind::Identifier(name) => name.clone(),
                    _ => return Err(ParseError::expected("a designator name", parser.peek())),
                };
                parser.bump();
                parser.expect(TokenKind::Assign, "'=' after designator")?;
                Some(name)
            } else {
                None
            };
            let value = parse_assignment(parser)?;
            elements.push(InitializerElement { designator, value });
            if !parser.eat(&TokenKind::Comma) {
                break;
            }
            if parser.check(&TokenKind::RBrace) {
                break;
            }
        }
    }
    parser.expect(TokenKind::RBrace, "'}' closing initializer list")?;
    Ok(Expression::new(ExpressionKind::InitializerList(elements), loc))
}

pub fn parse_string_literal_value(raw: &str) -> String {
    unescape_string_lexeme(raw)
}

pub type RcExpr = Rc<Expression>;
