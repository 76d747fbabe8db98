//! Statement and top-level parsing.
//!
//! This is also where the lexer hack is fed: every `typedef` declaration
//! registers its name(s) into the parser's typedef set before the rest of
//! the translation unit is parsed, so a later `(Foo)x` is recognized as a
//! cast rather than a malformed parenthesized expression.

use crate::ast::stmt::{Statement, StatementKind, SwitchCase};
use crate::ast::toplevel::{FunctionParamDecl, TopLevelKind, TopLevelNode};
use crate::ast::types::TypeKind;
use crate::lexer::TokenKind;
use crate::parser::declarator::{self, StorageClass};
use crate::parser::expr::{self, parse_expression};
use crate::parser::{ParseError, ParseResult, Parser};

pub fn parse_top_level(parser: &mut Parser) -> ParseResult<TopLevelNode> {
    let loc = parser.location();

    if parser.check(&TokenKind::StaticAssert) {
        parser.bump();
        parser.expect(TokenKind::LParen, "'(' after _Static_assert")?;
        let cond = parse_expression(parser)?;
        let message = if parser.eat(&TokenKind::Comma) {
            match &parser.peek().kind {
                TokenKind::StringLiteral(raw) => {
                    let s = expr::parse_string_literal_value(raw);
                    parser.bump();
                    Some(s)
                }
                _ => return Err(ParseError::expected("a string literal message", parser.peek())),
            }
        } else {
            None
        };
        parser.expect(TokenKind::RParen, "')' closing _Static_assert")?;
        parser.expect(TokenKind::Semicolon, "';' after _Static_assert")?;
        return Ok(TopLevelNode::new(TopLevelKind::StaticAssert { cond, message }, loc));
    }

    let specs = declarator::parse_specifiers(parser)?;
    let base = specs.resolve_base_type(loc)?;

    // A bare `struct Foo { ... };` / `enum E { ... };` / `union U { ... };`
    // with no declarator following is a tag declaration in its own right.
    if parser.check(&TokenKind::Semicolon) {
        parser.bump();
        let tag_ty = specs
            .named_or_tag
            .clone()
            .ok_or_else(|| ParseError::new("empty declaration", loc))?;
        return Ok(tag_decl_node(tag_ty, loc));
    }

    let declarator = declarator::parse_declarator(parser)?;
    let (name, ty) = declarator::fold(&declarator, base.clone());
    let name = name.ok_or_else(|| ParseError::new("top-level declaration needs a name", loc))?;

    if specs.storage == StorageClass::Typedef {
        parser.register_typedef(name.clone());
        parser.expect(TokenKind::Semicolon, "';' after typedef")?;
        return Ok(TopLevelNode::new(TopLevelKind::Typedef { name, ty }, loc));
    }

    if parser.check(&TokenKind::LBrace) {
        let TypeKind::Function { params, .. } = &ty.kind else {
            return Err(ParseError::new(
                "a function body may only follow a function-typed declarator",
                loc,
            ));
        };
        let param_decls: Vec<FunctionParamDecl> = params
            .iter()
            .map(|p| FunctionParamDecl {
                name: p.name.clone(),
                ty: p.ty.clone(),
            })
            .collect();
        let body = parse_compound(parser)?;
        return Ok(TopLevelNode::new(
            TopLevelKind::FunctionDefinition {
                name,
                ty,
                params: param_decls,
                body,
                is_static: specs.storage == StorageClass::Static,
            },
            loc,
        ));
    }

    let init = if parser.eat(&TokenKind::Assign) {
        Some(expr::parse_assignment(parser)?)
    } else {
        None
    };
    parser.expect(TokenKind::Semicolon, "';' after top-level declaration")?;
    Ok(TopLevelNode::new(
        TopLevelKind::GlobalVariable {
            name,
            ty,
            init,
            is_static: specs.storage == StorageClass::Static,
            is_extern: specs.storage == StorageClass::Extern,
        },
        loc,
    ))
}

fn tag_decl_node(ty: crate::ast::Type, loc: crate::lexer::Location) -> TopLevelNode {
    match &ty.kind {
        TypeKind::Struct { tag, .. } => TopLevelNode::new(
            TopLevelKind::StructDeclaration {
                tag: tag.clone().unwrap_or_default(),
                ty,
            },
            loc,
        ),
        TypeKind::Union { tag, .. } => TopLevelNode::new(
            TopLevelKind::UnionDeclaration {
                tag: tag.clone().unwrap_or_default(),
                ty,
            },
            loc,
        ),
        TypeKind::Enum { tag, .. } => TopLevelNode::new(
            TopLevelKind::EnumDeclaration {
                tag: tag.clone().unwrap_or_default(),
                ty,
            },
            loc,
        ),
        _ => TopLevelNode::new(
            TopLevelKind::StructDeclaration {
                tag: String::new(),
                ty,
            },
            loc,
        ),
    }
}

pub fn parse_compound(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    parser.expect(TokenKind::LBrace, "'{' opening a compound statement")?;
    let mut statements = Vec::new();
    while !parser.check(&TokenKind::RBrace) {
        statements.push(parse_statement(parser)?);
    }
    parser.expect(TokenKind::RBrace, "'}' closing a compound statement")?;
    Ok(Statement::new(StatementKind::Compound(statements), loc))
}

pub fn parse_statement(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();

    match &parser.peek().kind {
        TokenKind::LBrace => return parse_compound(parser),
        TokenKind::If => return parse_if(parser),
        TokenKind::While => return parse_while(parser),
        TokenKind::For => return parse_for(parser),
        TokenKind::Switch => return parse_switch(parser),
        TokenKind::Break => {
            parser.bump();
            parser.expect(TokenKind::Semicolon, "';' after break")?;
            return Ok(Statement::new(StatementKind::Break, loc));
        }
        TokenKind::Continue => {
            parser.bump();
            parser.expect(TokenKind::Semicolon, "';' after continue")?;
            return Ok(Statement::new(StatementKind::Continue, loc));
        }
        TokenKind::Return => {
            parser.bump();
            let value = if parser.check(&TokenKind::Semicolon) {
                None
            } else {
                Some(parse_expression(parser)?)
            };
            parser.expect(TokenKind::Semicolon, "';' after return")?;
            return Ok(Statement::new(StatementKind::Return(value), loc));
        }
        TokenKind::Semicolon => {
            parser.bump();
            return Ok(Statement::new(StatementKind::Compound(Vec::new()), loc));
        }
        _ => {}
    }

    if parser.is_type_start() {
        return parse_declaration_statement(parser);
    }

    let value = parse_expression(parser)?;
    parser.expect(TokenKind::Semicolon, "';' after expression statement")?;
    Ok(Statement::new(StatementKind::ExprStmt(value), loc))
}

fn parse_declaration_statement(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    let specs = declarator::parse_specifiers(parser)?;
    let base = specs.resolve_base_type(loc)?;
    let decl = declarator::parse_declarator(parser)?;
    let (name, ty) = declarator::fold(&decl, base);
    let name = name.ok_or_else(|| ParseError::new("local declaration needs a name", loc))?;

    if specs.storage == StorageClass::Typedef {
        parser.register_typedef(name.clone());
        parser.expect(TokenKind::Semicolon, "';' after typedef")?;
        // Local typedefs don't produce a statement of their own kind in
        // this grammar; fold them into an empty compound so the statement
        // list stays well-formed.
        return Ok(Statement::new(StatementKind::Compound(Vec::new()), loc));
    }

    let init = if parser.eat(&TokenKind::Assign) {
        Some(expr::parse_assignment(parser)?)
    } else {
        None
    };
    parser.expect(TokenKind::Semicolon, "';' after declaration")?;
    Ok(Statement::new(StatementKind::Declaration { name, ty, init }, loc))
}

fn parse_if(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    parser.bump();
    parser.expect(TokenKind::LParen, "'(' after if")?;
    let cond = parse_expression(parser)?;
    parser.expect(TokenKind::RParen, "')' after if condition")?;
    let then_branch = Box::new(parse_statement(parser)?);
    let else_branch = if parser.eat(&TokenKind::Else) {
        Some(Box::new(parse_statement(parser)?))
    } else {
        None
    };
    Ok(Statement::new(
        StatementKind::If {
            cond,
            then_branch,
            else_branch,
        },
        loc,
    ))
}

fn parse_while(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    parser.bump();
    parser.expect(TokenKind::LParen, "'(' after while")?;
    let cond = parse_expression(parser)?;
    parser.expect(TokenKind::RParen, "')' after while condition")?;
    let body = Box::new(parse_statement(parser)?);
    Ok(Statement::new(StatementKind::While { cond, body }, loc))
}

fn parse_for(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    parser.bump();
    parser.expect(TokenKind::LParen, "'(' after for")?;

    let init = if parser.check(&TokenKind::Semicolon) {
        parser.bump();
        None
    } else if parser.is_type_start() {
        Some(Box::new(parse_declaration_statement(parser)?))
    } else {
        let e = parse_expression(parser)?;
        parser.expect(TokenKind::Semicolon, "';' after for-init")?;
        Some(Box::new(Statement::new(StatementKind::ExprStmt(e), loc)))
    };

    let cond = if parser.check(&TokenKind::Semicolon) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect(TokenKind::Semicolon, "';' after for-condition")?;

    let iter = if parser.check(&TokenKind::RParen) {
        None
    } else {
        Some(parse_expression(parser)?)
    };
    parser.expect(TokenKind::RParen, "')' closing for-clause")?;

    let body = Box::new(parse_statement(parser)?);
    Ok(Statement::new(
        StatementKind::For {
            init,
            cond,
            iter,
            body,
        },
        loc,
    ))
}

fn parse_switch(parser: &mut Parser) -> ParseResult<Statement> {
    let loc = parser.location();
    parser.bump();
    parser.expect(TokenKind::LParen, "'(' after switch")?;
    let cond = parse_expression(parser)?;
    parser.expect(TokenKind::RParen, "')' after switch condition")?;
    parser.expect(TokenKind::LBrace, "'{' opening switch body")?;

    let mut cases = Vec::new();
    let mut default: Option<Vec<Statement>> = None;

    while !parser.check(&TokenKind::RBrace) {
        if parser.eat(&TokenKind::Case) {
            let value = parse_expression(parser)?;
            parser.expect(TokenKind::Colon, "':' after case label")?;
            let body = parse_case_body(parser)?;
            cases.push(SwitchCase { value, body });
        } else if parser.eat(&TokenKind::Default) {
            parser.expect(TokenKind::Colon, "':' after default label")?;
            let body = parse_case_body(parser)?;
            default = Some(body);
        } else {
            return Err(ParseError::expected("'case', 'default', or '}'", parser.peek()));
        }
    }
    parser.expect(TokenKind::RBrace, "'}' closing switch body")?;

    Ok(Statement::new(
        StatementKind::Switch {
            cond,
            cases,
            default,
        },
        loc,
    ))
}

fn parse_case_body(parser: &mut Parser) -> ParseResult<Vec<Statement>> {
    let mut body = Vec::new();
    while !matches!(
        parser.peek().kind,
        TokenKind::Case | TokenKind::Default | TokenKind::RBrace
    ) {
        body.push(parse_statement(parser)?);
    }
    Ok(body)
}
