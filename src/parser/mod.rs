//! # Parser
//!
//! A hand-written recursive-descent parser, driven directly off a token
//! vector rather than a generated grammar: the declarator nesting, the
//! cast-vs-parenthesized-expression disambiguation, and the `sizeof`
//! type-vs-expression disambiguation (the "lexer hack", see
//! `GLOSSARY::Lexer hack`) all need ad-hoc lookahead and a shared mutable
//! typedef set that none of a regex-lexer-plus-tree-sitter-grammar pipeline
//! gives us room to express.
//!
//! The `Parser` owns the token cursor and the in-flight typedef name set:
//! every time a `typedef` top-level declaration is parsed, its name is
//! inserted here so subsequent declarations, casts, and `sizeof`/`alignof`
//! arguments recognize it as a type-start token instead of an identifier.

pub mod declarator;
pub mod error;
pub mod expr;
pub mod stmt;

pub use error::{ParseError, ParseResult};

use std::collections::HashSet;

use crate::ast::TopLevelNode;
use crate::lexer::{Lexer, Location, Token, TokenKind};

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// The lexer hack's state: identifiers known to name a type, so the
    /// parser can tell `(T)x` from `(e)x` and recognize `T` as a `sizeof`
    /// type-argument, by pure lookahead with no backtracking.
    typedef_names: HashSet<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            typedef_names: HashSet::new(),
        }
    }

    pub fn from_source(source: &str) -> ParseResult<Self> {
        let tokens = Lexer::new(source).lex_all().map_err(|e| ParseError {
            message: e.message,
            location: e.location,
        })?;
        Ok(Parser::new(tokens))
    }

    pub fn register_typedef(&mut self, name: impl Into<String>) {
        self.typedef_names.insert(name.into());
    }

    pub fn is_typedef_name(&self, name: &str) -> bool {
        self.typedef_names.contains(name)
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    pub fn location(&self) -> Location {
        self.peek().location
    }

    pub fn is_eof(&self) -> bool {
        self.peek().is_eof()
    }

    pub fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, kind: TokenKind, what: &str) -> ParseResult<Token> {
        if self.check(&kind) {
            Ok(self.bump())
        } else {
            Err(ParseError::expected(what, self.peek()))
        }
    }

    /// A token is a "type start" if it is a builtin keyword, a qualifier, a
    /// storage-class keyword, `struct`/`union`/`enum`, or an identifier
    /// registered as a typedef name. Used both by the declarator parser's
    /// specifier pass and by `sizeof`/`alignof`/cast disambiguation.
    pub fn is_type_start(&self) -> bool {
        use TokenKind::*;
        match &self.peek().kind {
            Void | Char | Short | Int | Long | Float | Double | Signed | Unsigned | Bool
            | Complex | Float128 | BuiltinVaList | Struct | Union | Enum | Const | Volatile
            | Restrict | Extern | Static | Auto | Register | ThreadLocal | Inline => true,
            Identifier(name) => self.is_typedef_name(name),
            _ => false,
        }
    }

    /// Skips a GCC `__attribute__((...))` / `__asm__(...)` / `__extension__`
    /// run at a declarator boundary (spec §4.3). Returns `true` if anything
    /// was skipped.
    pub fn skip_gcc_extensions(&mut self) -> ParseResult<bool> {
        let mut skipped = false;
        loop {
            match &self.peek().kind {
                TokenKind::Attribute => {
                    self.bump();
                    self.expect(TokenKind::LParen, "'(' after __attribute__")?;
                    self.skip_balanced_parens()?;
                    skipped = true;
                }
                TokenKind::Asm => {
                    self.bump();
                    self.expect(TokenKind::LParen, "'(' after __asm__")?;
                    self.skip_balanced_parens()?;
                    skipped = true;
                }
                TokenKind::Extension => {
                    self.bump();
                    skipped = true;
                }
                _ => break,
            }
        }
        Ok(skipped)
    }

    /// Consumes tokens up to and including the matching close paren, given
    /// that the opening paren has already been consumed by the caller.
    fn skip_balanced_parens(&mut self) -> ParseResult<()> {
        let mut depth = 1usize;
        loop {
            match &self.peek().kind {
                TokenKind::LParen => {
                    depth += 1;
                    self.bump();
                }
                TokenKind::RParen => {
                    depth -= 1;
                    self.bump();
                    if depth == 0 {
                        return Ok(());
                    }
                }
                TokenKind::Eof => {
                    return Err(ParseError::new("unterminated parenthesized group", self.location()))
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    pub fn parse_translation_unit(&mut self) -> ParseResult<Vec<TopLevelNode>> {
        let mut nodes = Vec::new();
        while !self.is_eof() {
            nodes.push(stmt::parse_top_level(self)?);
        }
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typedef_name_flips_type_start_detection() {
        let mut parser = Parser::from_source("foo").unwrap();
        assert!(!parser.is_type_start());
        parser.register_typedef("foo");
        assert!(parser.is_type_start());
    }
}
