//! # Declarator parsing — the hard part.
//!
//! C declarations read "inside out": `int (*fptr)(void)` is a pointer to a
//! function, while `int *fptr(void)` is a function returning a pointer. The
//! source of this system modeled that nesting with a **sentinel
//! replacement**: parse the parenthesized sub-declarator against a
//! placeholder `Type` that stands for "whatever the outer type becomes",
//! remember where that placeholder got planted in the tree, then mutate it
//! in place once the outer suffixes are known.
//!
//! This implementation eliminates that mutation entirely (per the redesign
//! called for in spec.md §9). The declarator pass first parses a pure,
//! immutable **chunk tree** — pointer prefixes, a core (an identifier or a
//! nested sub-declarator), and a run of array/function suffixes — with no
//! notion of a `Type` at all. A second pass, [`fold`], is a pure function
//! from `(chunk tree, base type)` to `(name, Type)`: each layer wraps the
//! type flowing inward to the next, and the identifier at the core returns
//! the fully wrapped result back out. No placeholder, no in-place patch.

use crate::ast::types::{Member, Param, Qualifiers, Type, TypeKind};
use crate::lexer::TokenKind;
use crate::parser::{ParseError, ParseResult, Parser};

/// A single suffix applied to whatever type lies inside it: `[expr?]` or
/// `(params...)`.
#[derive(Debug, Clone)]
pub enum Suffix {
    Array(Option<crate::ast::Expression>),
    Function { params: Vec<Param>, varargs: bool },
}

/// The chunk tree. `Pointer` and `Suffixed` both wrap an inner declarator;
/// `Ident`/`Abstract` are the two possible cores.
#[derive(Debug, Clone)]
pub enum Declarator {
    /// The declared name, found at the core of the declarator.
    Ident(String),
    /// An abstract declarator core (used for parameter types and casts,
    /// where no name is bound).
    Abstract,
    Pointer {
        qualifiers: Qualifiers,
        inner: Box<Declarator>,
    },
    /// Suffixes apply to whatever `inner` resolves to — this is what makes
    /// `(*fptr)(void)` different from `*fptr(void)`: in the former, `inner`
    /// is itself a `Pointer` wrapping an `Ident`, so the function suffix
    /// wraps the pointer's pointee and the pointer wraps the function.
    Suffixed {
        inner: Box<Declarator>,
        suffixes: Vec<Suffix>,
    },
}

/// Folds a chunk tree against a base type, producing the declared name (if
/// any) and the fully resolved `Type`. Pure function, no mutation — this is
/// the direct replacement for the sentinel trick.
pub fn fold(declarator: &Declarator, base: Type) -> (Option<String>, Type) {
    match declarator {
        Declarator::Ident(name) => (Some(name.clone()), base),
        Declarator::Abstract => (None, base),
        Declarator::Pointer { qualifiers, inner } => {
            let pointer = Type::with_qualifiers(TypeKind::Pointer(Box::new(base)), *qualifiers);
            fold(inner, pointer)
        }
        Declarator::Suffixed { inner, suffixes } => {
            let mut current = base;
            for suffix in suffixes {
                current = match suffix {
                    Suffix::Array(size) => Type::new(TypeKind::Array {
                        element: Box::new(current),
                        size: size.clone().map(std::rc::Rc::new),
                    }),
                    Suffix::Function { params, varargs } => Type::new(TypeKind::Function {
                        ret: Box::new(current),
                        params: params.clone(),
                        varargs: *varargs,
                    }),
                };
            }
            fold(inner, current)
        }
    }
}

/// Accumulates the specifier bitset described in spec.md §4.3: base-type
/// keywords (counted, since e.g. `long` may appear twice), qualifiers,
/// storage class, and `inline`. At most one of {tag type, named typedef}
/// may be present, and it closes the specifier pass.
#[derive(Debug, Default, Clone)]
pub struct DeclSpecifiers {
    pub void: bool,
    pub char_: bool,
    pub short: bool,
    pub int: bool,
    pub long_count: u8,
    pub float: bool,
    pub double: bool,
    pub signed: bool,
    pub unsigned: bool,
    pub complex: bool,
    pub bool_: bool,
    pub float128: bool,
    pub builtin_va_list: bool,
    /// A fully-resolved tag type (`struct`/`union`/`enum`) or typedef
    /// reference; closes the "base" part of the specifier pass.
    pub named_or_tag: Option<Type>,
    pub qualifiers: Qualifiers,
    pub storage: StorageClass,
    pub inline: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    #[default]
    None,
    Typedef,
    Extern,
    Static,
    Auto,
    Register,
    ThreadLocal,
}

impl DeclSpecifiers {
    fn has_any_base(&self) -> bool {
        self.void
            || self.char_
            || self.short
            || self.int
            || self.long_count > 0
            || self.float
            || self.double
            || self.signed
            || self.unsigned
            || self.complex
            || self.bool_
            || self.float128
            || self.builtin_va_list
            || self.named_or_tag.is_some()
    }

    /// Applies the builtin-resolution table (spec §4.3, "selected rules").
    pub fn resolve_base_type(&self, location: crate::lexer::Location) -> ParseResult<Type> {
        use crate::ast::types::BuiltinKind::*;

        if let Some(ty) = &self.named_or_tag {
            return Ok(ty.clone());
        }

        let kind = if self.long_count >= 2 {
            if self.unsigned {
                UnsignedLongLong
            } else {
                LongLong
            }
        } else if self.long_count == 1 && self.double {
            if self.complex {
                ComplexLongDouble
            } else {
                LongDouble
            }
        } else if self.long_count == 1 {
            if self.unsigned {
                UnsignedLong
            } else {
                Long
            }
        } else if self.short {
            if self.unsigned {
                UnsignedShort
            } else {
                Short
            }
        } else if self.char_ {
            if self.unsigned {
                UnsignedChar
            } else if self.signed {
                SignedChar
            } else {
                Char
            }
        } else if self.float128 {
            Float128
        } else if self.double {
            if self.complex {
                ComplexDouble
            } else {
                Double
            }
        } else if self.float {
            if self.complex {
                ComplexFloat
            } else {
                Float
            }
        } else if self.bool_ {
            Bool
        } else if self.builtin_va_list {
            BuiltinVaList
        } else if self.void {
            crate::ast::types::BuiltinKind::Void
        } else if self.int || self.signed || self.unsigned {
            if self.unsigned {
                UnsignedInt
            } else {
                Int
            }
        } else {
            return Err(ParseError::new("missing type specifier in declaration", location));
        };

        Ok(Type::with_qualifiers(TypeKind::Builtin(kind), self.qualifiers))
    }
}

/// Parses the specifier pass: base-type keywords, qualifiers, storage
/// class, `inline`, and inline struct/union/enum definitions, in any order,
/// until a token that cannot start a specifier is seen.
pub fn parse_specifiers(parser: &mut Parser) -> ParseResult<DeclSpecifiers> {
    let mut specs = DeclSpecifiers::default();

    loop {
        parser.skip_gcc_extensions()?;
        match &parser.peek().kind {
            TokenKind::Void => {
                specs.void = true;
                parser.bump();
            }
            TokenKind::Char => {
                specs.char_ = true;
                parser.bump();
            }
            TokenKind::Short => {
                specs.short = true;
                parser.bump();
            }
            TokenKind::Int => {
                specs.int = true;
                parser.bump();
            }
            TokenKind::Long => {
                specs.long_count = specs.long_count.saturating_add(1);
                parser.bump();
            }
            TokenKind::Float => {
                specs.float = true;
                parser.bump();
            }
            TokenKind::Double => {
                specs.double = true;
                parser.bump();
            }
            TokenKind::Signed => {
                specs.signed = true;
                parser.bump();
            }
            TokenKind::Unsigned => {
                specs.unsigned = true;
                parser.bump();
            }
            TokenKind::Bool => {
                specs.bool_ = true;
                parser.bump();
            }
            TokenKind::Complex => {
                specs.complex = true;
                parser.bump();
            }
            TokenKind::Float128 => {
                specs.float128 = true;
                parser.bump();
            }
            TokenKind::BuiltinVaList => {
                specs.builtin_va_list = true;
                parser.bump();
            }
            TokenKind::Const => {
                specs.qualifiers.insert(Qualifiers::CONST);
                parser.bump();
            }
            TokenKind::Volatile => {
                specs.qualifiers.insert(Qualifiers::VOLATILE);
                parser.bump();
            }
            TokenKind::Restrict => {
                specs.qualifiers.insert(Qualifiers::RESTRICT);
                parser.bump();
            }
            TokenKind::Extern => {
                specs.storage = StorageClass::Extern;
                parser.bump();
            }
            TokenKind::Static => {
                specs.storage = StorageClass::Static;
                parser.bump();
            }
            TokenKind::Auto => {
                specs.storage = StorageClass::Auto;
                parser.bump();
            }
            TokenKind::Register => {
                specs.storage = StorageClass::Register;
                parser.bump();
            }
            TokenKind::ThreadLocal => {
                specs.storage = StorageClass::ThreadLocal;
                parser.bump();
            }
            TokenKind::Typedef => {
                specs.storage = StorageClass::Typedef;
                parser.bump();
            }
            TokenKind::Inline => {
                specs.inline = true;
                parser.bump();
            }
            TokenKind::Struct | TokenKind::Union | TokenKind::Enum => {
                if specs.has_any_base() {
                    break;
                }
                specs.named_or_tag = Some(parse_tag_type(parser)?);
            }
            TokenKind::Identifier(name) if parser.is_typedef_name(name) && !specs.has_any_base() => {
                let ty = Type::new(TypeKind::Named(name.clone()));
                parser.bump();
                specs.named_or_tag = Some(ty);
            }
            _ => break,
        }
    }

    if !specs.has_any_base() {
        return Err(ParseError::new(
            "expected a type specifier",
            parser.location(),
        ));
    }

    Ok(specs)
}

/// Parses `struct|union|enum [tag] [{ members }]`. A full member list is a
/// definition; its absence is a forward declaration or a reference to a
/// previously declared tag — Sema resolves which.
fn parse_tag_type(parser: &mut Parser) -> ParseResult<Type> {
    let is_enum = parser.check(&TokenKind::Enum);
    let is_union = parser.check(&TokenKind::Union);
    parser.bump();

    let tag = if let TokenKind::Identifier(name) = &parser.peek().kind {
        let name = name.clone();
        parser.bump();
        Some(name)
    } else {
        None
    };

    if !parser.eat(&TokenKind::LBrace) {
        let kind = if is_enum {
            TypeKind::Enum { tag, members: None }
        } else if is_union {
            TypeKind::Union {
                tag,
                members: None,
                packed: false,
            }
        } else {
            TypeKind::Struct {
                tag,
                members: None,
                packed: false,
            }
        };
        return Ok(Type::new(kind));
    }

    if is_enum {
        let mut members = Vec::new();
        while !parser.check(&TokenKind::RBrace) {
            let name = match &parser.peek().kind {
                TokenKind::Identifier(n) => n.clone(),
                _ => return Err(ParseError::expected("an enumerator name", parser.peek())),
            };
            parser.bump();
            let value = if parser.eat(&TokenKind::Assign) {
                Some(crate::parser::expr::parse_assignment(parser)?)
            } else {
                None
            };
            members.push(crate::ast::types::EnumMember { name, value });
            if !parser.eat(&TokenKind::Comma) {
                break;
            }
        }
        parser.expect(TokenKind::RBrace, "'}' closing enum body")?;
        Ok(Type::new(TypeKind::Enum {
            tag,
            members: Some(members),
        }))
    } else {
        let mut members = Vec::new();
        while !parser.check(&TokenKind::RBrace) {
            let member_specs = parse_specifiers(parser)?;
            let base = member_specs.resolve_base_type(parser.location())?;
            loop {
                let declarator = parse_declarator(parser)?;
                let (name, ty) = fold(&declarator, base.clone());
                let name = name.ok_or_else(|| {
                    ParseError::new("struct/union member must have a name", parser.location())
                })?;
                let bitfield = if parser.eat(&TokenKind::Colon) {
                    Some(std::rc::Rc::new(crate::parser::expr::parse_assignment(
                        parser,
                    )?))
                } else {
                    None
                };
                members.push(Member { name, ty, bitfield });
                if !parser.eat(&TokenKind::Comma) {
                    break;
                }
            }
            parser.expect(TokenKind::Semicolon, "';' after member declaration")?;
        }
        parser.expect(TokenKind::RBrace, "'}' closing struct/union body")?;
        let kind = if is_union {
            TypeKind::Union {
                tag,
                members: Some(members),
                packed: false,
            }
        } else {
            TypeKind::Struct {
                tag,
                members: Some(members),
                packed: false,
            }
        };
        Ok(Type::new(kind))
    }
}

/// Parses a declarator (possibly abstract, i.e. nameless — used for
/// parameter types, `sizeof(T)`, and casts).
pub fn parse_declarator(parser: &mut Parser) -> ParseResult<Declarator> {
    parser.skip_gcc_extensions()?;

    if parser.eat(&TokenKind::Star) {
        let mut qualifiers = Qualifiers::empty();
        loop {
            match &parser.peek().kind {
                TokenKind::Const => {
                    qualifiers.insert(Qualifiers::CONST);
                    parser.bump();
                }
                TokenKind::Volatile => {
                    qualifiers.insert(Qualifiers::VOLATILE);
                    parser.bump();
                }
                TokenKind::Restrict => {
                    qualifiers.insert(Qualifiers::RESTRICT);
                    parser.bump();
                }
                _ => break,
            }
        }
        let inner = parse_declarator(parser)?;
        return Ok(Declarator::Pointer {
            qualifiers,
            inner: Box::new(inner),
        });
    }

    let core = parse_direct_declarator_core(parser)?;
    parse_suffixes(parser, core)
}

/// The "core" of a direct-declarator: either the identifier being declared,
/// or a fully nested parenthesized sub-declarator. This is exactly the spot
/// the sentinel used to be planted; here it is simply a recursive call.
fn parse_direct_declarator_core(parser: &mut Parser) -> ParseResult<Declarator> {
    if parser.eat(&TokenKind::LParen) {
        let inner = parse_declarator(parser)?;
        parser.expect(TokenKind::RParen, "')' closing nested declarator")?;
        return Ok(inner);
    }

    if let TokenKind::Identifier(name) = &parser.peek().kind {
        let name = name.clone();
        parser.bump();
        return Ok(Declarator::Ident(name));
    }

    Ok(Declarator::Abstract)
}

/// Parses the `[...]`/`(...)` suffix run following a direct-declarator
/// core, wrapping it in `Declarator::Suffixed` if any were found.
fn parse_suffixes(parser: &mut Parser, core: Declarator) -> ParseResult<Declarator> {
    let mut suffixes = Vec::new();

    loop {
        if parser.eat(&TokenKind::LBracket) {
            let size = if parser.check(&TokenKind::RBracket) {
                None
            } else {
                Some(crate::parser::expr::parse_assignment(parser)?)
            };
            parser.expect(TokenKind::RBracket, "']' closing array declarator")?;
            suffixes.push(Suffix::Array(size));
        } else if parser.eat(&TokenKind::LParen) {
            let (params, varargs) = parse_parameter_list(parser)?;
            parser.expect(TokenKind::RParen, "')' closing parameter list")?;
            suffixes.push(Suffix::Function { params, varargs });
        } else {
            break;
        }
    }

    parser.skip_gcc_extensions()?;

    if suffixes.is_empty() {
        Ok(core)
    } else {
        Ok(Declarator::Suffixed {
            inner: Box::new(core),
            suffixes,
        })
    }
}

/// Parses a parameter-type-list: a comma-separated list of parameter
/// declarations, optionally ending in `...`, or the single unnamed `void`
/// meaning "zero parameters".
fn parse_parameter_list(parser: &mut Parser) -> ParseResult<(Vec<Param>, bool)> {
    if parser.check(&TokenKind::RParen) {
        return Ok((Vec::new(), false));
    }

    // `(void)` with nothing following means zero parameters.
    if parser.check(&TokenKind::Void) && parser.peek_at(1).kind == TokenKind::RParen {
        parser.bump();
        return Ok((Vec::new(), false));
    }

    let mut params = Vec::new();
    let mut varargs = false;
    loop {
        if parser.eat(&TokenKind::Ellipsis) {
            varargs = true;
            break;
        }
        let specs = parse_specifiers(parser)?;
        let base = specs.resolve_base_type(parser.location())?;
        let declarator = parse_declarator(parser)?;
        let (name, ty) = fold(&declarator, base);
        params.push(Param { name, ty });
        if !parser.eat(&TokenKind::Comma) {
            break;
        }
    }
    Ok((params, varargs))
}

/// Parses a full declaration: specifiers, then one declarator and its
/// fold. Returns the storage class alongside so callers (top-level and
/// statement parsing) can decide whether this is a typedef/extern/static.
pub fn parse_declaration(parser: &mut Parser) -> ParseResult<(DeclSpecifiers, Option<String>, Type)> {
    let specs = parse_specifiers(parser)?;
    let base = specs.resolve_base_type(parser.location())?;
    let declarator = parse_declarator(parser)?;
    let (name, ty) = fold(&declarator, base);
    Ok((specs, name, ty))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::BuiltinKind;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn declare(src: &str) -> (Option<String>, Type) {
        let mut parser = Parser::from_source(src).unwrap();
        let (_, name, ty) = parse_declaration(&mut parser).unwrap();
        (name, ty)
    }

    #[test]
    fn scenario_1_plain_int() {
        let (name, ty) = declare("int x");
        assert_eq!(name.as_deref(), Some("x"));
        assert_eq!(ty.kind, TypeKind::Builtin(BuiltinKind::Int));
    }

    #[test]
    fn scenario_2_sized_array() {
        let (name, ty) = declare("int x[5]");
        assert_eq!(name.as_deref(), Some("x"));
        match ty.kind {
            TypeKind::Array { element, size } => {
                assert_eq!(element.kind, TypeKind::Builtin(BuiltinKind::Int));
                assert!(size.is_some());
            }
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    fn scenario_3_pointer() {
        let (name, ty) = declare("int *x");
        assert_eq!(name.as_deref(), Some("x"));
        match ty.kind {
            TypeKind::Pointer(inner) => assert_eq!(inner.kind, TypeKind::Builtin(BuiltinKind::Int)),
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn scenario_4_nested_pointer_array() {
        // int **x[][10] -> Array(Array(Pointer(Pointer(Int)), 10), unsized)
        let (name, ty) = declare("int **x[][10]");
        assert_eq!(name.as_deref(), Some("x"));
        let TypeKind::Array { element: outer_elem, size: outer_size } = ty.kind else {
            panic!("expected outer array");
        };
        assert!(outer_size.is_none());
        let TypeKind::Array { element: inner_elem, size: inner_size } = outer_elem.kind else {
            panic!("expected inner array");
        };
        assert!(inner_size.is_some());
        let TypeKind::Pointer(p1) = inner_elem.kind else {
            panic!("expected pointer");
        };
        let TypeKind::Pointer(p2) = p1.kind else {
            panic!("expected pointer to pointer");
        };
        assert_eq!(p2.kind, TypeKind::Builtin(BuiltinKind::Int));
    }

    #[test]
    fn scenario_5_const_pointer_qualified() {
        let (name, ty) = declare("const int * volatile x");
        assert_eq!(name.as_deref(), Some("x"));
        assert!(ty.qualifiers.contains(Qualifiers::VOLATILE));
        match ty.kind {
            TypeKind::Pointer(inner) => assert!(inner.qualifiers.contains(Qualifiers::CONST)),
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn scenario_6_function_returning_pointer() {
        let (name, ty) = declare("void *realloc(void *, int)");
        assert_eq!(name.as_deref(), Some("realloc"));
        match ty.kind {
            TypeKind::Function { ret, params, varargs } => {
                assert!(!varargs);
                assert_eq!(params.len(), 2);
                assert!(matches!(ret.kind, TypeKind::Pointer(_)));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn scenario_7_pointer_to_function() {
        // int (*fptr)(void) -> Pointer(Function(Int, [Void]))
        let (name, ty) = declare("int (*fptr)(void)");
        assert_eq!(name.as_deref(), Some("fptr"));
        match ty.kind {
            TypeKind::Pointer(inner) => match inner.kind {
                TypeKind::Function { ret, params, varargs } => {
                    assert!(!varargs);
                    assert_eq!(params.len(), 0);
                    assert_eq!(ret.kind, TypeKind::Builtin(BuiltinKind::Int));
                }
                other => panic!("expected function inside pointer, got {other:?}"),
            },
            other => panic!("expected pointer, got {other:?}"),
        }
    }

    #[test]
    fn scenario_7b_function_returning_pointer_contrast() {
        // contrast case for scenario 7: int *fptr(void) is a function
        // returning a pointer, NOT a pointer to function.
        let (name, ty) = declare("int *fptr(void)");
        assert_eq!(name.as_deref(), Some("fptr"));
        match ty.kind {
            TypeKind::Function { ret, .. } => {
                assert!(matches!(ret.kind, TypeKind::Pointer(_)));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn scenario_6_with_typedef_param() {
        let mut parser = Parser::from_source("void *realloc(void *, size_t)").unwrap();
        parser.register_typedef("size_t");
        let (_, name, ty) = parse_declaration(&mut parser).unwrap();
        assert_eq!(name.as_deref(), Some("realloc"));
        match ty.kind {
            TypeKind::Function { params, .. } => {
                assert_eq!(params[1].ty.kind, TypeKind::Named("size_t".to_string()));
            }
            other => panic!("expected function, got {other:?}"),
        }
    }

    #[test]
    fn scenario_8_varargs() {
        let (name, ty) = declare("int printf(const char *, ...)");
        assert_eq!(name.as_deref(), Some("printf"));
        match ty.kind {
            TypeKind::Function { varargs, params, .. } => {
                assert!(varargs);
                assert_eq!(params.len(), 1);
            }
            other => panic!("expected function, got {other:?}"),
        }
    }
}
