//! The `Type` tagged variant from the data model.
//!
//! Note what is deliberately absent: there is no `ReplacementSentinel`
//! variant. The declarator parser (`parser::declarator`) builds types by
//! folding a chunk list instead of mutating a placeholder node in place, so
//! the sentinel this type historically needed never has to exist.

use std::fmt;
use std::rc::Rc;

use crate::ast::expr::Expression;

/// A small const/volatile/restrict bitset. Hand-rolled rather than pulled in
/// from a crate: three bits don't need a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qualifiers(u8);

impl Qualifiers {
    pub const CONST: Qualifiers = Qualifiers(0b001);
    pub const VOLATILE: Qualifiers = Qualifiers(0b010);
    pub const RESTRICT: Qualifiers = Qualifiers(0b100);

    pub const fn empty() -> Self {
        Qualifiers(0)
    }

    pub fn contains(self, other: Qualifiers) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Qualifiers) {
        self.0 |= other.0;
    }

    pub fn union(self, other: Qualifiers) -> Qualifiers {
        Qualifiers(self.0 | other.0)
    }
}

impl std::ops::BitOr for Qualifiers {
    type Output = Qualifiers;
    fn bitor(self, rhs: Qualifiers) -> Qualifiers {
        self.union(rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    Void,
    Bool,
    Char,
    SignedChar,
    UnsignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    LongLong,
    UnsignedLongLong,
    Float,
    Double,
    LongDouble,
    Float128,
    ComplexFloat,
    ComplexDouble,
    ComplexLongDouble,
    BuiltinVaList,
}

impl BuiltinKind {
    pub fn is_integer(self) -> bool {
        use BuiltinKind::*;
        matches!(
            self,
            Bool | Char
                | SignedChar
                | UnsignedChar
                | Short
                | UnsignedShort
                | Int
                | UnsignedInt
                | Long
                | UnsignedLong
                | LongLong
                | UnsignedLongLong
        )
    }

    pub fn is_unsigned(self) -> bool {
        use BuiltinKind::*;
        matches!(
            self,
            UnsignedChar | UnsignedShort | UnsignedInt | UnsignedLong | UnsignedLongLong
        )
    }

    pub fn is_floating(self) -> bool {
        use BuiltinKind::*;
        matches!(
            self,
            Float | Double | LongDouble | Float128 | ComplexFloat | ComplexDouble | ComplexLongDouble
        )
    }

    /// Rank ordering for the usual arithmetic conversions (spec §4.4):
    /// Bool < Char family < Short < Int < Long < LongLong.
    pub fn integer_rank(self) -> u8 {
        use BuiltinKind::*;
        match self {
            Bool => 0,
            Char | SignedChar | UnsignedChar => 1,
            Short | UnsignedShort => 2,
            Int | UnsignedInt => 3,
            Long | UnsignedLong => 4,
            LongLong | UnsignedLongLong => 5,
            _ => panic!("integer_rank called on non-integer builtin kind {self:?}"),
        }
    }

    pub fn unsigned_counterpart(self) -> BuiltinKind {
        use BuiltinKind::*;
        match self {
            Char | SignedChar => UnsignedChar,
            Short => UnsignedShort,
            Int => UnsignedInt,
            Long => UnsignedLong,
            LongLong => UnsignedLongLong,
            already_unsigned => already_unsigned,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub ty: Type,
    pub bitfield: Option<Rc<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumMember {
    pub name: String,
    pub value: Option<Rc<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Builtin(BuiltinKind),
    /// A typedef reference by source name; resolved to its flattened target
    /// via Sema's typedef map. Never appears inside a value stored in a Sema
    /// table (the flattening invariant, spec §3/§8).
    Named(String),
    Pointer(Box<Type>),
    Array {
        element: Box<Type>,
        size: Option<Rc<Expression>>,
    },
    Function {
        ret: Box<Type>,
        params: Vec<Param>,
        varargs: bool,
    },
    Struct {
        tag: Option<String>,
        members: Option<Vec<Member>>,
        packed: bool,
    },
    Union {
        tag: Option<String>,
        members: Option<Vec<Member>>,
        packed: bool,
    },
    Enum {
        tag: Option<String>,
        members: Option<Vec<EnumMember>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub qualifiers: Qualifiers,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            qualifiers: Qualifiers::empty(),
        }
    }

    pub fn with_qualifiers(kind: TypeKind, qualifiers: Qualifiers) -> Self {
        Type { kind, qualifiers }
    }

    pub fn builtin(kind: BuiltinKind) -> Self {
        Type::new(TypeKind::Builtin(kind))
    }

    pub fn void() -> Self {
        Type::builtin(BuiltinKind::Void)
    }

    pub fn pointer_to(pointee: Type) -> Self {
        Type::new(TypeKind::Pointer(Box::new(pointee)))
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Builtin(BuiltinKind::Void))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Builtin(b) if b.is_integer())
            || matches!(self.kind, TypeKind::Enum { .. })
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, TypeKind::Struct { .. } | TypeKind::Union { .. })
    }

    /// Strips qualifiers and `Named` indirections are NOT resolved here —
    /// that requires Sema's typedef map. This only peels qualifier wrappers.
    pub fn unqualified(&self) -> Type {
        Type::new(self.kind.clone())
    }

    pub const QUALIFIERS_NONE: Qualifiers = Qualifiers::empty();
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifiers.contains(Qualifiers::CONST) {
            write!(f, "const ")?;
        }
        if self.qualifiers.contains(Qualifiers::VOLATILE) {
            write!(f, "volatile ")?;
        }
        match &self.kind {
            TypeKind::Builtin(b) => write!(f, "{b:?}"),
            TypeKind::Named(name) => write!(f, "{name}"),
            TypeKind::Pointer(inner) => write!(f, "{inner}*"),
            TypeKind::Array { element, .. } => write!(f, "{element}[]"),
            TypeKind::Function { ret, .. } => write!(f, "{ret}(...)"),
            TypeKind::Struct { tag, .. } => write!(f, "struct {}", tag.as_deref().unwrap_or("<anon>")),
            TypeKind::Union { tag, .. } => write!(f, "union {}", tag.as_deref().unwrap_or("<anon>")),
            TypeKind::Enum { tag, .. } => write!(f, "enum {}", tag.as_deref().unwrap_or("<anon>")),
        }
    }
}
