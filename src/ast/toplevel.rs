//! The `TopLevelNode` tagged variant.

use crate::ast::expr::Expression;
use crate::ast::stmt::Statement;
use crate::ast::types::Type;
use crate::lexer::Location;

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionParamDecl {
    pub name: Option<String>,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevelKind {
    Typedef {
        name: String,
        ty: Type,
    },
    StaticAssert {
        cond: Expression,
        message: Option<String>,
    },
    /// A declaration or a definition; `init` distinguishes them for
    /// non-function types. A `Function` type with no body is a declaration.
    GlobalVariable {
        name: String,
        ty: Type,
        init: Option<Expression>,
        is_static: bool,
        is_extern: bool,
    },
    FunctionDefinition {
        name: String,
        ty: Type,
        params: Vec<FunctionParamDecl>,
        body: Statement,
        is_static: bool,
    },
    StructDeclaration {
        tag: String,
        ty: Type,
    },
    EnumDeclaration {
        tag: String,
        ty: Type,
    },
    UnionDeclaration {
        tag: String,
        ty: Type,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopLevelNode {
    pub kind: TopLevelKind,
    pub location: Location,
}

impl TopLevelNode {
    pub fn new(kind: TopLevelKind, location: Location) -> Self {
        TopLevelNode { kind, location }
    }
}
