//! Abstract syntax: the tagged variants from the data model, one module per
//! variant family, plus the `Type` shared by all of them.

pub mod expr;
pub mod stmt;
pub mod toplevel;
pub mod types;

pub use expr::{BinOp, Expression, ExpressionKind, UnOp};
pub use stmt::{Statement, StatementKind};
pub use toplevel::{TopLevelKind, TopLevelNode};
pub use types::{BuiltinKind, Param, Qualifiers, Type, TypeKind};
