//! # Sema — the semantic analyzer
//!
//! Owns the four name tables from the data model (typedefs, the three tag
//! namespaces, globals, and the lockstep enum-value/enum-type maps),
//! computes type compatibility and the usual arithmetic conversions, lays
//! out struct/union/array sizes and alignments, and evaluates compile-time
//! constants. The driver is the only caller that mutates this state, and
//! only between top-level nodes (spec §5); everything else here is a
//! read-only query against it.

pub mod const_eval;
pub mod error;
pub mod types;

pub use error::{SemaError, SemaResult};

use std::collections::HashMap;

use crate::ast::expr::{BinOp, UnOp};
use crate::ast::types::{BuiltinKind, Qualifiers, Type, TypeKind};
use crate::ast::{Expression, ExpressionKind, TopLevelKind, TopLevelNode};
use crate::lexer::Location;

pub struct Sema {
    pub typedefs: HashMap<String, Type>,
    pub struct_tags: HashMap<String, Type>,
    pub union_tags: HashMap<String, Type>,
    pub enum_tags: HashMap<String, Type>,
    pub globals: HashMap<String, TopLevelNode>,
    pub enum_values: HashMap<String, i64>,
    pub enum_names: HashMap<String, Type>,
    /// Locals currently in scope during Sema's read-only expression-type
    /// queries; the driver pushes/pops this around function bodies. Separate
    /// from the Lowerer's `locals`/`allocas` maps, which exist purely for IR
    /// emission (spec §4.5) — this one only needs the declared `Type`.
    pub locals: Vec<HashMap<String, Type>>,
    /// Non-owning pointer types synthesized by address-of type inference.
    /// Rust's ownership makes the "non-owning" half of this moot (`Type` is
    /// plain data, cheaply `Clone`), but the arena is kept to mirror the
    /// spec's monotonic-growth invariant: entries are appended, never
    /// touched again once interned.
    pointer_arena: Vec<Type>,
    pub size_t: Type,
    pub string_literal_type: Type,
}

impl Sema {
    pub fn new() -> Self {
        Sema {
            typedefs: HashMap::new(),
            struct_tags: HashMap::new(),
            union_tags: HashMap::new(),
            enum_tags: HashMap::new(),
            globals: HashMap::new(),
            enum_values: HashMap::new(),
            enum_names: HashMap::new(),
            locals: Vec::new(),
            pointer_arena: Vec::new(),
            size_t: Type::builtin(BuiltinKind::UnsignedLong),
            string_literal_type: Type::with_qualifiers(
                TypeKind::Pointer(Box::new(Type::with_qualifiers(
                    TypeKind::Builtin(BuiltinKind::Char),
                    Qualifiers::CONST,
                ))),
                Qualifiers::empty(),
            ),
        }
    }

    pub fn enter_scope(&mut self) {
        self.locals.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        self.locals.pop();
    }

    pub fn declare_local(&mut self, name: impl Into<String>, ty: Type) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.into(), ty);
        }
    }

    fn lookup_local(&self, name: &str) -> Option<&Type> {
        self.locals.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Intern a freshly synthesized non-owning pointer type (address-of
    /// type inference). Monotonic: only ever appended to.
    fn intern_pointer(&mut self, pointee: Type) -> Type {
        let ty = Type::pointer_to(pointee);
        self.pointer_arena.push(ty.clone());
        ty
    }

    /// Flattens a `Named` chain to its underlying type. Every value actually
    /// stored in `typedefs` is already flattened at insertion, so this
    /// terminates in at most one hop for well-formed state.
    pub fn resolve_type(&self, ty: &Type) -> Type {
        match &ty.kind {
            TypeKind::Named(name) => match self.typedefs.get(name) {
                Some(target) => {
                    let mut resolved = target.clone();
                    resolved.qualifiers = resolved.qualifiers.union(ty.qualifiers);
                    resolved
                }
                None => ty.clone(),
            },
            _ => ty.clone(),
        }
    }

    pub fn insert_typedef(&mut self, name: String, ty: Type, location: Location) -> SemaResult<()> {
        if self.typedefs.contains_key(&name) {
            return Err(SemaError::new(format!("redefinition of typedef '{name}'"), location));
        }
        let flattened = self.resolve_type(&ty);
        self.typedefs.insert(name, flattened);
        Ok(())
    }

    /// Struct/union/enum tags keep the most complete definition seen
    /// (spec §3/§4.4): a forward declaration never overwrites a body, but a
    /// body always replaces a forward declaration.
    fn insert_tag(table: &mut HashMap<String, Type>, tag: String, ty: Type, location: Location) -> SemaResult<()> {
        let has_members = |t: &Type| match &t.kind {
            TypeKind::Struct { members, .. } | TypeKind::Union { members, .. } => members.is_some(),
            TypeKind::Enum { members, .. } => members.is_some(),
            _ => true,
        };
        match table.get(&tag) {
            Some(existing) if has_members(existing) && has_members(&ty) => {
                return Err(SemaError::new(format!("redefinition of tag '{tag}'"), location));
            }
            Some(existing) if has_members(existing) => return Ok(()), // keep the complete one
            _ => {
                table.insert(tag, ty);
            }
        }
        Ok(())
    }

    pub fn insert_struct_tag(&mut self, tag: String, ty: Type, location: Location) -> SemaResult<()> {
        Self::insert_tag(&mut self.struct_tags, tag, ty, location)
    }

    pub fn insert_union_tag(&mut self, tag: String, ty: Type, location: Location) -> SemaResult<()> {
        Self::insert_tag(&mut self.union_tags, tag, ty, location)
    }

    pub fn insert_enum_tag(&mut self, tag: String, ty: Type, location: Location) -> SemaResult<()> {
        if let TypeKind::Enum { members: Some(members), .. } = &ty.kind {
            let mut next = 0i64;
            for member in members {
                let value = match &member.value {
                    Some(expr) => self.const_eval(expr)?.as_i64(),
                    None => next,
                };
                next = value + 1;
                self.enum_values.insert(member.name.clone(), value);
                self.enum_names.insert(member.name.clone(), ty.clone());
            }
        }
        Self::insert_tag(&mut self.enum_tags, tag, ty, location)
    }

    /// An identifier has at most one definition across `globals`: a
    /// variable with an initializer, or a function with a body. A
    /// declaration (no initializer/body) never conflicts with a prior
    /// declaration, but a second definition does.
    pub fn insert_global(&mut self, name: String, node: TopLevelNode, location: Location) -> SemaResult<()> {
        let is_definition = |n: &TopLevelNode| match &n.kind {
            TopLevelKind::GlobalVariable { init, .. } => init.is_some(),
            TopLevelKind::FunctionDefinition { .. } => true,
            _ => false,
        };
        if let Some(existing) = self.globals.get(&name) {
            if is_definition(existing) && is_definition(&node) {
                return Err(SemaError::new(format!("redefinition of '{name}'"), location));
            }
            if is_definition(existing) {
                return Ok(()); // keep the definition, ignore the later re-declaration
            }
        }
        self.globals.insert(name, node);
        Ok(())
    }

    /// DeclRef resolution: locals, then enum values, then globals (spec
    /// §4.4).
    pub fn resolve_decl_ref(&self, name: &str, location: Location) -> SemaResult<Type> {
        if let Some(ty) = self.lookup_local(name) {
            return Ok(ty.clone());
        }
        if let Some(enum_ty) = self.enum_names.get(name) {
            return Ok(enum_ty.clone());
        }
        if let Some(node) = self.globals.get(name) {
            return Ok(global_decl_type(node));
        }
        Err(SemaError::new(format!("use of undeclared identifier '{name}'"), location))
    }

    pub fn types_compatible(&self, a: &Type, b: &Type) -> bool {
        types::types_compatible(&self.resolve_type(a), &self.resolve_type(b), false)
    }

    /// Type inference for expressions (spec §4.4, non-exhaustive table).
    pub fn infer_type(&self, expr: &Expression) -> SemaResult<Type> {
        match &expr.kind {
            ExpressionKind::Int { kind, .. } => Ok(Type::builtin(*kind)),
            ExpressionKind::Bool(_) => Ok(Type::builtin(BuiltinKind::Bool)),
            ExpressionKind::Char(_) => Ok(Type::builtin(BuiltinKind::Char)),
            ExpressionKind::String(_) | ExpressionKind::PrettyFunction => Ok(self.string_literal_type.clone()),
            ExpressionKind::DeclRef(name) => self.resolve_decl_ref(name, expr.location),
            ExpressionKind::SizeOfExpr(_) | ExpressionKind::SizeOfType(_) => Ok(self.size_t.clone()),
            ExpressionKind::AlignOfExpr(_) | ExpressionKind::AlignOfType(_) => Ok(self.size_t.clone()),
            ExpressionKind::UnOp { op, operand } => self.infer_unop_type(*op, operand),
            ExpressionKind::BinOp { op, lhs, rhs } => self.infer_binop_type(*op, lhs, rhs),
            ExpressionKind::Conditional { then_branch, else_branch, .. } => {
                let t1 = self.infer_type(then_branch)?;
                let t2 = self.infer_type(else_branch)?;
                self.common_arithmetic_type(&t1, &t2, expr.location)
            }
            ExpressionKind::Cast { target, .. } => Ok(target.clone()),
            ExpressionKind::Call { callee, .. } => {
                let callee_ty = self.infer_type(callee)?;
                match self.resolve_type(&callee_ty).kind {
                    TypeKind::Function { ret, .. } => Ok(*ret),
                    TypeKind::Pointer(inner) => match self.resolve_type(&inner).kind {
                        TypeKind::Function { ret, .. } => Ok(*ret),
                        _ => Err(SemaError::new("called object is not a function", expr.location)),
                    },
                    _ => Err(SemaError::new("called object is not a function", expr.location)),
                }
            }
            ExpressionKind::MemberAccess { base, member, is_arrow } => {
                self.infer_member_type(base, member, *is_arrow, expr.location)
            }
            ExpressionKind::Index { base, .. } => {
                let base_ty = self.infer_type(base)?;
                match self.resolve_type(&base_ty).kind {
                    TypeKind::Pointer(inner) | TypeKind::Array { element: inner, .. } => Ok(*inner),
                    _ => Err(SemaError::new("subscripted value is not an array or pointer", expr.location)),
                }
            }
            ExpressionKind::StmtExpr(stmt) => self.infer_stmt_expr_type(stmt),
            ExpressionKind::InitializerList(_) => Ok(Type::void()), // derives from the declared target type
            ExpressionKind::FunctionParam { ty, .. } => Ok(ty.clone()),
        }
    }

    fn infer_unop_type(&self, op: UnOp, operand: &Expression) -> SemaResult<Type> {
        match op {
            UnOp::Not => Ok(Type::builtin(BuiltinKind::Bool)),
            UnOp::Addr => {
                // The pointer type returned here needs no arena identity of
                // its own; interning only matters once the lowerer commits
                // to an address-of site and records it via
                // `Sema::intern_pointer` during driver-level mutation.
                let pointee = self.infer_type(operand)?;
                Ok(Type::pointer_to(pointee))
            }
            UnOp::Deref => {
                let ty = self.infer_type(operand)?;
                match self.resolve_type(&ty).kind {
                    TypeKind::Pointer(inner) | TypeKind::Array { element: inner, .. } => Ok(*inner),
                    _ => Err(SemaError::new("indirection requires a pointer operand", operand.location)),
                }
            }
            UnOp::Neg | UnOp::BitNot | UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => {
                self.infer_type(operand)
            }
        }
    }

    fn infer_binop_type(&self, op: BinOp, lhs: &Expression, rhs: &Expression) -> SemaResult<Type> {
        if op == BinOp::Comma {
            return self.infer_type(rhs);
        }
        if op.is_compound_assign() || op == BinOp::Assign {
            return self.infer_type(lhs);
        }
        if matches!(
            op,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne | BinOp::LogAnd | BinOp::LogOr
        ) {
            return Ok(Type::builtin(BuiltinKind::Bool));
        }

        let lhs_ty = self.infer_type(lhs)?;
        let rhs_ty = self.infer_type(rhs)?;
        let lhs_resolved = self.resolve_type(&lhs_ty);
        let rhs_resolved = self.resolve_type(&rhs_ty);

        if matches!(op, BinOp::Add | BinOp::Sub) {
            if lhs_resolved.is_pointer() || lhs_resolved.is_array() {
                return Ok(lhs_ty);
            }
            if rhs_resolved.is_pointer() || rhs_resolved.is_array() {
                return Ok(rhs_ty);
            }
        }

        self.common_arithmetic_type(&lhs_ty, &rhs_ty, lhs.location)
    }

    fn common_arithmetic_type(&self, a: &Type, b: &Type, location: Location) -> SemaResult<Type> {
        let ra = self.resolve_type(a);
        let rb = self.resolve_type(b);
        match (&ra.kind, &rb.kind) {
            (TypeKind::Builtin(ka), TypeKind::Builtin(kb)) if ka.is_integer() && kb.is_integer() => {
                Ok(Type::builtin(types::usual_arithmetic_conversion(*ka, *kb)))
            }
            (TypeKind::Builtin(ka), _) if ka.is_floating() => Ok(a.clone()),
            (_, TypeKind::Builtin(kb)) if kb.is_floating() => Ok(b.clone()),
            _ => {
                if self.types_compatible(a, b) {
                    Ok(a.clone())
                } else {
                    Err(SemaError::new("operands have incompatible types", location))
                }
            }
        }
    }

    fn infer_member_type(&self, base: &Expression, member: &str, is_arrow: bool, location: Location) -> SemaResult<Type> {
        let base_ty = self.infer_type(base)?;
        let resolved = self.resolve_type(&base_ty);
        let aggregate = if is_arrow {
            match resolved.kind {
                TypeKind::Pointer(inner) => self.resolve_type(&inner),
                _ => return Err(SemaError::new("member reference requires a pointer", location)),
            }
        } else {
            resolved
        };
        let members = match &aggregate.kind {
            TypeKind::Struct { members: Some(m), .. } | TypeKind::Union { members: Some(m), .. } => m,
            _ => return Err(SemaError::new("member reference on an incomplete or non-aggregate type", location)),
        };
        members
            .iter()
            .find(|m| m.name == member)
            .map(|m| m.ty.clone())
            .ok_or_else(|| SemaError::new(format!("no member named '{member}'"), location))
    }

    fn infer_stmt_expr_type(&self, body: &crate::ast::Statement) -> SemaResult<Type> {
        use crate::ast::stmt::StatementKind;
        let StatementKind::Compound(stmts) = &body.kind else {
            return Ok(Type::void());
        };
        match stmts.last() {
            Some(crate::ast::Statement { kind: StatementKind::ExprStmt(e), .. }) => self.infer_type(e),
            _ => Ok(Type::void()),
        }
    }
}

impl Default for Sema {
    fn default() -> Self {
        Sema::new()
    }
}

fn global_decl_type(node: &TopLevelNode) -> Type {
    match &node.kind {
        TopLevelKind::GlobalVariable { ty, .. } => ty.clone(),
        TopLevelKind::FunctionDefinition { ty, .. } => ty.clone(),
        _ => Type::void(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enum_members_register_in_lockstep() {
        let mut sema = Sema::new();
        let ty = Type::new(TypeKind::Enum {
            tag: Some("E".into()),
            members: Some(vec![
                crate::ast::types::EnumMember { name: "A".into(), value: None },
                crate::ast::types::EnumMember {
                    name: "B".into(),
                    value: Some(std::rc::Rc::new(Expression::new(
                        ExpressionKind::Int { value: 3, kind: BuiltinKind::Int },
                        Location::default(),
                    ))),
                },
                crate::ast::types::EnumMember { name: "C".into(), value: None },
            ]),
        });
        sema.insert_enum_tag("E".into(), ty, Location::default()).unwrap();
        assert_eq!(sema.enum_values["A"], 0);
        assert_eq!(sema.enum_values["B"], 3);
        assert_eq!(sema.enum_values["C"], 4);
        assert_eq!(sema.enum_values.len(), sema.enum_names.len());
    }

    #[test]
    fn typedef_cannot_be_redefined() {
        let mut sema = Sema::new();
        sema.insert_typedef("foo".into(), Type::builtin(BuiltinKind::Int), Location::default())
            .unwrap();
        assert!(sema
            .insert_typedef("foo".into(), Type::builtin(BuiltinKind::Long), Location::default())
            .is_err());
    }

    #[test]
    fn struct_tag_keeps_most_complete_definition() {
        let mut sema = Sema::new();
        let forward = Type::new(TypeKind::Struct { tag: Some("S".into()), members: None, packed: false });
        let full = Type::new(TypeKind::Struct {
            tag: Some("S".into()),
            members: Some(vec![]),
            packed: false,
        });
        sema.insert_struct_tag("S".into(), forward, Location::default()).unwrap();
        sema.insert_struct_tag("S".into(), full, Location::default()).unwrap();
        assert!(matches!(
            sema.struct_tags["S"].kind,
            TypeKind::Struct { members: Some(_), .. }
        ));
    }
}
