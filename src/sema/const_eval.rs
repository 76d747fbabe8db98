//! Compile-time constant evaluation (spec §4.4), used by `sizeof`,
//! `alignof`, `static_assert`, array bounds, and enum members.

use crate::ast::expr::{BinOp, ExpressionKind};
use crate::ast::Expression;
use crate::sema::error::{SemaError, SemaResult};
use crate::sema::types::{align_of, builtin_align, size_of};
use crate::sema::Sema;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    UnsignedLongLong(u64),
}

impl ConstValue {
    pub fn as_i64(self) -> i64 {
        match self {
            ConstValue::Bool(b) => b as i64,
            ConstValue::Int(v) => v,
            ConstValue::UnsignedLongLong(v) => v as i64,
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            ConstValue::Bool(b) => b as u64,
            ConstValue::Int(v) => v as u64,
            ConstValue::UnsignedLongLong(v) => v,
        }
    }

    pub fn is_zero(self) -> bool {
        self.as_i64() == 0
    }

    /// Promotes the tagged kind when two constants of different kinds are
    /// compared or combined (spec §4.4: "Comparison across tagged kinds
    /// promotes numerically").
    fn promote(a: ConstValue, b: ConstValue) -> (ConstValue, ConstValue) {
        use ConstValue::*;
        match (a, b) {
            (UnsignedLongLong(_), _) | (_, UnsignedLongLong(_)) => {
                (UnsignedLongLong(a.as_u64()), UnsignedLongLong(b.as_u64()))
            }
            (Int(_), _) | (_, Int(_)) => (Int(a.as_i64()), Int(b.as_i64())),
            _ => (a, b),
        }
    }
}

impl Sema {
    pub fn const_eval(&self, expr: &Expression) -> SemaResult<ConstValue> {
        match &expr.kind {
            ExpressionKind::Int { value, .. } => Ok(ConstValue::UnsignedLongLong(*value)),
            ExpressionKind::Bool(b) => Ok(ConstValue::Bool(*b)),
            ExpressionKind::Char(c) => Ok(ConstValue::Int(*c as i64)),
            ExpressionKind::DeclRef(name) => self.const_eval_decl_ref(name, expr),
            ExpressionKind::SizeOfType(ty) => {
                let resolved = self.resolve_type(ty);
                let size = size_of(&resolved).ok_or_else(|| {
                    SemaError::new(format!("sizeof: incomplete type {resolved}"), expr.location)
                })?;
                Ok(ConstValue::UnsignedLongLong(size))
            }
            ExpressionKind::SizeOfExpr(inner) => {
                let ty = self.infer_type(inner)?;
                let resolved = self.resolve_type(&ty);
                let size = size_of(&resolved).ok_or_else(|| {
                    SemaError::new(format!("sizeof: incomplete type {resolved}"), expr.location)
                })?;
                Ok(ConstValue::UnsignedLongLong(size))
            }
            ExpressionKind::AlignOfType(ty) => {
                let resolved = self.resolve_type(ty);
                let align = align_of(&resolved).unwrap_or_else(|| builtin_align(crate::ast::types::BuiltinKind::Int));
                Ok(ConstValue::UnsignedLongLong(align))
            }
            ExpressionKind::AlignOfExpr(inner) => {
                let ty = self.infer_type(inner)?;
                let resolved = self.resolve_type(&ty);
                let align = align_of(&resolved).unwrap_or_else(|| builtin_align(crate::ast::types::BuiltinKind::Int));
                Ok(ConstValue::UnsignedLongLong(align))
            }
            ExpressionKind::UnOp { op, operand } if *op == crate::ast::expr::UnOp::Neg => {
                let v = self.const_eval(operand)?;
                Ok(ConstValue::Int(-v.as_i64()))
            }
            ExpressionKind::BinOp { op, lhs, rhs } => self.const_eval_binop(*op, lhs, rhs, expr),
            ExpressionKind::Conditional {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = self.const_eval(cond)?;
                if !c.is_zero() {
                    self.const_eval(then_branch)
                } else {
                    self.const_eval(else_branch)
                }
            }
            other => Err(SemaError::new(
                format!("expression is not a compile-time constant: {other:?}"),
                expr.location,
            )),
        }
    }

    fn const_eval_decl_ref(&self, name: &str, expr: &Expression) -> SemaResult<ConstValue> {
        if let Some(&value) = self.enum_values.get(name) {
            return Ok(ConstValue::Int(value));
        }
        if let Some(node) = self.globals.get(name) {
            if let crate::ast::TopLevelKind::GlobalVariable { init: Some(init), .. } = &node.kind {
                return self.const_eval(init);
            }
        }
        Err(SemaError::new(
            format!("'{name}' is not usable in a constant expression"),
            expr.location,
        ))
    }

    fn const_eval_binop(
        &self,
        op: BinOp,
        lhs: &Expression,
        rhs: &Expression,
        expr: &Expression,
    ) -> SemaResult<ConstValue> {
        let l = self.const_eval(lhs)?;
        let r = self.const_eval(rhs)?;
        let (l, r) = ConstValue::promote(l, r);
        use ConstValue::*;
        let result = match (op, l, r) {
            (BinOp::Eq, _, _) => Bool(l.as_i64() == r.as_i64()),
            (BinOp::Lt, UnsignedLongLong(a), UnsignedLongLong(b)) => Bool(a < b),
            (BinOp::Lt, _, _) => Bool(l.as_i64() < r.as_i64()),
            (BinOp::Add, UnsignedLongLong(a), UnsignedLongLong(b)) => UnsignedLongLong(a.wrapping_add(b)),
            (BinOp::Add, _, _) => Int(l.as_i64().wrapping_add(r.as_i64())),
            (BinOp::Div, UnsignedLongLong(a), UnsignedLongLong(b)) => {
                if b == 0 {
                    return Err(SemaError::new("division by zero in constant expression", expr.location));
                }
                UnsignedLongLong(a / b)
            }
            (BinOp::Div, _, _) => {
                let rv = r.as_i64();
                if rv == 0 {
                    return Err(SemaError::new("division by zero in constant expression", expr.location));
                }
                Int(l.as_i64() / rv)
            }
            (BinOp::Shl, _, _) => match l {
                UnsignedLongLong(a) => UnsignedLongLong(a << r.as_u64()),
                _ => Int(l.as_i64() << r.as_i64()),
            },
            (BinOp::Shr, _, _) => match l {
                UnsignedLongLong(a) => UnsignedLongLong(a >> r.as_u64()),
                _ => Int(l.as_i64() >> r.as_i64()),
            },
            (BinOp::BitOr, UnsignedLongLong(a), UnsignedLongLong(b)) => UnsignedLongLong(a | b),
            (BinOp::BitOr, _, _) => Int(l.as_i64() | r.as_i64()),
            _ => {
                return Err(SemaError::new(
                    format!("{op:?} is not supported in a constant expression"),
                    expr.location,
                ))
            }
        };
        Ok(result)
    }

    /// Fails compilation when the static_assert condition const-evaluates
    /// to a zero value.
    pub fn check_static_assert(&self, cond: &Expression) -> SemaResult<()> {
        let value = self.const_eval(cond)?;
        if value.is_zero() {
            Err(SemaError::new("static assertion failed", cond.location))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Location;

    fn int(value: u64) -> Expression {
        Expression::new(
            ExpressionKind::Int { value, kind: crate::ast::types::BuiltinKind::Int },
            Location::default(),
        )
    }

    #[test]
    fn static_assert_of_nonzero_passes() {
        let sema = Sema::new();
        assert!(sema.check_static_assert(&int(1)).is_ok());
    }

    #[test]
    fn static_assert_of_zero_fails() {
        let sema = Sema::new();
        assert!(sema.check_static_assert(&int(0)).is_err());
    }

    #[test]
    fn sizeof_int_is_four() {
        let sema = Sema::new();
        let expr = Expression::new(
            ExpressionKind::SizeOfType(crate::ast::types::Type::builtin(crate::ast::types::BuiltinKind::Int)),
            Location::default(),
        );
        assert_eq!(sema.const_eval(&expr).unwrap().as_u64(), 4);
    }

    #[test]
    fn division_by_zero_in_constant_expression_errors() {
        let sema = Sema::new();
        let expr = Expression::new(
            ExpressionKind::BinOp { op: BinOp::Div, lhs: Box::new(int(1)), rhs: Box::new(int(0)) },
            Location::default(),
        );
        assert!(sema.const_eval(&expr).is_err());
    }
}
