//! Expression lowering: the lvalue/rvalue split, implicit conversions,
//! binary/unary operator lowering (including short-circuit `&&`/`||` and
//! pointer arithmetic via GEP), and statement-expressions (spec §4.5).

use inkwell::types::BasicTypeEnum;
use inkwell::values::{BasicValue, BasicValueEnum, PointerValue};
use inkwell::{FloatPredicate, IntPredicate};

use crate::ast::expr::{BinOp, ExpressionKind, UnOp};
use crate::ast::types::{BuiltinKind, Type, TypeKind};
use crate::ast::Expression;
use crate::codegen::context::CodegenContext;
use crate::codegen::error::{CodegenError, CodegenResult};
use crate::lexer::Location;

/// Produces an IR pointer to the storage of an lvalue expression. Only a
/// subset of expressions are lvalues (spec §4.5): `DeclRef`, member access,
/// unary `*`, a passthrough `Cast`, and `Index`.
pub fn lower_lvalue<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expr: &Expression,
) -> CodegenResult<PointerValue<'ctx>> {
    match &expr.kind {
        ExpressionKind::DeclRef(name) => {
            if let Some(ptr) = ctx.find_alloca(name) {
                return Ok(ptr);
            }
            if let Some(global) = ctx.module.get_global(name) {
                return Ok(global.as_pointer_value());
            }
            if let Some(function) = ctx.module.get_function(name) {
                return Ok(function.as_global_value().as_pointer_value());
            }
            Err(CodegenError::new(format!("undeclared identifier '{name}'"), expr.location))
        }
        ExpressionKind::MemberAccess { base, member, is_arrow } => {
            lower_member_lvalue(ctx, base, member, *is_arrow, expr.location)
        }
        ExpressionKind::UnOp { op: UnOp::Deref, operand } => {
            let value = lower_rvalue(ctx, operand)?;
            Ok(value.into_pointer_value())
        }
        ExpressionKind::Cast { target, operand } => {
            let operand_ty = ctx.sema.borrow().infer_type(operand)?;
            if ctx.llvm_type(target)? == ctx.llvm_type(&operand_ty)? {
                lower_lvalue(ctx, operand)
            } else {
                Err(CodegenError::new("cast does not produce an lvalue", expr.location))
            }
        }
        ExpressionKind::Index { base, index } => {
            let (elem_ptr, _elem_ty) = lower_index_pointer(ctx, base, index, expr.location)?;
            Ok(elem_ptr)
        }
        _ => Err(CodegenError::new("expression is not an lvalue", expr.location)),
    }
}

fn lower_member_lvalue<'ctx>(
    ctx: &CodegenContext<'ctx>,
    base: &Expression,
    member: &str,
    is_arrow: bool,
    location: Location,
) -> CodegenResult<PointerValue<'ctx>> {
    let base_ptr = if is_arrow {
        lower_rvalue(ctx, base)?.into_pointer_value()
    } else {
        lower_lvalue(ctx, base)?
    };

    let base_ty = ctx.sema.borrow().infer_type(base)?;
    let resolved_base = ctx.sema.borrow().resolve_type(&base_ty);
    let aggregate_ty = if is_arrow {
        match resolved_base.kind {
            TypeKind::Pointer(inner) => ctx.sema.borrow().resolve_type(&inner),
            _ => return Err(CodegenError::new("'->' requires a pointer operand", location)),
        }
    } else {
        resolved_base
    };

    let members = match &aggregate_ty.kind {
        TypeKind::Struct { members: Some(m), .. } | TypeKind::Union { members: Some(m), .. } => m,
        _ => return Err(CodegenError::new("member access on incomplete type", location)),
    };
    let is_union = matches!(aggregate_ty.kind, TypeKind::Union { .. });
    let index = members
        .iter()
        .position(|m| m.name == member)
        .ok_or_else(|| CodegenError::new(format!("no member named '{member}'"), location))?;

    let struct_llvm_ty = ctx.llvm_type(&aggregate_ty)?;
    let struct_ty = match struct_llvm_ty {
        BasicTypeEnum::StructType(s) => s,
        _ => return Err(CodegenError::new("aggregate member access on a non-struct type", location)),
    };

    if is_union {
        // The union's single LLVM field backs every member; the element
        // pointer is just the base pointer, reinterpreted by load/store
        // through the member's own type at its use site.
        Ok(base_ptr)
    } else {
        ctx.builder
            .build_struct_gep(struct_ty, base_ptr, index as u32, member)
            .map_err(|e| CodegenError::new(format!("failed to build member GEP: {e}"), location))
    }
}

fn lower_index_pointer<'ctx>(
    ctx: &CodegenContext<'ctx>,
    base: &Expression,
    index: &Expression,
    location: Location,
) -> CodegenResult<(PointerValue<'ctx>, Type)> {
    let base_ty = ctx.sema.borrow().infer_type(base)?;
    let resolved = ctx.sema.borrow().resolve_type(&base_ty);
    let (element_ty, base_ptr) = match &resolved.kind {
        TypeKind::Array { element, .. } => {
            // Arrays decay to a pointer to their first element; their
            // lvalue pointer already points at element zero.
            (element.as_ref().clone(), lower_lvalue(ctx, base)?)
        }
        TypeKind::Pointer(inner) => (inner.as_ref().clone(), lower_rvalue(ctx, base)?.into_pointer_value()),
        _ => return Err(CodegenError::new("indexed value is not an array or pointer", location)),
    };
    let index_val = lower_rvalue(ctx, index)?.into_int_value();
    let elem_llvm_ty = ctx.llvm_type(&element_ty)?;
    let ptr = unsafe {
        ctx.builder
            .build_gep(elem_llvm_ty, base_ptr, &[index_val], "idx")
            .map_err(|e| CodegenError::new(format!("failed to build index GEP: {e}"), location))?
    };
    Ok((ptr, element_ty))
}

/// Loads through an lvalue pointer, except for array-typed lvalues, which
/// decay to the pointer itself rather than being loaded (spec §4.5).
pub fn lower_rvalue<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expr: &Expression,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match &expr.kind {
        ExpressionKind::Int { value, kind } => Ok(int_constant(ctx, *value, *kind)),
        ExpressionKind::Bool(b) => Ok(ctx.context.bool_type().const_int(*b as u64, false).into()),
        ExpressionKind::Char(c) => Ok(ctx.context.i8_type().const_int(*c as u64, false).into()),
        ExpressionKind::String(s) => lower_string_literal(ctx, s),
        ExpressionKind::PrettyFunction => {
            let name = ctx
                .current_function()
                .map(|f| f.get_name().to_string_lossy().into_owned())
                .unwrap_or_default();
            lower_string_literal(ctx, &name)
        }
        ExpressionKind::SizeOfExpr(_) | ExpressionKind::SizeOfType(_) | ExpressionKind::AlignOfExpr(_) | ExpressionKind::AlignOfType(_) => {
            let value = ctx.sema.borrow().const_eval(expr)?.as_u64();
            Ok(ctx.context.i64_type().const_int(value, false).into())
        }
        ExpressionKind::DeclRef(name) => lower_declref_rvalue(ctx, name, expr.location),
        ExpressionKind::UnOp { op, operand } => lower_unop(ctx, *op, operand, expr.location),
        ExpressionKind::BinOp { op, lhs, rhs } => lower_binop(ctx, *op, lhs, rhs, expr.location),
        ExpressionKind::Conditional { cond, then_branch, else_branch } => {
            lower_conditional(ctx, cond, then_branch, else_branch, expr.location)
        }
        ExpressionKind::Cast { target, operand } => {
            let value = lower_rvalue(ctx, operand)?;
            let source_ty = ctx.sema.borrow().infer_type(operand)?;
            implicit_cast(ctx, value, &source_ty, target, expr.location)
        }
        ExpressionKind::Index { base, index } => {
            let (ptr, elem_ty) = lower_index_pointer(ctx, base, index, expr.location)?;
            load_typed(ctx, ptr, &elem_ty, expr.location)
        }
        ExpressionKind::MemberAccess { .. } => {
            let ptr = lower_lvalue(ctx, expr)?;
            let ty = ctx.sema.borrow().infer_type(expr)?;
            load_typed(ctx, ptr, &ty, expr.location)
        }
        ExpressionKind::Call { callee, args } => lower_call(ctx, callee, args, expr.location),
        ExpressionKind::StmtExpr(body) => lower_stmt_expr(ctx, body, expr.location),
        ExpressionKind::InitializerList(_) => Err(CodegenError::new(
            "an initializer list has no value outside of a declaration's init position",
            expr.location,
        )),
        ExpressionKind::FunctionParam { name, .. } => lower_declref_rvalue(ctx, name, expr.location),
    }
}

fn lower_declref_rvalue<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    if ctx.module.get_function(name).is_some() && ctx.find_alloca(name).is_none() {
        return Ok(ctx
            .module
            .get_function(name)
            .unwrap()
            .as_global_value()
            .as_pointer_value()
            .into());
    }
    let ty = ctx
        .find_local_type(name)
        .map(Ok)
        .unwrap_or_else(|| ctx.sema.borrow().resolve_decl_ref(name, location).map_err(CodegenError::from))?;
    let ptr = lower_lvalue(
        ctx,
        &Expression::new(ExpressionKind::DeclRef(name.to_string()), location),
    )?;
    load_typed(ctx, ptr, &ty, location)
}

/// Array-typed lvalues decay to their pointer rather than being loaded.
fn load_typed<'ctx>(
    ctx: &CodegenContext<'ctx>,
    ptr: PointerValue<'ctx>,
    ty: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let resolved = ctx.sema.borrow().resolve_type(ty);
    if matches!(resolved.kind, TypeKind::Array { .. }) {
        return Ok(ptr.into());
    }
    let llvm_ty = ctx.llvm_type(&resolved)?;
    ctx.builder
        .build_load(llvm_ty, ptr, "load")
        .map_err(|e| CodegenError::new(format!("failed to build load: {e}"), location))
}

fn int_constant<'ctx>(ctx: &CodegenContext<'ctx>, value: u64, kind: BuiltinKind) -> BasicValueEnum<'ctx> {
    let llvm_ty = match kind {
        BuiltinKind::Char | BuiltinKind::SignedChar | BuiltinKind::UnsignedChar => ctx.context.i8_type(),
        BuiltinKind::Short | BuiltinKind::UnsignedShort => ctx.context.i16_type(),
        BuiltinKind::Int | BuiltinKind::UnsignedInt => ctx.context.i32_type(),
        _ => ctx.context.i64_type(),
    };
    llvm_ty.const_int(value, kind.is_unsigned()).into()
}

fn lower_string_literal<'ctx>(ctx: &CodegenContext<'ctx>, s: &str) -> CodegenResult<BasicValueEnum<'ctx>> {
    let global = ctx
        .builder
        .build_global_string_ptr(s, "str")
        .map_err(|e| CodegenError::new(e.to_string(), Location::default()))?;
    Ok(global.as_pointer_value().into())
}

fn lower_unop<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: UnOp,
    operand: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match op {
        UnOp::Not => {
            let ty = ctx.sema.borrow().infer_type(operand)?;
            let value = lower_rvalue(ctx, operand)?;
            let as_bool = implicit_cast(ctx, value, &ty, &Type::builtin(BuiltinKind::Bool), location)?;
            let zero = ctx.context.bool_type().const_zero();
            let cmp = ctx
                .builder
                .build_int_compare(IntPredicate::EQ, as_bool.into_int_value(), zero, "not")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(ctx
                .builder
                .build_int_z_extend(cmp, ctx.context.bool_type(), "notz")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
                .into())
        }
        UnOp::BitNot => {
            let value = lower_rvalue(ctx, operand)?.into_int_value();
            let all_ones = value.get_type().const_all_ones();
            Ok(ctx
                .builder
                .build_xor(value, all_ones, "bitnot")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
                .into())
        }
        UnOp::Neg => {
            let ty = ctx.sema.borrow().infer_type(operand)?;
            let value = lower_rvalue(ctx, operand)?;
            if is_floating_kind(&ctx.sema.borrow().resolve_type(&ty).kind) {
                Ok(ctx
                    .builder
                    .build_float_neg(value.into_float_value(), "fneg")
                    .map_err(|e| CodegenError::new(e.to_string(), location))?
                    .into())
            } else {
                Ok(ctx
                    .builder
                    .build_int_neg(value.into_int_value(), "neg")
                    .map_err(|e| CodegenError::new(e.to_string(), location))?
                    .into())
            }
        }
        UnOp::Addr => Ok(lower_lvalue(ctx, operand)?.into()),
        UnOp::Deref => {
            let ptr = lower_rvalue(ctx, operand)?.into_pointer_value();
            let ty = ctx.sema.borrow().infer_type(
                &Expression::new(ExpressionKind::UnOp { op: UnOp::Deref, operand: Box::new(operand.clone()) }, location),
            )?;
            load_typed(ctx, ptr, &ty, location)
        }
        UnOp::PreInc | UnOp::PreDec | UnOp::PostInc | UnOp::PostDec => lower_incdec(ctx, op, operand, location),
    }
}

fn lower_incdec<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: UnOp,
    operand: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let ptr = lower_lvalue(ctx, operand)?;
    let ty = ctx.sema.borrow().infer_type(operand)?;
    let resolved = ctx.sema.borrow().resolve_type(&ty);
    let old = load_typed(ctx, ptr, &resolved, location)?;
    let is_dec = matches!(op, UnOp::PreDec | UnOp::PostDec);

    let new_value = if resolved.is_pointer() {
        // True pointer arithmetic for `++`/`--` goes through GEP, treating
        // the pointer as an address one element wide (spec §4.5).
        let TypeKind::Pointer(pointee) = &resolved.kind else { unreachable!() };
        let elem_ty = ctx.llvm_type(pointee)?;
        let one = ctx.context.i64_type().const_int(1, false);
        let delta = if is_dec {
            ctx.builder.build_int_neg(one, "negone").map_err(|e| CodegenError::new(e.to_string(), location))?
        } else {
            one
        };
        unsafe {
            ctx.builder
                .build_gep(elem_ty, old.into_pointer_value(), &[delta], "incdec")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
        }
        .into()
    } else if is_floating_kind(&resolved.kind) {
        let one = ctx.llvm_type(&resolved)?.into_float_type().const_float(1.0);
        if is_dec {
            ctx.builder.build_float_sub(old.into_float_value(), one, "fdec")
        } else {
            ctx.builder.build_float_add(old.into_float_value(), one, "finc")
        }
        .map_err(|e| CodegenError::new(e.to_string(), location))?
        .into()
    } else {
        let one = ctx.llvm_type(&resolved)?.into_int_type().const_int(1, false);
        if is_dec {
            ctx.builder.build_int_sub(old.into_int_value(), one, "dec")
        } else {
            ctx.builder.build_int_add(old.into_int_value(), one, "inc")
        }
        .map_err(|e| CodegenError::new(e.to_string(), location))?
        .into()
    };

    ctx.builder
        .build_store(ptr, new_value)
        .map_err(|e| CodegenError::new(e.to_string(), location))?;

    Ok(if matches!(op, UnOp::PreInc | UnOp::PreDec) { new_value } else { old })
}

fn lower_binop<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: BinOp,
    lhs: &Expression,
    rhs: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match op {
        BinOp::Comma => {
            lower_rvalue(ctx, lhs)?;
            lower_rvalue(ctx, rhs)
        }
        BinOp::LogAnd | BinOp::LogOr => lower_short_circuit(ctx, op, lhs, rhs, location),
        BinOp::Assign => lower_assignment(ctx, lhs, rhs, location),
        op if op.is_compound_assign() => lower_compound_assignment(ctx, op, lhs, rhs, location),
        _ => lower_arithmetic_binop(ctx, op, lhs, rhs, location),
    }
}

/// `&&`/`||` short-circuit: the RHS is only evaluated in its own block, and
/// the result is a phi of the LHS's short-circuit value and the RHS's
/// value, never an eager evaluation of both sides (spec §4.5, §9).
fn lower_short_circuit<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: BinOp,
    lhs: &Expression,
    rhs: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let function = ctx.current_function().expect("short-circuit binop outside a function");
    let rhs_bb = ctx.context.append_basic_block(function, "sc_rhs");
    let merge_bb = ctx.context.append_basic_block(function, "sc_merge");

    let lhs_ty = ctx.sema.borrow().infer_type(lhs)?;
    let lhs_val = lower_rvalue(ctx, lhs)?;
    let lhs_bool = implicit_cast(ctx, lhs_val, &lhs_ty, &Type::builtin(BuiltinKind::Bool), location)?.into_int_value();
    let lhs_predecessor = ctx.builder.get_insert_block().expect("builder always has a current insertion point");

    let default_value = ctx.context.bool_type().const_int(matches!(op, BinOp::LogOr) as u64, false);
    match op {
        BinOp::LogAnd => ctx
            .builder
            .build_conditional_branch(lhs_bool, rhs_bb, merge_bb)
            .map_err(|e| CodegenError::new(e.to_string(), location))?,
        _ => ctx
            .builder
            .build_conditional_branch(lhs_bool, merge_bb, rhs_bb)
            .map_err(|e| CodegenError::new(e.to_string(), location))?,
    };

    ctx.builder.position_at_end(rhs_bb);
    let rhs_ty = ctx.sema.borrow().infer_type(rhs)?;
    let rhs_val = lower_rvalue(ctx, rhs)?;
    let rhs_bool = implicit_cast(ctx, rhs_val, &rhs_ty, &Type::builtin(BuiltinKind::Bool), location)?.into_int_value();
    let rhs_predecessor = ctx.builder.get_insert_block().expect("builder always has a current insertion point");
    ctx.builder
        .build_unconditional_branch(merge_bb)
        .map_err(|e| CodegenError::new(e.to_string(), location))?;

    ctx.builder.position_at_end(merge_bb);
    let phi = ctx
        .builder
        .build_phi(ctx.context.bool_type(), "sc_result")
        .map_err(|e| CodegenError::new(e.to_string(), location))?;
    phi.add_incoming(&[(&default_value, lhs_predecessor), (&rhs_bool, rhs_predecessor)]);
    Ok(phi.as_basic_value())
}

fn lower_assignment<'ctx>(
    ctx: &CodegenContext<'ctx>,
    lhs: &Expression,
    rhs: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let ptr = lower_lvalue(ctx, lhs)?;
    let lhs_ty = ctx.sema.borrow().infer_type(lhs)?;
    let rhs_ty = ctx.sema.borrow().infer_type(rhs)?;
    let rhs_val = lower_rvalue(ctx, rhs)?;
    let casted = implicit_cast(ctx, rhs_val, &rhs_ty, &lhs_ty, location)?;
    ctx.builder
        .build_store(ptr, casted)
        .map_err(|e| CodegenError::new(e.to_string(), location))?;
    Ok(casted)
}

fn lower_compound_assignment<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: BinOp,
    lhs: &Expression,
    rhs: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let underlying = op.underlying().expect("compound assign always has an underlying op");
    let ptr = lower_lvalue(ctx, lhs)?;
    let lhs_ty = ctx.sema.borrow().infer_type(lhs)?;
    let resolved_lhs = ctx.sema.borrow().resolve_type(&lhs_ty);

    if resolved_lhs.is_pointer() && matches!(underlying, BinOp::Add | BinOp::Sub) {
        let old = load_typed(ctx, ptr, &resolved_lhs, location)?.into_pointer_value();
        let TypeKind::Pointer(pointee) = &resolved_lhs.kind else { unreachable!() };
        let elem_ty = ctx.llvm_type(pointee)?;
        let mut offset = lower_rvalue(ctx, rhs)?.into_int_value();
        if matches!(underlying, BinOp::Sub) {
            offset = ctx
                .builder
                .build_int_neg(offset, "negoffset")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
        }
        let new_ptr = unsafe {
            ctx.builder
                .build_gep(elem_ty, old, &[offset], "ptrcompound")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
        };
        ctx.builder
            .build_store(ptr, new_ptr)
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
        return Ok(new_ptr.into());
    }

    let old = load_typed(ctx, ptr, &resolved_lhs, location)?;
    let rhs_ty = ctx.sema.borrow().infer_type(rhs)?;
    let rhs_val = lower_rvalue(ctx, rhs)?;
    let result = apply_arithmetic(ctx, underlying, old, &resolved_lhs, rhs_val, &rhs_ty, location)?;
    let casted = implicit_cast(ctx, result, &ctx.sema.borrow().infer_type(lhs)?, &lhs_ty, location)?;
    ctx.builder
        .build_store(ptr, casted)
        .map_err(|e| CodegenError::new(e.to_string(), location))?;
    Ok(casted)
}

fn lower_arithmetic_binop<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: BinOp,
    lhs: &Expression,
    rhs: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let lhs_ty = ctx.sema.borrow().infer_type(lhs)?;
    let rhs_ty = ctx.sema.borrow().infer_type(rhs)?;
    let resolved_lhs = ctx.sema.borrow().resolve_type(&lhs_ty);
    let resolved_rhs = ctx.sema.borrow().resolve_type(&rhs_ty);

    // Pointer +/- integer: GEP on the pointer operand, no promotion of the
    // integer offset (spec §4.5).
    if matches!(op, BinOp::Add | BinOp::Sub) && (resolved_lhs.is_pointer() || resolved_rhs.is_pointer()) {
        let (ptr_expr, ptr_ty, int_expr) = if resolved_lhs.is_pointer() {
            (lhs, resolved_lhs.clone(), rhs)
        } else {
            (rhs, resolved_rhs.clone(), lhs)
        };
        let ptr_val = lower_rvalue(ctx, ptr_expr)?.into_pointer_value();
        let TypeKind::Pointer(pointee) = &ptr_ty.kind else { unreachable!() };
        let elem_ty = ctx.llvm_type(pointee)?;
        let mut offset = lower_rvalue(ctx, int_expr)?.into_int_value();
        if matches!(op, BinOp::Sub) {
            offset = ctx
                .builder
                .build_int_neg(offset, "negoffset")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
        }
        let result = unsafe {
            ctx.builder
                .build_gep(elem_ty, ptr_val, &[offset], "ptrarith")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
        };
        return Ok(result.into());
    }

    // Pointer equality/relational: keep the pointer common type.
    if resolved_lhs.is_pointer() && resolved_rhs.is_pointer() && is_comparison(op) {
        let l = lower_rvalue(ctx, lhs)?.into_pointer_value();
        let r = lower_rvalue(ctx, rhs)?.into_pointer_value();
        let predicate = int_predicate(op, false);
        let l_int = ctx
            .builder
            .build_ptr_to_int(l, ctx.context.i64_type(), "lp")
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
        let r_int = ctx
            .builder
            .build_ptr_to_int(r, ctx.context.i64_type(), "rp")
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
        let cmp = ctx
            .builder
            .build_int_compare(predicate, l_int, r_int, "ptrcmp")
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
        return Ok(ctx
            .builder
            .build_int_z_extend(cmp, ctx.context.bool_type(), "ptrcmpz")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
            .into());
    }

    let lhs_val = lower_rvalue(ctx, lhs)?;
    let rhs_val = lower_rvalue(ctx, rhs)?;
    apply_arithmetic(ctx, op, lhs_val, &resolved_lhs, rhs_val, &resolved_rhs, location)
}

fn is_comparison(op: BinOp) -> bool {
    matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge)
}

fn int_predicate(op: BinOp, is_unsigned: bool) -> IntPredicate {
    use IntPredicate::*;
    match (op, is_unsigned) {
        (BinOp::Eq, _) => EQ,
        (BinOp::Ne, _) => NE,
        (BinOp::Lt, true) => ULT,
        (BinOp::Lt, false) => SLT,
        (BinOp::Gt, true) => UGT,
        (BinOp::Gt, false) => SGT,
        (BinOp::Le, true) => ULE,
        (BinOp::Le, false) => SLE,
        (BinOp::Ge, true) => UGE,
        (BinOp::Ge, false) => SGE,
        _ => EQ,
    }
}

fn float_predicate(op: BinOp) -> FloatPredicate {
    use FloatPredicate::*;
    match op {
        BinOp::Eq => OEQ,
        BinOp::Ne => ONE,
        BinOp::Lt => OLT,
        BinOp::Gt => OGT,
        BinOp::Le => OLE,
        BinOp::Ge => OGE,
        _ => OEQ,
    }
}

/// Computes the common type via the usual arithmetic conversions, casts
/// both operands to it, and emits the operator. Comparison results are
/// zero-extended back to the 8-bit `bool` representation (spec §4.5).
fn apply_arithmetic<'ctx>(
    ctx: &CodegenContext<'ctx>,
    op: BinOp,
    lhs_val: BasicValueEnum<'ctx>,
    lhs_ty: &Type,
    rhs_val: BasicValueEnum<'ctx>,
    rhs_ty: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let common = common_arithmetic_type(lhs_ty, rhs_ty, location)?;
    let is_float = is_floating_kind(&common.kind);
    let is_unsigned = matches!(common.kind, TypeKind::Builtin(b) if b.is_unsigned());

    let lhs_cast = implicit_cast(ctx, lhs_val, lhs_ty, &common, location)?;
    let rhs_cast = implicit_cast(ctx, rhs_val, rhs_ty, &common, location)?;

    if is_comparison(op) {
        let result = if is_float {
            ctx.builder
                .build_float_compare(float_predicate(op), lhs_cast.into_float_value(), rhs_cast.into_float_value(), "fcmp")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
        } else {
            ctx.builder
                .build_int_compare(int_predicate(op, is_unsigned), lhs_cast.into_int_value(), rhs_cast.into_int_value(), "icmp")
                .map_err(|e| CodegenError::new(e.to_string(), location))?
        };
        return Ok(ctx
            .builder
            .build_int_z_extend(result, ctx.context.bool_type(), "cmpz")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
            .into());
    }

    if is_float {
        let l = lhs_cast.into_float_value();
        let r = rhs_cast.into_float_value();
        let result = match op {
            BinOp::Add => ctx.builder.build_float_add(l, r, "fadd"),
            BinOp::Sub => ctx.builder.build_float_sub(l, r, "fsub"),
            BinOp::Mul => ctx.builder.build_float_mul(l, r, "fmul"),
            BinOp::Div => ctx.builder.build_float_div(l, r, "fdiv"),
            _ => return Err(CodegenError::todo("floating binop", location)),
        }
        .map_err(|e| CodegenError::new(e.to_string(), location))?;
        return Ok(result.into());
    }

    let l = lhs_cast.into_int_value();
    let r = rhs_cast.into_int_value();
    let result = match op {
        BinOp::Add => ctx.builder.build_int_add(l, r, "add"),
        BinOp::Sub => ctx.builder.build_int_sub(l, r, "sub"),
        BinOp::Mul => ctx.builder.build_int_mul(l, r, "mul"),
        BinOp::Div if is_unsigned => ctx.builder.build_int_unsigned_div(l, r, "udiv"),
        BinOp::Div => ctx.builder.build_int_signed_div(l, r, "sdiv"),
        BinOp::Mod if is_unsigned => ctx.builder.build_int_unsigned_rem(l, r, "urem"),
        BinOp::Mod => ctx.builder.build_int_signed_rem(l, r, "srem"),
        BinOp::Shl => ctx.builder.build_left_shift(l, r, "shl"),
        BinOp::Shr if is_unsigned => ctx.builder.build_right_shift(l, r, false, "lshr"),
        BinOp::Shr => ctx.builder.build_right_shift(l, r, true, "ashr"),
        BinOp::BitAnd => ctx.builder.build_and(l, r, "and"),
        BinOp::BitOr => ctx.builder.build_or(l, r, "or"),
        BinOp::BitXor => ctx.builder.build_xor(l, r, "xor"),
        _ => return Err(CodegenError::todo("integer binop", location)),
    }
    .map_err(|e| CodegenError::new(e.to_string(), location))?;
    Ok(result.into())
}

fn common_arithmetic_type(a: &Type, b: &Type, location: Location) -> CodegenResult<Type> {
    match (&a.kind, &b.kind) {
        (TypeKind::Builtin(ka), TypeKind::Builtin(kb)) if ka.is_integer() && kb.is_integer() => {
            Ok(Type::builtin(crate::sema::types::usual_arithmetic_conversion(*ka, *kb)))
        }
        (TypeKind::Builtin(ka), _) if ka.is_floating() => Ok(a.clone()),
        (_, TypeKind::Builtin(kb)) if kb.is_floating() => Ok(b.clone()),
        _ => Err(CodegenError::new("operands are not arithmetic types", location)),
    }
}

fn lower_conditional<'ctx>(
    ctx: &CodegenContext<'ctx>,
    cond: &Expression,
    then_branch: &Expression,
    else_branch: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let function = ctx.current_function().expect("conditional expression outside a function");
    let then_bb = ctx.context.append_basic_block(function, "cond_then");
    let else_bb = ctx.context.append_basic_block(function, "cond_else");
    let merge_bb = ctx.context.append_basic_block(function, "cond_merge");

    let cond_ty = ctx.sema.borrow().infer_type(cond)?;
    let cond_val = lower_rvalue(ctx, cond)?;
    let cond_bool = implicit_cast(ctx, cond_val, &cond_ty, &Type::builtin(BuiltinKind::Bool), location)?.into_int_value();
    ctx.builder
        .build_conditional_branch(cond_bool, then_bb, else_bb)
        .map_err(|e| CodegenError::new(e.to_string(), location))?;

    let then_ty = ctx.sema.borrow().infer_type(then_branch)?;
    let else_ty = ctx.sema.borrow().infer_type(else_branch)?;
    let common = common_arithmetic_type(&then_ty, &else_ty, location).unwrap_or(then_ty.clone());

    ctx.builder.position_at_end(then_bb);
    let then_val = lower_rvalue(ctx, then_branch)?;
    let then_cast = implicit_cast(ctx, then_val, &then_ty, &common, location)?;
    let then_pred = ctx.builder.get_insert_block().expect("builder always has a current insertion point");
    ctx.builder.build_unconditional_branch(merge_bb).map_err(|e| CodegenError::new(e.to_string(), location))?;

    ctx.builder.position_at_end(else_bb);
    let else_val = lower_rvalue(ctx, else_branch)?;
    let else_cast = implicit_cast(ctx, else_val, &else_ty, &common, location)?;
    let else_pred = ctx.builder.get_insert_block().expect("builder always has a current insertion point");
    ctx.builder.build_unconditional_branch(merge_bb).map_err(|e| CodegenError::new(e.to_string(), location))?;

    ctx.builder.position_at_end(merge_bb);
    let llvm_ty = ctx.llvm_type(&common)?;
    let phi = ctx
        .builder
        .build_phi(llvm_ty, "cond_result")
        .map_err(|e| CodegenError::new(e.to_string(), location))?;
    phi.add_incoming(&[(&then_cast as &dyn BasicValue, then_pred), (&else_cast as &dyn BasicValue, else_pred)]);
    Ok(phi.as_basic_value())
}

fn lower_call<'ctx>(
    ctx: &CodegenContext<'ctx>,
    callee: &Expression,
    args: &[Expression],
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let callee_ty = ctx.sema.borrow().infer_type(callee)?;
    let resolved_callee = ctx.sema.borrow().resolve_type(&callee_ty);
    let func_ty = match &resolved_callee.kind {
        TypeKind::Function { .. } => resolved_callee.clone(),
        TypeKind::Pointer(inner) => ctx.sema.borrow().resolve_type(inner),
        _ => return Err(CodegenError::new("called object is not a function", location)),
    };
    let TypeKind::Function { ret, params, .. } = &func_ty.kind else {
        return Err(CodegenError::new("called object is not a function", location));
    };

    let function_value = if let ExpressionKind::DeclRef(name) = &callee.kind {
        ctx.module.get_function(name)
    } else {
        None
    };

    let mut arg_values = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        let arg_ty = ctx.sema.borrow().infer_type(arg)?;
        let arg_val = lower_rvalue(ctx, arg)?;
        let casted = match params.get(i) {
            Some(p) => implicit_cast(ctx, arg_val, &arg_ty, &p.ty, location)?,
            None => arg_val, // varargs tail: passed through with default promotions elided (Non-goal)
        };
        arg_values.push(casted.into());
    }

    let call_site = if let Some(function_value) = function_value {
        ctx.builder
            .build_call(function_value, &arg_values, "call")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
    } else {
        let fn_ptr = lower_rvalue(ctx, callee)?.into_pointer_value();
        let fn_llvm_ty = ctx.llvm_function_type(ret, params, matches!(func_ty.kind, TypeKind::Function { varargs: true, .. }))?;
        ctx.builder
            .build_indirect_call(fn_llvm_ty, fn_ptr, &arg_values, "icall")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
    };

    match call_site.try_as_basic_value().left() {
        Some(value) => Ok(value),
        None => Ok(ctx.context.i32_type().const_zero().into()), // void-returning call used as a value never actually happens in well-typed code
    }
}

fn lower_stmt_expr<'ctx>(
    ctx: &CodegenContext<'ctx>,
    body: &crate::ast::Statement,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    use crate::ast::stmt::StatementKind;
    let StatementKind::Compound(stmts) = &body.kind else {
        return Err(CodegenError::new("statement expression body must be a compound statement", location));
    };

    ctx.enter_scope();
    ctx.sema.borrow_mut().enter_scope();
    let mut result = None;
    for (i, stmt) in stmts.iter().enumerate() {
        if i == stmts.len() - 1 {
            if let StatementKind::ExprStmt(e) = &stmt.kind {
                result = Some(lower_rvalue(ctx, e)?);
                continue;
            }
        }
        crate::codegen::stmt::lower_statement(ctx, stmt)?;
    }
    ctx.sema.borrow_mut().exit_scope();
    ctx.exit_scope();

    match result {
        Some(value) => Ok(value),
        None => Ok(ctx.context.i32_type().const_zero().into()),
    }
}

/// Implicit rvalue-to-rvalue conversion (spec §4.5).
pub fn implicit_cast<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    from: &Type,
    to: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let from_resolved = reduce_enum_to_int(ctx, from);
    let to_resolved = reduce_enum_to_int(ctx, to);

    if to_resolved.is_void() {
        return Ok(value); // evaluated for effect only
    }

    let from_llvm = ctx.llvm_type(&from_resolved)?;
    let to_llvm = ctx.llvm_type(&to_resolved)?;
    if from_llvm == to_llvm {
        return Ok(value);
    }

    if matches!(to_resolved.kind, TypeKind::Builtin(BuiltinKind::Bool)) {
        return cast_to_bool(ctx, value, &from_resolved, location);
    }

    match (&from_resolved.kind, &to_resolved.kind) {
        (TypeKind::Builtin(fk), TypeKind::Builtin(tk)) if fk.is_integer() && tk.is_integer() => {
            cast_int_to_int(ctx, value.into_int_value(), *fk, *tk, to_llvm.into_int_type(), location)
        }
        (TypeKind::Builtin(fk), TypeKind::Builtin(tk)) if fk.is_floating() && tk.is_floating() => {
            let from_width = float_width(*fk);
            let to_width = float_width(*tk);
            let result = if to_width > from_width {
                ctx.builder.build_float_ext(value.into_float_value(), to_llvm.into_float_type(), "fpext")
            } else {
                ctx.builder.build_float_trunc(value.into_float_value(), to_llvm.into_float_type(), "fptrunc")
            }
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(result.into())
        }
        (TypeKind::Builtin(fk), TypeKind::Builtin(tk)) if fk.is_floating() && tk.is_integer() => {
            let result = if tk.is_unsigned() {
                ctx.builder.build_float_to_unsigned_int(value.into_float_value(), to_llvm.into_int_type(), "fptoui")
            } else {
                ctx.builder.build_float_to_signed_int(value.into_float_value(), to_llvm.into_int_type(), "fptosi")
            }
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(result.into())
        }
        (TypeKind::Builtin(fk), TypeKind::Builtin(tk)) if fk.is_integer() && tk.is_floating() => {
            let result = if fk.is_unsigned() {
                ctx.builder.build_unsigned_int_to_float(value.into_int_value(), to_llvm.into_float_type(), "uitofp")
            } else {
                ctx.builder.build_signed_int_to_float(value.into_int_value(), to_llvm.into_float_type(), "sitofp")
            }
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(result.into())
        }
        (TypeKind::Builtin(fk), TypeKind::Pointer(_)) if fk.is_integer() => {
            let ptr_width_int = ctx.context.i64_type();
            let widened = if value.into_int_value().get_type().get_bit_width() < 64 {
                if fk.is_unsigned() {
                    ctx.builder.build_int_z_extend(value.into_int_value(), ptr_width_int, "zext")
                } else {
                    ctx.builder.build_int_s_extend(value.into_int_value(), ptr_width_int, "sext")
                }
                .map_err(|e| CodegenError::new(e.to_string(), location))?
            } else {
                value.into_int_value()
            };
            let ptr = ctx
                .builder
                .build_int_to_ptr(widened, to_llvm.into_pointer_type(), "inttoptr")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(ptr.into())
        }
        (TypeKind::Pointer(_), TypeKind::Pointer(_)) => Ok(value), // opaque pointers: identity
        (TypeKind::Pointer(_), TypeKind::Builtin(tk)) if tk.is_integer() => {
            let result = ctx
                .builder
                .build_ptr_to_int(value.into_pointer_value(), to_llvm.into_int_type(), "ptrtoint")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(result.into())
        }
        _ => Err(CodegenError::todo(
            &format!("implicit cast from {from_resolved} to {to_resolved}"),
            location,
        )),
    }
}

fn reduce_enum_to_int(ctx: &CodegenContext<'_>, ty: &Type) -> Type {
    let resolved = ctx.sema.borrow().resolve_type(ty);
    if matches!(resolved.kind, TypeKind::Enum { .. }) {
        Type::builtin(BuiltinKind::Int)
    } else {
        resolved
    }
}

fn cast_to_bool<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: BasicValueEnum<'ctx>,
    from: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let cmp = if is_floating_kind(&from.kind) {
        let zero = value.into_float_value().get_type().const_zero();
        ctx.builder
            .build_float_compare(FloatPredicate::UNE, value.into_float_value(), zero, "tobool")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
    } else if from.is_pointer() {
        let as_int = ctx
            .builder
            .build_ptr_to_int(value.into_pointer_value(), ctx.context.i64_type(), "ptrbool")
            .map_err(|e| CodegenError::new(e.to_string(), location))?;
        let zero = ctx.context.i64_type().const_zero();
        ctx.builder
            .build_int_compare(IntPredicate::NE, as_int, zero, "tobool")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
    } else {
        let int_val = value.into_int_value();
        let zero = int_val.get_type().const_zero();
        ctx.builder
            .build_int_compare(IntPredicate::NE, int_val, zero, "tobool")
            .map_err(|e| CodegenError::new(e.to_string(), location))?
    };
    Ok(ctx
        .builder
        .build_int_z_extend(cmp, ctx.context.bool_type(), "toboolz")
        .map_err(|e| CodegenError::new(e.to_string(), location))?
        .into())
}

fn cast_int_to_int<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: inkwell::values::IntValue<'ctx>,
    from_kind: BuiltinKind,
    _to_kind: BuiltinKind,
    to_llvm: inkwell::types::IntType<'ctx>,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let from_width = value.get_type().get_bit_width();
    let to_width = to_llvm.get_bit_width();
    let result = if to_width < from_width {
        ctx.builder.build_int_truncate(value, to_llvm, "trunc")
    } else if from_kind.is_unsigned() {
        ctx.builder.build_int_z_extend(value, to_llvm, "zext")
    } else {
        ctx.builder.build_int_s_extend(value, to_llvm, "sext")
    }
    .map_err(|e| CodegenError::new(e.to_string(), location))?;
    Ok(result.into())
}

fn float_width(kind: BuiltinKind) -> u32 {
    match kind {
        BuiltinKind::Float | BuiltinKind::ComplexFloat => 32,
        BuiltinKind::Double | BuiltinKind::ComplexDouble => 64,
        _ => 128,
    }
}

fn is_floating_kind(kind: &TypeKind) -> bool {
    matches!(kind, TypeKind::Builtin(b) if b.is_floating())
}
