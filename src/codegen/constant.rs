//! Constant-expression lowering for global initializers. Kept separate from
//! `expr.rs`'s IR-builder lowering: a global initializer is LLVM constant
//! data, never an instruction, so it goes through Sema's `const_eval` and
//! LLVM's `const_*` constructors instead of a `Builder`.

use inkwell::types::BasicTypeEnum;
use inkwell::values::BasicValueEnum;

use crate::ast::expr::{ExpressionKind, InitializerElement, UnOp};
use crate::ast::types::{Type, TypeKind};
use crate::ast::Expression;
use crate::codegen::context::CodegenContext;
use crate::codegen::error::{CodegenError, CodegenResult};
use crate::lexer::Location;
use crate::sema::const_eval::ConstValue;

pub fn lower_constant<'ctx>(
    ctx: &CodegenContext<'ctx>,
    expr: &Expression,
    target_ty: &Type,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match &expr.kind {
        ExpressionKind::String(s) => lower_constant_string(ctx, s, target_ty, expr.location),
        ExpressionKind::InitializerList(elements) => lower_constant_list(ctx, elements, target_ty, expr.location),
        ExpressionKind::UnOp { op: UnOp::Addr, operand } => lower_constant_address_of(ctx, operand, expr.location),
        _ => {
            let value = ctx.sema.borrow().const_eval(expr)?;
            let resolved_target = ctx.sema.borrow().resolve_type(target_ty);
            constant_scalar(ctx, value, &resolved_target, expr.location)
        }
    }
}

fn constant_scalar<'ctx>(
    ctx: &CodegenContext<'ctx>,
    value: ConstValue,
    target: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let llvm_ty = ctx.llvm_type(target)?;
    match llvm_ty {
        BasicTypeEnum::IntType(t) => Ok(t.const_int(value.as_u64(), false).into()),
        BasicTypeEnum::FloatType(t) => Ok(t.const_float(value.as_i64() as f64).into()),
        _ => Err(CodegenError::new(
            format!("cannot lower a scalar constant into aggregate type {target}"),
            location,
        )),
    }
}

fn lower_constant_string<'ctx>(
    ctx: &CodegenContext<'ctx>,
    s: &str,
    target_ty: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let resolved = ctx.sema.borrow().resolve_type(target_ty);
    match &resolved.kind {
        TypeKind::Pointer(_) => {
            let global = ctx
                .builder
                .build_global_string_ptr(s, "str")
                .map_err(|e| CodegenError::new(e.to_string(), location))?;
            Ok(global.as_pointer_value().into())
        }
        TypeKind::Array { size, .. } => {
            let declared_len = match size {
                Some(expr) => Some(ctx.sema.borrow().const_eval(expr)?.as_u64() as usize),
                None => None,
            };
            let mut bytes: Vec<u8> = s.bytes().collect();
            bytes.push(0); // NUL terminator, per a plain char array initialized from a string literal
            if let Some(len) = declared_len {
                bytes.resize(len, 0);
            }
            let values: Vec<_> = bytes
                .into_iter()
                .map(|b| ctx.context.i8_type().const_int(b as u64, false))
                .collect();
            Ok(ctx.context.i8_type().const_array(&values).into())
        }
        _ => Err(CodegenError::new("a string literal cannot initialize this type", location)),
    }
}

fn lower_constant_address_of<'ctx>(
    ctx: &CodegenContext<'ctx>,
    operand: &Expression,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    match &operand.kind {
        ExpressionKind::DeclRef(name) => {
            if let Some(global) = ctx.module.get_global(name) {
                return Ok(global.as_pointer_value().into());
            }
            if let Some(function) = ctx.module.get_function(name) {
                return Ok(function.as_global_value().as_pointer_value().into());
            }
            Err(CodegenError::new(format!("undeclared identifier '{name}'"), location))
        }
        _ => Err(CodegenError::todo("address-of a non-identifier in a constant initializer", location)),
    }
}

fn lower_constant_list<'ctx>(
    ctx: &CodegenContext<'ctx>,
    elements: &[InitializerElement],
    target_ty: &Type,
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    let resolved = ctx.sema.borrow().resolve_type(target_ty);
    match &resolved.kind {
        TypeKind::Array { element, size } => {
            let elem_llvm = ctx.llvm_type(element)?;
            let mut values = Vec::with_capacity(elements.len());
            for el in elements {
                values.push(lower_constant(ctx, &el.value, element)?);
            }
            if let Some(size_expr) = size {
                let n = ctx.sema.borrow().const_eval(size_expr)?.as_u64() as usize;
                while values.len() < n {
                    values.push(zero_value(elem_llvm));
                }
            }
            build_const_array(elem_llvm, &values, location)
        }
        TypeKind::Struct { members: Some(members), .. } => {
            let mut field_values = Vec::with_capacity(members.len());
            let mut next_positional = 0usize;
            for member in members {
                let designated = elements.iter().find(|e| e.designator.as_deref() == Some(member.name.as_str()));
                let source = match designated {
                    Some(el) => Some(el),
                    None => {
                        let el = elements.get(next_positional).filter(|e| e.designator.is_none());
                        if el.is_some() {
                            next_positional += 1;
                        }
                        el
                    }
                };
                let value = match source {
                    Some(el) => lower_constant(ctx, &el.value, &member.ty)?,
                    None => zero_value(ctx.llvm_type(&member.ty)?),
                };
                field_values.push(value);
            }
            Ok(ctx.context.const_struct(&field_values, false).into())
        }
        _ => Err(CodegenError::new("an initializer list requires an array or struct target type", location)),
    }
}

fn zero_value(ty: BasicTypeEnum<'_>) -> BasicValueEnum<'_> {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_zero().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
    }
}

fn build_const_array<'ctx>(
    elem_ty: BasicTypeEnum<'ctx>,
    values: &[BasicValueEnum<'ctx>],
    location: Location,
) -> CodegenResult<BasicValueEnum<'ctx>> {
    Ok(match elem_ty {
        BasicTypeEnum::IntType(t) => t
            .const_array(&values.iter().map(|v| v.into_int_value()).collect::<Vec<_>>())
            .into(),
        BasicTypeEnum::FloatType(t) => t
            .const_array(&values.iter().map(|v| v.into_float_value()).collect::<Vec<_>>())
            .into(),
        BasicTypeEnum::PointerType(t) => t
            .const_array(&values.iter().map(|v| v.into_pointer_value()).collect::<Vec<_>>())
            .into(),
        BasicTypeEnum::ArrayType(t) => t
            .const_array(&values.iter().map(|v| v.into_array_value()).collect::<Vec<_>>())
            .into(),
        BasicTypeEnum::StructType(t) => t
            .const_array(&values.iter().map(|v| v.into_struct_value()).collect::<Vec<_>>())
            .into(),
        BasicTypeEnum::VectorType(_) => {
            return Err(CodegenError::new("vector-typed array elements are not supported", location))
        }
    })
}
