//! Lowering of top-level declarations: globals and function definitions.
//! Unlike the teacher's two-pass function registration (forward references
//! resolved by scanning the whole file before lowering any body), a
//! translation unit here is lowered strictly in source order (spec §5) —
//! C already requires a function be declared before it is called, so Sema
//! enforces forward-reference ordering rather than codegen working around it.

use inkwell::types::BasicTypeEnum;

use crate::ast::toplevel::{FunctionParamDecl, TopLevelKind, TopLevelNode};
use crate::ast::types::Type;
use crate::codegen::constant::lower_constant;
use crate::codegen::context::CodegenContext;
use crate::codegen::error::{CodegenError, CodegenResult};
use crate::codegen::stmt::lower_statement;
use crate::lexer::Location;

pub fn lower_top_level<'ctx>(ctx: &CodegenContext<'ctx>, node: &TopLevelNode) -> CodegenResult<()> {
    match &node.kind {
        TopLevelKind::Typedef { .. }
        | TopLevelKind::StructDeclaration { .. }
        | TopLevelKind::UnionDeclaration { .. }
        | TopLevelKind::EnumDeclaration { .. }
        | TopLevelKind::StaticAssert { .. } => {
            // Purely a Sema-table concern; nothing to lower into IR. Sema
            // has already validated (and, for static_assert, evaluated) it
            // by the time the driver reaches codegen for this node.
            Ok(())
        }
        TopLevelKind::GlobalVariable { name, ty, init, is_static, is_extern } => {
            lower_global(ctx, name, ty, init.as_ref(), *is_static, *is_extern)
        }
        TopLevelKind::FunctionDefinition { name, ty, params, body, is_static } => {
            lower_function(ctx, name, ty, params, body, *is_static, node.location)
        }
    }
}

fn lower_global<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    ty: &Type,
    init: Option<&crate::ast::Expression>,
    is_static: bool,
    is_extern: bool,
) -> CodegenResult<()> {
    let resolved = ctx.sema.borrow().resolve_type(ty);
    if let crate::ast::types::TypeKind::Function { ret, params, varargs } = &resolved.kind {
        // A function-typed global with no body is a declaration (no definition exists for it).
        let fn_type = ctx.llvm_function_type(ret, params, *varargs)?;
        ctx.module.add_function(name, fn_type, None);
        return Ok(());
    }

    let llvm_ty = ctx.llvm_type(ty)?;
    let global = ctx.module.add_global(llvm_ty, None, name);

    if is_static {
        global.set_linkage(inkwell::module::Linkage::Internal);
    }

    match init {
        Some(init_expr) => {
            let value = lower_constant(ctx, init_expr, ty)?;
            global.set_initializer(&value);
        }
        None => {
            if is_extern {
                global.set_linkage(inkwell::module::Linkage::External);
            } else {
                global.set_initializer(&zero_initializer(llvm_ty));
            }
        }
    }

    Ok(())
}

fn zero_initializer(ty: BasicTypeEnum<'_>) -> inkwell::values::BasicValueEnum<'_> {
    match ty {
        BasicTypeEnum::IntType(t) => t.const_zero().into(),
        BasicTypeEnum::FloatType(t) => t.const_zero().into(),
        BasicTypeEnum::PointerType(t) => t.const_zero().into(),
        BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
        BasicTypeEnum::StructType(t) => t.const_zero().into(),
        BasicTypeEnum::VectorType(t) => t.const_zero().into(),
    }
}

fn lower_function<'ctx>(
    ctx: &CodegenContext<'ctx>,
    name: &str,
    ty: &Type,
    params: &[FunctionParamDecl],
    body: &crate::ast::Statement,
    is_static: bool,
    location: Location,
) -> CodegenResult<()> {
    let resolved = ctx.sema.borrow().resolve_type(ty);
    let crate::ast::types::TypeKind::Function { ret, params: param_types, varargs } = &resolved.kind else {
        return Err(CodegenError::new(format!("'{name}' is declared as a function body but its type is not a function type"), location));
    };

    let function = match ctx.module.get_function(name) {
        Some(existing) => existing,
        None => {
            let fn_type = ctx.llvm_function_type(ret, param_types, *varargs)?;
            ctx.module.add_function(name, fn_type, None)
        }
    };

    if is_static {
        function.set_linkage(inkwell::module::Linkage::Internal);
    }

    ctx.attach_subprogram(function, name, is_static);

    let entry = ctx.context.append_basic_block(function, "entry");
    ctx.builder.position_at_end(entry);
    ctx.set_current_function(function);

    ctx.enter_scope();
    ctx.sema.borrow_mut().enter_scope();

    for (i, param) in params.iter().enumerate() {
        let Some(param_name) = &param.name else {
            continue; // an unnamed parameter (e.g. in a prototype-shaped definition) can't be referenced
        };
        let llvm_param = function
            .get_nth_param(i as u32)
            .expect("parameter count matches the function's declared signature");
        let llvm_ty = ctx.llvm_type(&param.ty)?;
        let alloca = ctx.build_entry_alloca(param_name, llvm_ty)?;
        ctx.builder
            .build_store(alloca, llvm_param)
            .map_err(|e| CodegenError::new(format!("failed to store parameter '{param_name}': {e}"), location))?;
        ctx.declare_local(param_name.clone(), param.ty.clone(), alloca);
        ctx.sema.borrow_mut().declare_local(param_name.clone(), param.ty.clone());
    }

    lower_statement(ctx, body)?;

    let current_block = ctx.builder.get_insert_block().expect("builder always has a current insertion point");
    if current_block.get_terminator().is_none() {
        if ret.is_void() {
            ctx.builder
                .build_return(None)
                .map_err(|e| CodegenError::new(format!("failed to build implicit return: {e}"), location))?;
        } else {
            // Falling off the end of a non-void function is undefined behavior in C;
            // model it as a trap rather than returning an unspecified value.
            build_trap(ctx, location)?;
        }
    }

    ctx.sema.borrow_mut().exit_scope();
    ctx.exit_scope();

    Ok(())
}

fn build_trap<'ctx>(ctx: &CodegenContext<'ctx>, location: Location) -> CodegenResult<()> {
    let trap_fn = ctx.module.get_function("llvm.debugtrap").unwrap_or_else(|| {
        let fn_type = ctx.context.void_type().fn_type(&[], false);
        ctx.module.add_function("llvm.debugtrap", fn_type, None)
    });
    ctx.builder
        .build_call(trap_fn, &[], "")
        .map_err(|e| CodegenError::new(format!("failed to build trap call: {e}"), location))?;
    ctx.builder
        .build_unreachable()
        .map_err(|e| CodegenError::new(format!("failed to build unreachable: {e}"), location))?;
    Ok(())
}
