//! The lowering context: LLVM context/module/builder plus the scope stack
//! threaded through every recursive lowering call (spec §4.5).
//!
//! Each lexical scope clones its parent's `locals` (declared `Type`s, for
//! Sema-flavored queries during lowering) and `allocas` (the IR pointers
//! backing them) maps rather than sharing them, so an inner declaration
//! shadows the outer one without disturbing it — exactly the "cloned
//! environment" model spec.md calls out as the one part of this design a
//! persistent, copy-on-write map would strictly improve on (§9).

use std::cell::RefCell;
use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::Builder;
use inkwell::context::Context;
use inkwell::debug_info::{
    DICompileUnit, DISubprogram, DWARFEmissionKind, DWARFSourceLanguage, DebugInfoBuilder,
};
use inkwell::module::Module;
use inkwell::types::{BasicType, BasicTypeEnum, FunctionType};
use inkwell::values::{FunctionValue, PointerValue};
use inkwell::AddressSpace;

use crate::ast::types::{BuiltinKind, Type, TypeKind};
use crate::codegen::error::{CodegenError, CodegenResult};
use crate::lexer::Location;
use crate::sema::Sema;

/// One lexical scope's worth of locals. Cloned on every scope entry.
#[derive(Clone, Default)]
pub struct Scope<'ctx> {
    pub locals: HashMap<String, Type>,
    pub allocas: HashMap<String, PointerValue<'ctx>>,
}

/// The `break`/`continue` target pair threaded down through control-flow
/// lowering, pushed per loop/switch and popped on exit.
#[derive(Clone, Copy)]
pub struct LoopTargets<'ctx> {
    pub break_bb: BasicBlock<'ctx>,
    pub continue_bb: BasicBlock<'ctx>,
}

pub struct CodegenContext<'ctx> {
    pub context: &'ctx Context,
    pub module: Module<'ctx>,
    pub builder: Builder<'ctx>,
    pub sema: RefCell<Sema>,
    /// Debug-info compile unit attached to the module, per the output
    /// contract (spec §6): every translation unit carries one, with
    /// placeholder line numbers rather than tracked source positions.
    pub debug_builder: DebugInfoBuilder<'ctx>,
    pub compile_unit: DICompileUnit<'ctx>,
    scopes: RefCell<Vec<Scope<'ctx>>>,
    struct_cache: RefCell<HashMap<String, inkwell::types::StructType<'ctx>>>,
    current_function: RefCell<Option<FunctionValue<'ctx>>>,
    loop_stack: RefCell<Vec<LoopTargets<'ctx>>>,
}

impl<'ctx> CodegenContext<'ctx> {
    pub fn new(context: &'ctx Context, module_name: &str, source_file: &str) -> Self {
        let module = context.create_module(module_name);
        let (debug_builder, compile_unit) = module.create_debug_info_builder(
            true,
            DWARFSourceLanguage::C99,
            source_file,
            ".",
            "ccrs",
            false,
            "",
            0,
            "",
            DWARFEmissionKind::Full,
            0,
            false,
            false,
            "",
            "",
        );
        CodegenContext {
            context,
            module,
            builder: context.create_builder(),
            sema: RefCell::new(Sema::new()),
            debug_builder,
            compile_unit,
            scopes: RefCell::new(vec![Scope::default()]),
            struct_cache: RefCell::new(HashMap::new()),
            current_function: RefCell::new(None),
            loop_stack: RefCell::new(Vec::new()),
        }
    }

    /// Creates a placeholder `DISubprogram` for a function, attached at
    /// line 0/1 since source spans aren't tracked through lowering, and
    /// attaches it to `function`. Called once per function definition
    /// before its body is lowered.
    pub fn attach_subprogram(&self, function: FunctionValue<'ctx>, name: &str, is_local: bool) -> DISubprogram<'ctx> {
        let file = self.compile_unit.get_file();
        let subroutine_type = self.debug_builder.create_subroutine_type(file, None, &[], 0);
        let subprogram = self.debug_builder.create_function(
            self.compile_unit.as_debug_info_scope(),
            name,
            None,
            file,
            1,
            subroutine_type,
            is_local,
            true,
            1,
            0,
            false,
        );
        function.set_subprogram(subprogram);
        subprogram
    }

    pub fn finalize_debug_info(&self) {
        self.debug_builder.finalize();
    }

    pub fn enter_scope(&self) {
        let top = self.scopes.borrow().last().cloned().unwrap_or_default();
        self.scopes.borrow_mut().push(top);
    }

    pub fn exit_scope(&self) {
        self.scopes.borrow_mut().pop();
    }

    pub fn declare_local(&self, name: impl Into<String>, ty: Type, alloca: PointerValue<'ctx>) {
        let name = name.into();
        let mut scopes = self.scopes.borrow_mut();
        let scope = scopes.last_mut().expect("at least one scope is always active");
        scope.locals.insert(name.clone(), ty);
        scope.allocas.insert(name, alloca);
    }

    pub fn find_local_type(&self, name: &str) -> Option<Type> {
        self.scopes.borrow().last().and_then(|s| s.locals.get(name).cloned())
    }

    pub fn find_alloca(&self, name: &str) -> Option<PointerValue<'ctx>> {
        self.scopes.borrow().last().and_then(|s| s.allocas.get(name).copied())
    }

    pub fn current_function(&self) -> Option<FunctionValue<'ctx>> {
        *self.current_function.borrow()
    }

    pub fn set_current_function(&self, function: FunctionValue<'ctx>) {
        *self.current_function.borrow_mut() = Some(function);
    }

    pub fn push_loop_targets(&self, targets: LoopTargets<'ctx>) {
        self.loop_stack.borrow_mut().push(targets);
    }

    pub fn pop_loop_targets(&self) {
        self.loop_stack.borrow_mut().pop();
    }

    pub fn loop_targets(&self, location: Location) -> CodegenResult<LoopTargets<'ctx>> {
        self.loop_stack
            .borrow()
            .last()
            .copied()
            .ok_or_else(|| CodegenError::new("break/continue outside of a loop or switch", location))
    }

    /// Allocas are hoisted to the start of the function's entry block, not
    /// emitted at use site, so the stack pointer stays constant across
    /// loop iterations (spec §4.5).
    pub fn build_entry_alloca(
        &self,
        name: &str,
        ty: BasicTypeEnum<'ctx>,
    ) -> CodegenResult<PointerValue<'ctx>> {
        let function = self
            .current_function()
            .expect("build_entry_alloca called outside of a function body");
        let entry = function.get_first_basic_block().expect("function always has an entry block");

        let builder = self.context.create_builder();
        match entry.get_first_instruction() {
            Some(first) => builder.position_before(&first),
            None => builder.position_at_end(entry),
        }
        builder
            .build_alloca(ty, name)
            .map_err(|e| CodegenError::new(format!("failed to build alloca: {e}"), Location::default()))
    }

    /// Resolves an AST `Type` to its LLVM representation. Struct/union tags
    /// are cached by name so self-referential types (`struct Node { struct
    /// Node *next; }`) terminate via an opaque-then-filled struct type
    /// instead of recursing forever.
    pub fn llvm_type(&self, ty: &Type) -> CodegenResult<BasicTypeEnum<'ctx>> {
        let resolved = self.sema.borrow().resolve_type(ty);
        match &resolved.kind {
            TypeKind::Builtin(b) => self.llvm_builtin_type(*b),
            TypeKind::Named(_) => unreachable!("resolve_type always flattens Named"),
            TypeKind::Pointer(_) => Ok(self.context.ptr_type(AddressSpace::default()).into()),
            TypeKind::Array { element, size } => {
                let elem_ty = self.llvm_type(element)?;
                let count = match size {
                    Some(expr) => self.sema.borrow().const_eval(expr)?.as_u64() as u32,
                    None => 0,
                };
                Ok(elem_ty.array_type(count).into())
            }
            TypeKind::Function { .. } => Err(CodegenError::new(
                "a bare function type has no value representation; use a function pointer",
                Location::default(),
            )),
            TypeKind::Struct { tag, members, .. } => self.llvm_struct_or_union_type(tag.as_deref(), members, false),
            TypeKind::Union { tag, members, .. } => self.llvm_struct_or_union_type(tag.as_deref(), members, true),
            TypeKind::Enum { .. } => self.llvm_builtin_type(BuiltinKind::Int),
        }
    }

    fn llvm_builtin_type(&self, kind: BuiltinKind) -> CodegenResult<BasicTypeEnum<'ctx>> {
        use BuiltinKind::*;
        Ok(match kind {
            Void => return Err(CodegenError::new("void has no value type", Location::default())),
            Bool => self.context.bool_type().into(),
            Char | SignedChar | UnsignedChar => self.context.i8_type().into(),
            Short | UnsignedShort => self.context.i16_type().into(),
            Int | UnsignedInt => self.context.i32_type().into(),
            Long | UnsignedLong | LongLong | UnsignedLongLong => self.context.i64_type().into(),
            Float => self.context.f32_type().into(),
            Double => self.context.f64_type().into(),
            LongDouble | Float128 => self.context.f128_type().into(),
            ComplexFloat => self.context.f32_type().vec_type(2).into(),
            ComplexDouble => self.context.f64_type().vec_type(2).into(),
            ComplexLongDouble => self.context.f128_type().vec_type(2).into(),
            BuiltinVaList => self.context.i8_type().array_type(24).into(),
        })
    }

    fn llvm_struct_or_union_type(
        &self,
        tag: Option<&str>,
        members: &Option<Vec<crate::ast::types::Member>>,
        is_union: bool,
    ) -> CodegenResult<BasicTypeEnum<'ctx>> {
        let key = tag.map(|t| t.to_string());

        // A tag already cached with a body is reused outright. A forward
        // reference (`members: None`) to an already-opaque cached type also
        // reuses it, rather than creating a second opaque struct with the
        // same name (which LLVM would rename).
        if let Some(key) = &key {
            if let Some(cached) = self.struct_cache.borrow().get(key) {
                if members.is_none() || !cached.is_opaque() {
                    return Ok((*cached).into());
                }
            }
        }

        let opaque = match &key {
            Some(name) => self.context.opaque_struct_type(name),
            None => self.context.opaque_struct_type("anon"),
        };
        if let Some(key) = &key {
            self.struct_cache.borrow_mut().insert(key.clone(), opaque);
        }

        if let Some(members) = members {
            let field_types: Vec<BasicTypeEnum<'ctx>> = if is_union {
                // A union is represented as its single widest member, by
                // AST-computed size (spec §4.4's union size/align rule),
                // rather than the LLVM store size of an arbitrary type.
                let widest_member = members
                    .iter()
                    .max_by_key(|m| crate::sema::types::size_of(&self.sema.borrow().resolve_type(&m.ty)).unwrap_or(0));
                match widest_member {
                    Some(m) => vec![self.llvm_type(&m.ty)?],
                    None => Vec::new(),
                }
            } else {
                members
                    .iter()
                    .map(|m| self.llvm_type(&m.ty))
                    .collect::<CodegenResult<Vec<_>>>()?
            };
            opaque.set_body(&field_types, false);
        }

        Ok(opaque.into())
    }

    pub fn llvm_function_type(
        &self,
        ret: &Type,
        params: &[crate::ast::types::Param],
        varargs: bool,
    ) -> CodegenResult<FunctionType<'ctx>> {
        let param_types: Vec<_> = params
            .iter()
            .map(|p| self.llvm_type(&p.ty).map(|t| t.into()))
            .collect::<CodegenResult<Vec<inkwell::types::BasicMetadataTypeEnum>>>()?;

        Ok(if ret.is_void() {
            self.context.void_type().fn_type(&param_types, varargs)
        } else {
            self.llvm_type(ret)?.fn_type(&param_types, varargs)
        })
    }
}
