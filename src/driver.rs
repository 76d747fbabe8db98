//! Threads a translation unit through lexing, parsing, Sema, and lowering.
//!
//! Per spec §5, Sema's tables are mutated by the driver only, between
//! top-level nodes — the parser and lowerer read Sema state but never
//! mutate it (besides the lowerer's own pointer-type arena growth). This
//! module is therefore the only place that calls both a `Sema::insert_*`
//! and `codegen::lower_top_level` for the same node.

use std::fmt;
use std::fs;
use std::path::Path;

use inkwell::context::Context;

use crate::ast::{TopLevelKind, TopLevelNode};
use crate::codegen::{self, CodegenContext};
use crate::parser::Parser;

#[derive(Debug)]
pub enum DriverError {
    Io(std::io::Error),
    Parse(crate::parser::ParseError),
    Sema(crate::sema::SemaError),
    Codegen(crate::codegen::CodegenError),
    Verify(String),
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Io(e) => write!(f, "I/O error: {e}"),
            DriverError::Parse(e) => write!(f, "parse error: {e}"),
            DriverError::Sema(e) => write!(f, "semantic error: {e}"),
            DriverError::Codegen(e) => write!(f, "codegen error: {e}"),
            DriverError::Verify(msg) => write!(f, "LLVM verification failed: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {}

impl From<std::io::Error> for DriverError {
    fn from(e: std::io::Error) -> Self {
        DriverError::Io(e)
    }
}
impl From<crate::parser::ParseError> for DriverError {
    fn from(e: crate::parser::ParseError) -> Self {
        DriverError::Parse(e)
    }
}
impl From<crate::sema::SemaError> for DriverError {
    fn from(e: crate::sema::SemaError) -> Self {
        DriverError::Sema(e)
    }
}
impl From<crate::codegen::CodegenError> for DriverError {
    fn from(e: crate::codegen::CodegenError) -> Self {
        DriverError::Codegen(e)
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// What the caller asked the compiler to emit (spec §6's `--emit-llvm` flag).
pub enum EmitKind {
    Object,
    LlvmIr,
}

pub fn compile_file(input_file: &Path, output_path: &Path, emit: EmitKind) -> DriverResult<()> {
    let source = fs::read_to_string(input_file)?;
    let source_file_name = input_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<input>".to_string());

    log::info!("compiling {}", input_file.display());

    let mut parser = Parser::from_source(&source)?;
    let nodes = parser.parse_translation_unit()?;
    log::debug!("{:#?}", nodes);

    let context = Context::create();
    let module_name = input_file.to_string_lossy();
    let ctx = CodegenContext::new(&context, &module_name, &source_file_name);

    for node in &nodes {
        process_top_level(&ctx, node)?;
    }

    ctx.finalize_debug_info();

    ctx.module
        .verify()
        .map_err(|e| DriverError::Verify(e.to_string()))?;

    match emit {
        EmitKind::LlvmIr => {
            ctx.module
                .print_to_file(output_path)
                .map_err(|e| DriverError::Verify(e.to_string()))?;
        }
        EmitKind::Object => {
            write_object_file(&ctx, output_path)?;
        }
    }

    log::info!("wrote {}", output_path.display());
    Ok(())
}

/// Compiles a translation unit held in memory rather than on disk, returning
/// the resulting module as textual LLVM IR. Used by integration tests that
/// want to drive the full lex-parse-Sema-lower-verify pipeline without
/// touching the filesystem; `compile_file` itself is a thin wrapper that adds
/// file I/O and object emission around the same steps.
pub fn compile_source(source: &str, module_name: &str) -> DriverResult<String> {
    let mut parser = Parser::from_source(source)?;
    let nodes = parser.parse_translation_unit()?;

    let context = Context::create();
    let ctx = CodegenContext::new(&context, module_name, module_name);

    for node in &nodes {
        process_top_level(&ctx, node)?;
    }

    ctx.finalize_debug_info();
    ctx.module
        .verify()
        .map_err(|e| DriverError::Verify(e.to_string()))?;

    Ok(ctx.module.print_to_string().to_string())
}

fn write_object_file(ctx: &CodegenContext, output_path: &Path) -> DriverResult<()> {
    use inkwell::targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine};

    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| DriverError::Verify(e.to_string()))?;
    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple).map_err(|e| DriverError::Verify(e.to_string()))?;
    let machine = target
        .create_target_machine(
            &triple,
            &TargetMachine::get_host_cpu_name().to_string(),
            &TargetMachine::get_host_cpu_features().to_string(),
            inkwell::OptimizationLevel::None,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| DriverError::Verify("no target machine for the host triple".to_string()))?;

    machine
        .write_to_file(&ctx.module, FileType::Object, output_path)
        .map_err(|e| DriverError::Verify(e.to_string()))
}

fn process_top_level(ctx: &CodegenContext, node: &TopLevelNode) -> DriverResult<()> {
    {
        let mut sema = ctx.sema.borrow_mut();
        match &node.kind {
            TopLevelKind::Typedef { name, ty } => {
                sema.insert_typedef(name.clone(), ty.clone(), node.location)?;
            }
            TopLevelKind::StructDeclaration { tag, ty } => {
                sema.insert_struct_tag(tag.clone(), ty.clone(), node.location)?;
            }
            TopLevelKind::UnionDeclaration { tag, ty } => {
                sema.insert_union_tag(tag.clone(), ty.clone(), node.location)?;
            }
            TopLevelKind::EnumDeclaration { tag, ty } => {
                sema.insert_enum_tag(tag.clone(), ty.clone(), node.location)?;
            }
            TopLevelKind::StaticAssert { cond, .. } => {
                sema.check_static_assert(cond)?;
            }
            TopLevelKind::GlobalVariable { name, .. } | TopLevelKind::FunctionDefinition { name, .. } => {
                sema.insert_global(name.clone(), node.clone(), node.location)?;
            }
        }
    }

    codegen::lower_top_level(ctx, node)?;

    if let TopLevelKind::FunctionDefinition { name, .. } = &node.kind {
        if let Some(function) = ctx.module.get_function(name) {
            if !function.verify(true) {
                return Err(DriverError::Verify(format!("function '{name}' failed LLVM verification")));
            }
        }
    }

    Ok(())
}
