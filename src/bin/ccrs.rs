use anyhow::Result;
use ccrs::cli::Cli;
use ccrs::driver::{compile_file, EmitKind};
use log::error;

fn main() -> Result<()> {
    let args = Cli::init();

    simple_logger::init_with_level(args.verbosity.into()).unwrap();

    let emit = if args.emit_llvm { EmitKind::LlvmIr } else { EmitKind::Object };

    if let Err(e) = compile_file(&args.input_file, &args.output, emit) {
        error!("{e}");
        std::process::exit(-1);
    }

    Ok(())
}
