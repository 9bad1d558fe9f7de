use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use opalc::codegen::{CodegenOptions, GcPolicy};
use opalc::diagnostics::{render_error, CompileError};
use opalc::symbols::Interner;

#[derive(Parser)]
#[command(
    name = "opalc",
    about = "Semantic analyzer and code generator for the Opal language"
)]
struct Cli {
    /// Parsed program: a JSON AST dump produced by the front end.
    input: PathBuf,

    /// Output file; stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output representation.
    #[arg(long, value_enum, default_value_t = Emit::Asm)]
    emit: Emit,

    /// Collector the emitted code is wired to.
    #[arg(long, value_enum, default_value_t = Gc::None)]
    gc: Gc,

    /// Enable the collector's test mode.
    #[arg(long)]
    gc_test: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Emit {
    Asm,
    Tac,
}

#[derive(Clone, Copy, ValueEnum)]
enum Gc {
    None,
    Scan,
    Gen,
}

impl From<Gc> for GcPolicy {
    fn from(gc: Gc) -> Self {
        match gc {
            Gc::None => GcPolicy::None,
            Gc::Scan => GcPolicy::Scan,
            Gc::Gen => GcPolicy::Generational,
        }
    }
}

fn run(cli: &Cli) -> Result<(), CompileError> {
    let json = std::fs::read_to_string(&cli.input)
        .map_err(|e| CompileError::input(format!("failed to read '{}': {e}", cli.input.display())))?;

    let mut interner = Interner::new();
    let program = opalc::input::parse_program(&json, &mut interner)?;
    let analysis = opalc::analyze(program, &mut interner)?;

    let opts = CodegenOptions { gc: cli.gc.into(), gc_test: cli.gc_test };
    let text = match cli.emit {
        Emit::Asm => opalc::emit_asm(&analysis, &interner, opts),
        Emit::Tac => opalc::emit_tac(&analysis, &interner, opts).render(&interner),
    };

    match &cli.output {
        Some(path) => std::fs::write(path, text)
            .map_err(|e| CompileError::codegen(format!("failed to write '{}': {e}", path.display())))?,
        None => print!("{text}"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", render_error(&err));
            ExitCode::FAILURE
        }
    }
}
