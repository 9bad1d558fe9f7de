pub mod ast;
pub mod codegen;
pub mod diagnostics;
pub mod hierarchy;
pub mod input;
pub mod layout;
pub mod semant;
pub mod span;
pub mod symbols;

use ast::Program;
use codegen::tac::TacProgram;
use codegen::CodegenOptions;
use diagnostics::CompileError;
use semant::Analysis;
use symbols::{Interner, WellKnown};

/// Run semantic analysis: install the basic classes, build and validate the
/// hierarchy, then run the four gated passes. On success the returned
/// analysis carries the fully annotated program; on failure the error holds
/// either the fatal hierarchy diagnostic or the accumulated semantic ones.
pub fn analyze(program: Program, interner: &mut Interner) -> Result<Analysis, CompileError> {
    let wk = WellKnown::install(interner);
    semant::analyze(program, interner, wk)
}

/// Lower an analyzed program to the assembly text stream.
pub fn emit_asm(analysis: &Analysis, interner: &Interner, opts: CodegenOptions) -> String {
    codegen::asm::emit_program(analysis, interner, opts)
}

/// Lower an analyzed program to the three-address form.
pub fn emit_tac(analysis: &Analysis, interner: &Interner, opts: CodegenOptions) -> TacProgram {
    codegen::tac::emit_program(analysis, interner, opts)
}

/// Parse a JSON AST dump, analyze it, and render assembly. Used by the
/// driver and by tests that want the whole back half in one call.
pub fn compile_json_to_asm(json: &str, opts: CodegenOptions) -> Result<String, CompileError> {
    let mut interner = Interner::new();
    let program = input::parse_program(json, &mut interner)?;
    let analysis = analyze(program, &mut interner)?;
    Ok(emit_asm(&analysis, &interner, opts))
}

/// Parse a JSON AST dump, analyze it, and render the three-address form.
pub fn compile_json_to_tac(json: &str, opts: CodegenOptions) -> Result<String, CompileError> {
    let mut interner = Interner::new();
    let program = input::parse_program(json, &mut interner)?;
    let analysis = analyze(program, &mut interner)?;
    Ok(emit_tac(&analysis, &interner, opts).render(&interner))
}
