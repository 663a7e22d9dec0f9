//! Scheme to x86-64 native-assembly compiler.
//!
//! The pipeline runs strictly forward, each stage consuming the previous
//! stage's output:
//!
//! 1. Reader: character stream to S-expressions.
//! 2. Tag parser: S-expressions to core forms, expanding derived forms
//!    source-to-source on the way.
//! 3. Semantic analysis, three passes: lexical addressing, tail-call
//!    annotation, automatic boxing of mutated closed-over parameters.
//! 4. Constants and free-variables tables over the analyzed program.
//! 5. Code generation: assembly text with closure code, calling-convention
//!    aware application, and tail-call frame recycling.
//!
//! The produced `.asm` file is finished by an external assembler and linker
//! together with the runtime library; nothing here executes generated code.

pub mod boxing;
pub mod codegen;
pub mod error;
pub mod expander;
pub mod lexical;
pub mod primitives;
pub mod reader;
pub mod runtime_asm;
pub mod sexpr;
pub mod tables;
pub mod tails;
pub mod tree_il;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use boxing::pass_boxing;
use codegen::CodeGen;
use error::CompileError;
use expander::parse_program;
use lexical::pass_lexical;
use reader::{Reader, SymbolInterner};
use tables::{ConstantsTable, FreeVarTable};
use tails::pass_tails;
use tree_il::AExpr;

/// Reads, parses, and analyzes a whole program.
pub fn analyze_string(source: &str) -> Result<Vec<Rc<AExpr>>, CompileError> {
    let interner = SymbolInterner::new();
    let forms = Reader::new(source, &interner).read_program()?;
    log::debug!("read {} top-level forms", forms.len());

    let exprs = parse_program(&forms, &interner)?;
    Ok(exprs
        .iter()
        .map(|e| pass_boxing(&pass_tails(&pass_lexical(e))))
        .collect())
}

/// Compiles a program to a complete assembly file.
pub fn compile_string(source: &str) -> Result<String, CompileError> {
    let program = analyze_string(source)?;
    let consts = ConstantsTable::build(&program);
    let fvars = FreeVarTable::build(&program);
    log::debug!(
        "{} constants, {} free variables",
        consts.entries().len(),
        fvars.names().len()
    );
    CodeGen::compile_program(&program, &consts, &fvars)
}

/// Compiles `input` and writes `<out_base>.asm`; returns the written path.
pub fn compile_file(input: &Path, out_base: &Path) -> Result<PathBuf, CompileError> {
    let source = std::fs::read_to_string(input)
        .map_err(|e| CompileError::Internal(format!("cannot read {}: {}", input.display(), e)))?;
    let asm = compile_string(&source)?;
    let out = out_base.with_extension("asm");
    std::fs::write(&out, asm)
        .map_err(|e| CompileError::Internal(format!("cannot write {}: {}", out.display(), e)))?;
    Ok(out)
}
