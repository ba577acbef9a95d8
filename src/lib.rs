//! Crate root: wires together the compilation pipeline.
//!
//! The stages are small and run strictly in order:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` builds statements from RPN expressions, recovering from errors.
//! - `sema` types every expression and makes int-to-float widening explicit.
//! - `codegen` lowers the surviving statements into AVR assembly, with the
//!   subroutine library from `runtime` and immediates from `float16`.
//! - `error` holds the fatal error type and recoverable diagnostics.

pub mod codegen;
pub mod error;
pub mod float16;
pub mod parser;
pub mod runtime;
pub mod sema;
pub mod tokenizer;
pub mod ty;

use tracing::info;

pub use codegen::CodegenOptions;
pub use error::{CompileError, CompileResult, Diagnostic, Stage};

use parser::Program;
use sema::Analyzer;

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct Compilation {
  /// Statements free of syntax and semantic errors, after analysis.
  pub program: Program,
  pub syntax_errors: Vec<Diagnostic>,
  pub semantic_errors: Vec<Diagnostic>,
  /// `None` when no statement survived.
  pub assembly: Option<String>,
}

impl Compilation {
  pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
    self.syntax_errors.iter().chain(&self.semantic_errors)
  }
}

/// Compile a source string. Only lexical errors abort; everything else is
/// reported per statement and the offending statement is left out.
pub fn compile(source: &str, options: &CodegenOptions) -> CompileResult<Compilation> {
  let tokens = tokenizer::tokenize(source)?;
  let (parsed, syntax_errors) = parser::parse_program(tokens);

  let mut analyzer = Analyzer::new();
  let mut statements = Vec::new();
  let mut semantic_errors = Vec::new();
  for statement in &parsed.statements {
    let analysis = analyzer.analyze(statement);
    if analysis.is_valid() {
      statements.push(analysis.statement);
    } else {
      semantic_errors.extend(analysis.diagnostics);
    }
  }

  let program = Program { statements };
  info!(
    parsed = parsed.statements.len(),
    surviving = program.statements.len(),
    syntax_errors = syntax_errors.len(),
    semantic_errors = semantic_errors.len(),
    "front end finished"
  );

  let assembly = if program.statements.is_empty() {
    None
  } else {
    Some(codegen::generate(&program, options))
  };

  Ok(Compilation {
    program,
    syntax_errors,
    semantic_errors,
    assembly,
  })
}
