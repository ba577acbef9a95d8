//! Shared error utilities used across the compilation pipeline.
//!
//! Two kinds of failure exist. A `CompileError` aborts the whole run (an
//! unrecognised character, an output file that cannot be written). A
//! `Diagnostic` is recoverable: the parser and the semantic analyzer collect
//! them per statement and the driver decides what survives.

use std::fmt;
use std::path::PathBuf;

use snafu::Snafu;

pub type CompileResult<T> = Result<T, CompileError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CompileError {
  #[snafu(display("lexical error at line {line}, column {col}: {message}"))]
  Lex {
    line: usize,
    col: usize,
    message: String,
  },

  #[snafu(display("failed to read '{}': {source}", path.display()))]
  ReadInput {
    path: PathBuf,
    source: std::io::Error,
  },

  #[snafu(display("failed to write '{}': {source}", path.display()))]
  WriteOutput {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl CompileError {
  /// Construct a lexical error anchored at a source position.
  pub fn lex(line: usize, col: usize, message: impl Into<String>) -> Self {
    Self::Lex {
      line,
      col,
      message: message.into(),
    }
  }
}

/// Pipeline stage that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Syntax,
  Semantic,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Stage::Syntax => f.write_str("syntax error"),
      Stage::Semantic => f.write_str("semantic error"),
    }
  }
}

/// Recoverable problem attached to a source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub stage: Stage,
  pub line: usize,
  pub col: usize,
  pub message: String,
}

impl Diagnostic {
  pub fn syntax(line: usize, col: usize, message: impl Into<String>) -> Self {
    Self {
      stage: Stage::Syntax,
      line,
      col,
      message: message.into(),
    }
  }

  pub fn semantic(line: usize, col: usize, message: impl Into<String>) -> Self {
    Self {
      stage: Stage::Semantic,
      line,
      col,
      message: message.into(),
    }
  }
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} at line {}, column {}: {}",
      self.stage, self.line, self.col, self.message
    )
  }
}
