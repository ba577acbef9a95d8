use std::fmt;

use crate::tokenizer::Literal;

/// Primitive type assigned to every expression by the semantic stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  Int,
  Float,
  Void,
  Error,
}

impl Type {
  pub fn of_literal(literal: &Literal) -> Self {
    match literal {
      Literal::Int(_) => Type::Int,
      Literal::Float(_) => Type::Float,
    }
  }

  pub fn is_error(self) -> bool {
    matches!(self, Type::Error)
  }

  pub fn is_float(self) -> bool {
    matches!(self, Type::Float)
  }

  /// Tag stored next to a recorded result so it can be printed later.
  pub fn result_tag(self) -> u8 {
    match self {
      Type::Float => 1,
      _ => 0,
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Type::Int => "int",
      Type::Float => "float",
      Type::Void => "void",
      Type::Error => "error",
    };
    f.write_str(name)
  }
}

/// Widening applied to an expression before its value is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
  IntToFloat,
}

impl Coercion {
  pub fn target(self) -> Type {
    match self {
      Coercion::IntToFloat => Type::Float,
    }
  }

  /// Coercion needed to use a `from` value where `to` is required.
  pub fn between(from: Type, to: Type) -> Option<Self> {
    match (from, to) {
      (Type::Int, Type::Float) => Some(Coercion::IntToFloat),
      _ => None,
    }
  }
}

impl fmt::Display for Coercion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Coercion::IntToFloat => f.write_str("int_to_float"),
    }
  }
}
