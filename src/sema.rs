//! Semantic analysis: assigns a type to every expression and makes numeric
//! widening explicit.
//!
//! Statements are analyzed one at a time so a bad statement never taints its
//! neighbours. The analyzer returns a rewritten copy of the statement in
//! which every int operand used as a float is wrapped in `Expr::Coerce`.

use std::collections::HashMap;

use tracing::debug;

use crate::error::Diagnostic;
use crate::parser::{BinaryOp, Expr, Statement, Stmt};
use crate::tokenizer::Literal;
use crate::ty::{Coercion, Type};

/// Number of past results `N RES` can reach.
pub const RESULT_HISTORY_DEPTH: i64 = 8;

/// Largest magnitude representable in half precision.
const HALF_MAX: f64 = 65504.0;

/// Outcome of analyzing one statement.
#[derive(Debug, Clone)]
pub struct Analysis {
  pub ty: Type,
  pub statement: Statement,
  pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
  pub fn is_valid(&self) -> bool {
    self.diagnostics.is_empty()
  }
}

/// Per-compilation analyzer. Loop variables live in `symbols` only while
/// the body of their `for` is being visited.
#[derive(Debug, Default)]
pub struct Analyzer {
  symbols: HashMap<String, Type>,
  diagnostics: Vec<Diagnostic>,
}

impl Analyzer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn analyze(&mut self, statement: &Statement) -> Analysis {
    let (statement, ty) = self.stmt(statement);
    let diagnostics = std::mem::take(&mut self.diagnostics);
    if !diagnostics.is_empty() {
      debug!(
        line = statement.line,
        errors = diagnostics.len(),
        "statement failed semantic analysis"
      );
    }
    Analysis {
      ty,
      statement,
      diagnostics,
    }
  }

  fn error(&mut self, at: &Statement, message: impl Into<String>) {
    self
      .diagnostics
      .push(Diagnostic::semantic(at.line, at.col, message));
  }

  fn stmt(&mut self, statement: &Statement) -> (Statement, Type) {
    let (node, ty) = match &statement.node {
      Stmt::Res { arg } => {
        let (arg, ty) = self.expr(arg, statement);
        (Stmt::Res { arg }, ty)
      }
      Stmt::ResRelative { n } => {
        let (n, ty) = self.expr(n, statement);
        if ty != Type::Int {
          self.error(statement, "N RES requires an int argument");
        } else if let Expr::Num {
          value: Literal::Int(offset),
        } = n
          && !(1..=RESULT_HISTORY_DEPTH).contains(&offset)
        {
          self.error(
            statement,
            format!("N RES offset {offset} is outside 1..={RESULT_HISTORY_DEPTH}"),
          );
        }
        (Stmt::ResRelative { n }, Type::Void)
      }
      Stmt::Store { value } => {
        let (value, ty) = self.expr(value, statement);
        if ty.is_error() {
          self.error(statement, "invalid value for V MEM");
        }
        let value = coerce(value, ty, Type::Float);
        (Stmt::Store { value }, Type::Void)
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let (cond, ty) = self.expr(cond, statement);
        if ty.is_error() {
          self.error(statement, "invalid condition in 'if'");
        }
        let (then_branch, _) = self.stmt(then_branch);
        let else_branch = else_branch
          .as_deref()
          .map(|branch| Box::new(self.stmt(branch).0));
        let node = Stmt::If {
          cond,
          then_branch: Box::new(then_branch),
          else_branch,
        };
        (node, Type::Void)
      }
      Stmt::For {
        var,
        start,
        end,
        body,
      } => {
        let (start, start_ty) = self.expr(start, statement);
        let (end, end_ty) = self.expr(end, statement);
        if start_ty != Type::Int || end_ty != Type::Int {
          self.error(
            statement,
            format!("'for' bounds must be int, found {start_ty} and {end_ty}"),
          );
        }

        let shadowed = self.symbols.insert(var.clone(), Type::Int);
        let (body, _) = self.stmt(body);
        match shadowed {
          Some(outer) => self.symbols.insert(var.clone(), outer),
          None => self.symbols.remove(var),
        };

        let node = Stmt::For {
          var: var.clone(),
          start,
          end,
          body: Box::new(body),
        };
        (node, Type::Void)
      }
    };
    (Statement::new(node, statement.line, statement.col), ty)
  }

  fn expr(&mut self, expr: &Expr, at: &Statement) -> (Expr, Type) {
    match expr {
      Expr::Num { value } => {
        match *value {
          Literal::Int(v) if v > i64::from(i16::MAX) => {
            self.error(at, format!("integer literal {v} does not fit in 16 bits"));
            return (expr.clone(), Type::Error);
          }
          Literal::Float(v) if !v.is_finite() || v.abs() > HALF_MAX => {
            self.error(
              at,
              format!("float literal {v} is outside the half-precision range"),
            );
            return (expr.clone(), Type::Error);
          }
          _ => {}
        }
        (expr.clone(), Type::of_literal(value))
      }
      Expr::Ident { name } => match self.symbols.get(name) {
        Some(ty) => (expr.clone(), *ty),
        None => {
          self.error(at, format!("undefined variable '{name}'"));
          (expr.clone(), Type::Error)
        }
      },
      Expr::Mem => (Expr::Mem, Type::Float),
      Expr::Coerce { coercion, inner } => {
        let (inner, _) = self.expr(inner, at);
        (Expr::coerce(*coercion, inner), coercion.target())
      }
      Expr::Binary { op, lhs, rhs } => {
        let (lhs, lhs_ty) = self.expr(lhs, at);
        let (rhs, rhs_ty) = self.expr(rhs, at);
        let ty = self.binary_type(*op, lhs_ty, rhs_ty, at);
        let operand_ty = if ty.is_error() { Type::Error } else { ty };
        let node = Expr::binary(
          *op,
          coerce(lhs, lhs_ty, operand_ty),
          coerce(rhs, rhs_ty, operand_ty),
        );
        (node, ty)
      }
    }
  }

  fn binary_type(&mut self, op: BinaryOp, lhs: Type, rhs: Type, at: &Statement) -> Type {
    if lhs.is_error() || rhs.is_error() {
      return Type::Error;
    }
    match op {
      BinaryOp::Div => Type::Float,
      BinaryOp::IntDiv | BinaryOp::Mod => {
        if lhs == Type::Int && rhs == Type::Int {
          Type::Int
        } else {
          self.error(
            at,
            format!(
              "operator '{}' requires int operands, found {lhs} and {rhs}",
              op.symbol()
            ),
          );
          Type::Error
        }
      }
      _ if lhs.is_float() || rhs.is_float() => Type::Float,
      _ => Type::Int,
    }
  }
}

/// Wrap `expr` in a coercion when a `from` value is used as `to`.
fn coerce(expr: Expr, from: Type, to: Type) -> Expr {
  match Coercion::between(from, to) {
    Some(coercion) => Expr::coerce(coercion, expr),
    None => expr,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn at(node: Stmt) -> Statement {
    Statement::new(node, 1, 1)
  }

  fn res(arg: Expr) -> Statement {
    at(Stmt::Res { arg })
  }

  #[test]
  fn real_division_coerces_both_int_operands() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&res(Expr::binary(
      BinaryOp::Div,
      Expr::int(1),
      Expr::int(2),
    )));
    assert!(analysis.is_valid());
    assert_eq!(analysis.ty, Type::Float);
    assert_eq!(
      analysis.statement.node,
      Stmt::Res {
        arg: Expr::binary(
          BinaryOp::Div,
          Expr::coerce(Coercion::IntToFloat, Expr::int(1)),
          Expr::coerce(Coercion::IntToFloat, Expr::int(2)),
        )
      }
    );
  }

  #[test]
  fn mixed_addition_coerces_only_the_int_side() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&res(Expr::binary(
      BinaryOp::Add,
      Expr::int(1),
      Expr::float(2.0),
    )));
    assert_eq!(analysis.ty, Type::Float);
    assert_eq!(
      analysis.statement.node,
      Stmt::Res {
        arg: Expr::binary(
          BinaryOp::Add,
          Expr::coerce(Coercion::IntToFloat, Expr::int(1)),
          Expr::float(2.0),
        )
      }
    );
  }

  #[test]
  fn integer_arithmetic_stays_int() {
    let mut analyzer = Analyzer::new();
    let product = res(Expr::binary(BinaryOp::Mul, Expr::int(3), Expr::int(4)));
    let analysis = analyzer.analyze(&product);
    assert_eq!(analysis.ty, Type::Int);
    assert_eq!(analysis.statement, product);
  }

  #[test]
  fn memory_reads_are_float() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&res(Expr::binary(
      BinaryOp::Sub,
      Expr::Mem,
      Expr::int(1),
    )));
    assert_eq!(analysis.ty, Type::Float);
    match analysis.statement.node {
      Stmt::Res {
        arg: Expr::Binary { rhs, .. },
      } => assert_eq!(*rhs, Expr::coerce(Coercion::IntToFloat, Expr::int(1))),
      other => panic!("expected binary result, got {other:?}"),
    }
  }

  #[test]
  fn remainder_rejects_float_operands() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&res(Expr::binary(
      BinaryOp::Mod,
      Expr::float(7.5),
      Expr::int(2),
    )));
    assert_eq!(analysis.ty, Type::Error);
    assert_eq!(analysis.diagnostics.len(), 1);
  }

  #[test]
  fn undefined_variable_is_reported() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&res(Expr::ident("x")));
    assert!(!analysis.is_valid());
    assert!(analysis.diagnostics[0].message.contains("undefined variable 'x'"));
  }

  #[test]
  fn loop_variable_is_scoped_to_the_body() {
    let mut analyzer = Analyzer::new();
    let looped = at(Stmt::For {
      var: "i".into(),
      start: Expr::int(0),
      end: Expr::int(3),
      body: Box::new(res(Expr::ident("i"))),
    });
    assert!(analyzer.analyze(&looped).is_valid());
    assert!(!analyzer.analyze(&res(Expr::ident("i"))).is_valid());
  }

  #[test]
  fn float_loop_bound_is_rejected() {
    let mut analyzer = Analyzer::new();
    let looped = at(Stmt::For {
      var: "i".into(),
      start: Expr::float(1.0),
      end: Expr::int(5),
      body: Box::new(res(Expr::ident("i"))),
    });
    let analysis = analyzer.analyze(&looped);
    assert_eq!(analysis.diagnostics.len(), 1);
    assert!(analysis.diagnostics[0].message.contains("bounds must be int"));
  }

  #[test]
  fn nested_loops_restore_shadowed_variable() {
    let mut analyzer = Analyzer::new();
    let inner = at(Stmt::For {
      var: "i".into(),
      start: Expr::int(0),
      end: Expr::int(2),
      body: Box::new(res(Expr::ident("i"))),
    });
    let outer = at(Stmt::For {
      var: "i".into(),
      start: Expr::int(0),
      end: Expr::int(2),
      body: Box::new(at(Stmt::If {
        cond: Expr::int(1),
        then_branch: Box::new(inner),
        else_branch: Some(Box::new(res(Expr::ident("i")))),
      })),
    });
    assert!(analyzer.analyze(&outer).is_valid());
  }

  #[test]
  fn relative_result_requires_int() {
    let mut analyzer = Analyzer::new();
    let bad = analyzer.analyze(&at(Stmt::ResRelative {
      n: Expr::float(1.5),
    }));
    assert_eq!(bad.ty, Type::Void);
    assert_eq!(bad.diagnostics.len(), 1);

    let out_of_range = analyzer.analyze(&at(Stmt::ResRelative { n: Expr::int(9) }));
    assert_eq!(out_of_range.diagnostics.len(), 1);

    let good = analyzer.analyze(&at(Stmt::ResRelative { n: Expr::int(2) }));
    assert!(good.is_valid());
  }

  #[test]
  fn store_widens_int_values() {
    let mut analyzer = Analyzer::new();
    let analysis = analyzer.analyze(&at(Stmt::Store {
      value: Expr::int(5),
    }));
    assert!(analysis.is_valid());
    assert_eq!(
      analysis.statement.node,
      Stmt::Store {
        value: Expr::coerce(Coercion::IntToFloat, Expr::int(5))
      }
    );
  }

  #[test]
  fn literal_ranges_are_checked() {
    let mut analyzer = Analyzer::new();
    assert!(!analyzer.analyze(&res(Expr::int(40000))).is_valid());
    assert!(!analyzer.analyze(&res(Expr::float(70000.0))).is_valid());
    assert!(analyzer.analyze(&res(Expr::float(65504.0))).is_valid());
  }

  #[test]
  fn diagnostics_do_not_leak_between_statements() {
    let mut analyzer = Analyzer::new();
    assert!(!analyzer.analyze(&res(Expr::ident("y"))).is_valid());
    assert!(analyzer.analyze(&res(Expr::int(1))).is_valid());
  }
}
