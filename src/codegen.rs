//! Code generation: lower the analyzed AST into AVR assembly.
//!
//! The emitter uses a simple stack machine on the hardware stack: every
//! expression pushes exactly one 16-bit value (high byte first, so popping
//! yields the low byte first) and every statement leaves the stack as it
//! found it. Results are printed over the serial port and recorded in a
//! small ring so `N RES` can print them again later.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::float16;
use crate::parser::{BinaryOp, Expr, Program, Statement, Stmt};
use crate::runtime;
use crate::sema::RESULT_HISTORY_DEPTH;
use crate::tokenizer::Literal;
use crate::ty::{Coercion, Type};

/// Bytes per result ring entry: value low, value high, type tag.
const RESULT_ENTRY_SIZE: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodegenOptions {
  /// Initialise the serial port and drive it from `uart_putc`.
  pub serial: bool,
  /// Print `6 * 7` through the library before the program starts.
  pub self_test: bool,
}

impl Default for CodegenOptions {
  fn default() -> Self {
    Self {
      serial: true,
      self_test: true,
    }
  }
}

/// Emit a complete assembly file for `program`.
pub fn generate(program: &Program, options: &CodegenOptions) -> String {
  let mut generator = Generator::default();
  for (index, statement) in program.statements.iter().enumerate() {
    generator.comment(&format!(
      "--- statement {} (line {}:{}) ---",
      index + 1,
      statement.line,
      statement.col
    ));
    generator.emit_stmt(statement);
  }
  let asm = generator.finish(options);
  debug!(
    statements = program.statements.len(),
    lines = asm.lines().count(),
    "generated assembly"
  );
  asm
}

#[derive(Default)]
struct Generator {
  body: String,
  label_count: usize,
  /// Innermost-last stack of (loop variable, RAM slot) pairs.
  loops: Vec<(String, String)>,
  slots: Vec<String>,
  externs: BTreeSet<&'static str>,
  float_results: bool,
}

impl Generator {
  fn new_label(&mut self) -> usize {
    self.label_count += 1;
    self.label_count
  }

  fn ins(&mut self, instruction: &str) {
    self.body.push_str("    ");
    self.body.push_str(instruction);
    self.body.push('\n');
  }

  fn label(&mut self, name: &str) {
    self.body.push_str(name);
    self.body.push_str(":\n");
  }

  fn comment(&mut self, text: &str) {
    self.body.push_str(&format!("    ; {text}\n"));
  }

  fn call(&mut self, routine: &str) {
    self.ins(&format!("call {routine}"));
  }

  fn call_extern(&mut self, routine: &'static str) {
    self.externs.insert(routine);
    self.call(routine);
  }

  fn push_result(&mut self) {
    self.ins("push r25");
    self.ins("push r24");
  }

  fn pop_left(&mut self) {
    self.ins("pop r24");
    self.ins("pop r25");
  }

  fn pop_right(&mut self) {
    self.ins("pop r22");
    self.ins("pop r23");
  }

  fn push_immediate(&mut self, bits: u16, note: &str) {
    let [lo, hi] = bits.to_le_bytes();
    self.comment(&format!("push {note}"));
    self.ins(&format!("ldi r24, 0x{lo:02X}"));
    self.ins(&format!("ldi r25, 0x{hi:02X}"));
    self.push_result();
  }

  /// Placeholder for constructs with no lowering: keeps the stack shape.
  fn gap(&mut self, what: &str) {
    warn!(construct = what, "no lowering available, emitting zero");
    self.comment(&format!("codegen: no lowering for {what}, pushing 0"));
    self.ins("ldi r24, 0");
    self.ins("ldi r25, 0");
    self.push_result();
  }

  fn emit_stmt(&mut self, statement: &Statement) {
    match &statement.node {
      Stmt::Res { arg } => {
        let ty = arg.ty();
        self.emit_expr(arg);
        self.pop_left();
        self.ins(&format!("ldi r18, {}", ty.result_tag()));
        self.call("res_record");
        if ty.is_float() {
          self.float_results = true;
          self.call_extern("print_f16");
        } else {
          self.call("print_int16");
        }
        self.call("print_newline");
      }
      Stmt::ResRelative { n } => {
        self.comment("N RES: print an earlier result");
        self.emit_expr(n);
        self.pop_left();
        self.call("res_fetch");
        self.call("res_print");
        self.call("print_newline");
      }
      Stmt::Store { value } => {
        self.comment("V MEM");
        self.emit_as(value, Type::Float);
        self.pop_left();
        self.ins("sts user_memory, r24");
        self.ins("sts user_memory+1, r25");
      }
      Stmt::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let id = self.new_label();
        let then_label = format!("IF_THEN_{id}");
        let else_label = format!("IF_ELSE_{id}");
        let end_label = format!("IF_END_{id}");

        self.comment("if");
        self.emit_expr(cond);
        self.pop_left();
        self.ins("or r24, r25");
        self.ins(&format!("brne {then_label}"));
        let false_target = if else_branch.is_some() {
          &else_label
        } else {
          &end_label
        };
        self.ins(&format!("jmp {false_target}"));

        self.label(&then_label);
        self.emit_stmt(then_branch);
        if let Some(else_branch) = else_branch {
          self.ins(&format!("jmp {end_label}"));
          self.label(&else_label);
          self.emit_stmt(else_branch);
        }
        self.label(&end_label);
      }
      Stmt::For {
        var,
        start,
        end,
        body,
      } => {
        let id = self.new_label();
        let top_label = format!("FOR_TOP_{id}");
        let body_label = format!("FOR_BODY_{id}");
        let end_label = format!("FOR_END_{id}");
        let slot = format!("loop_{var}_{id}");
        self.slots.push(slot.clone());

        self.comment(&format!("for {var}"));
        self.emit_expr(start);
        self.ins("pop r20");
        self.ins("pop r21");
        self.ins(&format!("sts {slot}, r20"));
        self.ins(&format!("sts {slot}+1, r21"));

        self.label(&top_label);
        // The end bound is evaluated again on every iteration.
        self.emit_expr(end);
        self.pop_right();
        self.ins(&format!("lds r20, {slot}"));
        self.ins(&format!("lds r21, {slot}+1"));
        self.ins("cp r20, r22");
        self.ins("cpc r21, r23");
        self.ins(&format!("brlt {body_label}"));
        self.ins(&format!("jmp {end_label}"));

        self.label(&body_label);
        self.loops.push((var.clone(), slot.clone()));
        self.emit_stmt(body);
        self.loops.pop();

        self.ins(&format!("lds r20, {slot}"));
        self.ins(&format!("lds r21, {slot}+1"));
        self.ins("subi r20, 0xFF");
        self.ins("sbci r21, 0xFF");
        self.ins(&format!("sts {slot}, r20"));
        self.ins(&format!("sts {slot}+1, r21"));
        self.ins(&format!("jmp {top_label}"));
        self.label(&end_label);
      }
    }
  }

  fn emit_expr(&mut self, expr: &Expr) {
    match expr {
      Expr::Num {
        value: Literal::Int(value),
      } => {
        self.push_immediate(*value as u16, &format!("int {value}"));
      }
      Expr::Num {
        value: Literal::Float(value),
      } => {
        let bits = float16::encode(*value);
        if bits & 0x7FFF == 0 && *value != 0.0 {
          warn!(value, "float literal underflows to zero in half precision");
        }
        self.push_immediate(bits, &format!("float {value}"));
      }
      Expr::Ident { name } => {
        let slot = self
          .loops
          .iter()
          .rev()
          .find(|(var, _)| var == name)
          .map(|(_, slot)| slot.clone());
        match slot {
          Some(slot) => {
            self.comment(&format!("load loop variable {name}"));
            self.ins(&format!("lds r24, {slot}"));
            self.ins(&format!("lds r25, {slot}+1"));
            self.push_result();
          }
          None => self.gap(&format!("unbound identifier '{name}'")),
        }
      }
      Expr::Mem => {
        self.comment("MEM");
        self.ins("lds r24, user_memory");
        self.ins("lds r25, user_memory+1");
        self.push_result();
      }
      Expr::Coerce {
        coercion: Coercion::IntToFloat,
        inner,
      } => self.emit_as(inner, Type::Float),
      Expr::Binary { op, lhs, rhs } => {
        if expr.ty().is_float() {
          self.emit_as(lhs, Type::Float);
          self.emit_as(rhs, Type::Float);
          self.comment(&format!("float {}", op.symbol()));
          self.pop_right();
          self.pop_left();
          match float_routine(*op) {
            Some(routine) => {
              self.call_extern(routine);
              self.push_result();
            }
            None => self.gap(&format!("float operator '{}'", op.symbol())),
          }
        } else {
          self.emit_expr(lhs);
          self.emit_expr(rhs);
          self.comment(&format!("int {}", op.symbol()));
          self.pop_right();
          self.pop_left();
          match op {
            BinaryOp::Add => {
              self.ins("add r24, r22");
              self.ins("adc r25, r23");
            }
            BinaryOp::Sub => {
              self.ins("sub r24, r22");
              self.ins("sbc r25, r23");
            }
            BinaryOp::Mul => self.call("mult16"),
            BinaryOp::IntDiv => self.call("div16"),
            BinaryOp::Mod => self.call("mod16"),
            BinaryOp::Pow => self.call("pow16"),
            BinaryOp::Div => {
              self.gap("int operator '/'");
              return;
            }
          }
          self.push_result();
        }
      }
    }
  }

  /// Emit `expr` so the pushed value has type `target`, widening ints.
  fn emit_as(&mut self, expr: &Expr, target: Type) {
    if !(target.is_float() && expr.ty() == Type::Int) {
      self.emit_expr(expr);
      return;
    }
    match expr {
      Expr::Num {
        value: Literal::Int(value),
      } => {
        let bits = float16::encode(*value as f64);
        self.push_immediate(bits, &format!("float {value} (widened)"));
      }
      _ => {
        self.emit_expr(expr);
        self.comment(&Coercion::IntToFloat.to_string());
        self.pop_left();
        self.call_extern("itof16");
        self.push_result();
      }
    }
  }

  /// Wrap the body in the data section, prologue, halt loop and library.
  fn finish(self, options: &CodegenOptions) -> String {
    let mut asm = String::new();
    asm.push_str("; generated by rpnc\n");
    asm.push_str("#define __SFR_OFFSET 0\n");
    asm.push_str("#include <avr/io.h>\n\n");

    for routine in &self.externs {
      asm.push_str(&format!(".extern {routine}\n"));
    }
    if !self.externs.is_empty() {
      asm.push('\n');
    }

    asm.push_str(".section .bss\n");
    asm.push_str("user_memory:\n    .zero 2\n");
    asm.push_str(&format!(
      "result_history:\n    .zero {}\n",
      RESULT_HISTORY_DEPTH * RESULT_ENTRY_SIZE
    ));
    asm.push_str("result_head:\n    .zero 1\n");
    for slot in &self.slots {
      asm.push_str(&format!("{slot}:\n    .zero 2\n"));
    }
    asm.push('\n');

    asm.push_str(".section .text\n");
    asm.push_str(".global main\n");
    asm.push_str("main:\n");
    asm.push_str("    clr r1\n");
    asm.push_str("    ldi r28, lo8(RAMEND)\n");
    asm.push_str("    ldi r29, hi8(RAMEND)\n");
    asm.push_str("    out SPH, r29\n");
    asm.push_str("    out SPL, r28\n");
    asm.push_str("    sts result_head, r1\n");
    if options.serial {
      asm.push_str("    call uart_init\n");
      if options.self_test {
        asm.push_str("    ; startup self-test: prints 42\n");
        asm.push_str("    ldi r24, 6\n");
        asm.push_str("    clr r25\n");
        asm.push_str("    ldi r22, 7\n");
        asm.push_str("    clr r23\n");
        asm.push_str("    call mult16\n");
        asm.push_str("    call print_int16\n");
        asm.push_str("    call print_newline\n");
      }
    }

    asm.push_str(&self.body);

    asm.push_str("end_program:\n");
    asm.push_str("    rjmp end_program\n\n");
    asm.push_str(&runtime::library(options.serial, self.float_results));
    asm
  }
}

fn float_routine(op: BinaryOp) -> Option<&'static str> {
  match op {
    BinaryOp::Add => Some("fadd16"),
    BinaryOp::Sub => Some("fsub16"),
    BinaryOp::Mul => Some("fmul16"),
    BinaryOp::Div => Some("fdiv16"),
    BinaryOp::Pow => Some("fpow16"),
    BinaryOp::IntDiv | BinaryOp::Mod => None,
  }
}
