use rpnc::parser::{BinaryOp, Expr, Stmt};
use rpnc::{CodegenOptions, CompileError, Compilation, Stage, compile};

const QUIET: CodegenOptions = CodegenOptions {
  serial: false,
  self_test: false,
};

fn compile_quiet(source: &str) -> Compilation {
  compile(source, &QUIET).expect("compile should succeed")
}

/// Program body between `main:` and the halt loop, trimmed.
fn body(asm: &str) -> Vec<String> {
  asm
    .lines()
    .skip_while(|line| *line != "main:")
    .take_while(|line| *line != "end_program:")
    .map(|line| line.trim().to_string())
    .collect()
}

/// Body lines for each statement, split on the per-statement marker.
fn statement_blocks(asm: &str) -> Vec<Vec<String>> {
  let mut blocks: Vec<Vec<String>> = Vec::new();
  for line in body(asm) {
    if line.starts_with("; --- statement") {
      blocks.push(Vec::new());
    } else if let Some(block) = blocks.last_mut() {
      block.push(line);
    }
  }
  blocks
}

#[test]
fn adds_two_literals_and_prints_once() {
  let compilation = compile_quiet("( 3 4 + ) RES");
  assert_eq!(compilation.diagnostics().count(), 0);
  let asm = compilation.assembly.expect("assembly should be generated");
  let lines = body(&asm);

  let position = |needle: &str| {
    lines
      .iter()
      .position(|line| line == needle)
      .unwrap_or_else(|| panic!("missing {needle}"))
  };
  assert!(position("; push int 3") < position("; push int 4"));
  assert!(position("; push int 4") < position("add r24, r22"));
  assert_eq!(lines.iter().filter(|l| *l == "call print_int16").count(), 1);
  assert_eq!(lines.iter().filter(|l| *l == "call print_newline").count(), 1);
}

#[test]
fn syntax_error_drops_only_its_statement() {
  let compilation = compile_quiet("( 1 + ) ( 2 3 + )");
  assert_eq!(compilation.syntax_errors.len(), 1);
  assert_eq!(compilation.syntax_errors[0].stage, Stage::Syntax);
  assert_eq!(compilation.program.statements.len(), 1);
  assert_eq!(
    compilation.program.statements[0].node,
    Stmt::Res {
      arg: Expr::binary(BinaryOp::Add, Expr::int(2), Expr::int(3))
    }
  );
}

#[test]
fn float_loop_bound_excludes_the_loop() {
  let compilation = compile_quiet("for i ( 1.0 ) ( 5 ) ( i )\n( 9 )");
  assert_eq!(compilation.semantic_errors.len(), 1);
  assert!(
    compilation.semantic_errors[0]
      .message
      .contains("bounds must be int")
  );
  let asm = compilation.assembly.expect("the second statement survives");
  assert!(!asm.contains("FOR_TOP"));
  assert!(body(&asm).contains(&"; push int 9".to_string()));
}

#[test]
fn semantic_errors_do_not_change_neighbouring_code() {
  let alone = compile_quiet("( 6 7 * )\n( 1.5 2 / )");
  let mixed = compile_quiet("( 6 7 * )\n( x 1 + )\n( 1.5 2 / )");
  assert_eq!(mixed.semantic_errors.len(), 1);
  assert_eq!(mixed.semantic_errors[0].line, 2);

  let alone_blocks = statement_blocks(&alone.assembly.unwrap());
  let mixed_blocks = statement_blocks(&mixed.assembly.unwrap());
  assert_eq!(alone_blocks, mixed_blocks);
}

#[test]
fn nothing_survives_means_no_assembly() {
  let compilation = compile_quiet("( y ) ( 1 + )");
  assert!(compilation.program.statements.is_empty());
  assert!(compilation.assembly.is_none());
  assert_eq!(compilation.diagnostics().count(), 2);
}

#[test]
fn lexical_errors_abort_the_run() {
  match compile("( 1 2 + )\n( 3 $ )", &QUIET) {
    Err(CompileError::Lex { line, col, .. }) => assert_eq!((line, col), (2, 5)),
    other => panic!("expected lexical error, got {other:?}"),
  }
}

#[test]
fn statements_are_stack_neutral() {
  let source = "\
( 2.5 V MEM )
( MEM 2 * )
( 1 N RES )
if ( 1 ) then ( 4 ) else ( 5 )
for i ( 0 ) ( 3 ) if ( i ) then ( i i * )
";
  let compilation = compile_quiet(source);
  assert_eq!(compilation.diagnostics().count(), 0, "{:?}", compilation.syntax_errors);
  let asm = compilation.assembly.unwrap();
  let blocks = statement_blocks(&asm);
  assert_eq!(blocks.len(), 5);
  for (n, block) in blocks.iter().enumerate() {
    let pushes = block.iter().filter(|l| l.starts_with("push ")).count();
    let pops = block.iter().filter(|l| l.starts_with("pop ")).count();
    assert_eq!(pushes, pops, "statement {} is unbalanced", n + 1);
  }
}

#[test]
fn memory_round_trip_is_float() {
  let compilation = compile_quiet("( 3 V MEM ) ( MEM )");
  let asm = compilation.assembly.unwrap();
  let lines = body(&asm);
  // 3 widened to half precision 0x4200 before the store.
  assert!(lines.contains(&"; push float 3 (widened)".to_string()));
  assert!(lines.contains(&"ldi r25, 0x42".to_string()));
  assert!(lines.contains(&"call print_f16".to_string()));
}

#[test]
fn mixed_arithmetic_uses_half_precision_routines() {
  let compilation = compile_quiet("( 1 0.5 + ) ( 2 3 ^ ) ( 2.0 3 ^ )");
  let asm = compilation.assembly.unwrap();
  let lines = body(&asm);
  assert!(lines.contains(&"call fadd16".to_string()));
  assert!(lines.contains(&"call pow16".to_string()));
  assert!(lines.contains(&"call fpow16".to_string()));
  assert!(asm.contains(".extern fadd16\n"));
  assert!(asm.contains(".extern fpow16\n"));
}

#[test]
fn nested_loops_read_their_own_counters() {
  let compilation = compile_quiet("for i ( 0 ) ( 2 ) for j ( 0 ) ( i ) ( i j + )");
  assert_eq!(compilation.diagnostics().count(), 0);
  let asm = compilation.assembly.unwrap();
  let lines = body(&asm);
  assert!(lines.contains(&"lds r24, loop_i_1".to_string()));
  assert!(lines.contains(&"lds r24, loop_j_2".to_string()));
}

#[test]
fn default_options_initialise_serial_and_self_test() {
  let compilation = compile("( 1 )", &CodegenOptions::default()).unwrap();
  let asm = compilation.assembly.unwrap();
  assert!(asm.contains("call uart_init"));
  assert!(asm.contains("uart_init:\n"));
  assert!(asm.contains("sts UDR0, r16"));
}

/// Word addresses of every `.text` label plus each relative call or jump.
fn text_layout(asm: &str) -> (Vec<(String, i64)>, Vec<(i64, String)>) {
  let mut labels = Vec::new();
  let mut relative = Vec::new();
  let mut pc = 0;
  for line in asm
    .lines()
    .skip_while(|line| *line != ".section .text")
    .skip(1)
  {
    let text = line.trim();
    if text.is_empty() || text.starts_with([';', '.', '#']) {
      continue;
    }
    if !line.starts_with(' ') {
      if let Some(name) = text.strip_suffix(':') {
        labels.push((name.to_string(), pc));
      }
      continue;
    }
    let (mnemonic, operands) = text.split_once(' ').unwrap_or((text, ""));
    if matches!(mnemonic, "rcall" | "rjmp") {
      relative.push((pc, operands.trim().to_string()));
    }
    pc += match mnemonic {
      "call" | "jmp" | "lds" | "sts" => 2,
      _ => 1,
    };
  }
  (labels, relative)
}

#[test]
fn long_programs_keep_every_relative_jump_in_range() {
  let source = "( 6 7 * )\n".repeat(120);
  let compilation = compile(&source, &CodegenOptions::default()).unwrap();
  assert_eq!(compilation.program.statements.len(), 120);
  let asm = compilation.assembly.unwrap();

  let (labels, relative) = text_layout(&asm);
  assert!(labels.iter().any(|(name, _)| name == "res_print"));
  assert!(!relative.is_empty());
  for (pc, target) in relative {
    let Some((_, address)) = labels.iter().find(|(name, _)| *name == target) else {
      continue;
    };
    let displacement = address - (pc + 1);
    assert!(
      (-2048..=2047).contains(&displacement),
      "{target} is {displacement} words away from word {pc}"
    );
  }
  let last_label = labels.iter().map(|(_, address)| *address).max().unwrap();
  assert!(last_label > 2047, "program too short to exercise the range");
}
