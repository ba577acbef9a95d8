use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use snafu::ResultExt;
use tracing::{Level, info};

use rpnc::error::{ReadInputSnafu, WriteOutputSnafu};
use rpnc::{CodegenOptions, CompileResult, compile};

#[derive(Parser)]
#[command(version, about = "Compile RPN programs to AVR assembly")]
struct Args {
  /// Source file to compile
  input: PathBuf,
  /// Output path; defaults to the input path with a `.S` extension
  #[arg(short, long)]
  output: Option<PathBuf>,
  /// Print the AST of the statements that survived analysis
  #[arg(long)]
  ast: bool,
  /// Write the assembly to stdout instead of a file
  #[arg(long)]
  stdout: bool,
  /// Leave the serial port alone; printing becomes a no-op
  #[arg(long)]
  no_serial: bool,
  /// Skip the startup self-test
  #[arg(long)]
  no_self_test: bool,
  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

enum Status {
  Written,
  NothingToEmit,
}

fn main() -> ExitCode {
  let args = Args::parse();
  init_logging(args.verbose);

  match run(&args) {
    Ok(Status::Written) => ExitCode::SUCCESS,
    Ok(Status::NothingToEmit) => ExitCode::from(2),
    Err(err) => {
      eprintln!("{err}");
      ExitCode::FAILURE
    }
  }
}

fn init_logging(verbose: u8) {
  let level = match verbose {
    0 => Level::WARN,
    1 => Level::INFO,
    2 => Level::DEBUG,
    _ => Level::TRACE,
  };
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_target(false)
    .with_writer(std::io::stderr)
    .init();
}

fn run(args: &Args) -> CompileResult<Status> {
  let source = fs::read_to_string(&args.input).context(ReadInputSnafu {
    path: &args.input,
  })?;

  let options = CodegenOptions {
    serial: !args.no_serial,
    self_test: !args.no_self_test,
  };
  let compilation = compile(&source, &options)?;

  for diag in compilation.diagnostics() {
    eprintln!("{diag}");
  }

  if args.ast {
    println!("{:#?}", compilation.program);
  }

  let Some(assembly) = compilation.assembly else {
    eprintln!("no valid statements left; nothing was generated");
    return Ok(Status::NothingToEmit);
  };

  if args.stdout {
    print!("{assembly}");
    return Ok(Status::Written);
  }

  let output = args
    .output
    .clone()
    .unwrap_or_else(|| args.input.with_extension("S"));
  fs::write(&output, assembly).context(WriteOutputSnafu { path: &output })?;
  info!(
    statements = compilation.program.statements.len(),
    path = %output.display(),
    "assembly written"
  );
  eprintln!(
    "wrote {} statement(s) to {}",
    compilation.program.statements.len(),
    output.display()
  );
  Ok(Status::Written)
}
