//! nnlower-jit: load a textual compute graph, compile it for a target and
//! either run it on the interpreter or emit the artifact.

use clap::{ArgAction, Parser};
use nnlower::driver::{CompileOptions, Driver, FileSink, RunMode, Status, Verbosity, DEFAULT_OUTPUT_NAME};
use nnlower::ir::global_registry;
use nnlower::loader::{ModelLoader, TextLoader};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "nnlower-jit", version)]
#[command(about = "Just-in-time compiler and interpreter for compute graphs")]
struct Args {
    /// The input file
    input: Option<PathBuf>,

    /// The output file
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Set verbose level to <N> (default is 1)
    #[arg(long = "verbose", value_name = "N", require_equals = true)]
    verbose: Option<u32>,

    /// One -v increases one verbose level
    #[arg(short = 'v', action = ArgAction::Count)]
    v: u8,

    /// Set verbose level to 0
    #[arg(long)]
    quiet: bool,

    /// Target quadruple
    #[arg(long = "mquadruple", value_name = "QUADRUPLE")]
    quadruple: Option<String>,

    /// Target architecture
    #[arg(long = "march", value_name = "ARCH")]
    arch: Option<String>,

    /// Write the artifact instead of executing it
    #[arg(long)]
    emit: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.verbose, args.v, args.quiet);
    env_logger::Builder::new()
        .filter_level(verbosity.log_filter())
        .parse_default_env()
        .init();

    let input = args.input.unwrap_or_default();
    if !input.exists() {
        eprintln!("Fatal: input file not found: {}", input.display());
        return ExitCode::FAILURE;
    }
    if !input.is_file() {
        eprintln!("Fatal: input file is not a regular file: {}", input.display());
        return ExitCode::FAILURE;
    }

    let options = CompileOptions {
        quadruple: args.quadruple,
        arch: args.arch,
        mode: if args.emit { RunMode::Emit } else { RunMode::Execute },
        output: args.output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_NAME)),
        verbosity,
    };

    let registry = global_registry();
    let graph = match TextLoader.load_file(&input, registry) {
        Ok(graph) => graph,
        Err(err) => {
            eprintln!("Fatal: {err}");
            return ExitCode::FAILURE;
        }
    };

    let driver = Driver::new(registry);
    let mut sink = FileSink::new(&options.output);
    let outcome = driver.run(&options, graph, &mut sink);

    if verbosity.level() >= 1 {
        for diagnostic in &outcome.diagnostics {
            eprintln!("{diagnostic}");
        }
        if let Some(execution) = outcome.execution() {
            for (id, tensor) in &execution.outputs {
                println!("%{id} = {tensor}");
            }
        }
    }
    if verbosity.level() >= 2 {
        eprint!("{}", outcome.stats);
    }

    match &outcome.status {
        Status::Failed { .. } => {
            eprintln!("Fatal: {}", outcome.status);
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
