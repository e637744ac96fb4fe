use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use tracing::Level;

use kaleido::ir::{Evaluate, Module};
use kaleido::toplevel::Driver;
use kaleido::{logger, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Built-in SSA backend
    Text,
    /// LLVM, needs the `llvm` feature
    Llvm,
}

/// Reads statements, prints the IR they lower to and evaluates top-level
/// expressions.
#[derive(Parser, Debug)]
#[command(name = "kaleido", version)]
struct Args {
    /// Source file; reads stdin interactively when omitted
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// IR backend
    #[arg(long, value_enum, default_value_t = Backend::Text)]
    backend: Backend,

    /// Lower top-level expressions without running them
    #[arg(long)]
    no_eval: bool,

    /// Print the whole module once the input is exhausted
    #[arg(long)]
    dump_module: bool,

    /// Log parser and lowering activity
    #[arg(short, long)]
    verbose: bool,
}

fn drive<B: Evaluate>(builder: B, args: &Args) -> Result<()> {
    let stdout = io::stdout();
    let mut driver = Driver::new(builder, stdout.lock()).evaluate(!args.no_eval);
    match &args.file {
        Some(path) => {
            let file = File::open(path)?;
            driver.main_loop(BufReader::new(file), false)?;
        }
        None => {
            let stdin = io::stdin();
            driver.main_loop(stdin.lock(), true)?;
        }
    }
    if args.dump_module {
        driver.dump_module()?;
    }
    Ok(())
}

#[cfg(feature = "llvm")]
fn drive_llvm(args: &Args) -> Result<()> {
    drive(kaleido::llvm::LlvmBuilder::new("kaleido"), args)
}

#[cfg(not(feature = "llvm"))]
fn drive_llvm(_args: &Args) -> Result<()> {
    Err(kaleido::Error::from(kaleido::ErrorKind::Config(
        "built without the `llvm` feature".to_owned(),
    )))
}

fn run(args: &Args) -> Result<()> {
    match args.backend {
        Backend::Text => drive(Module::new("kaleido"), args),
        Backend::Llvm => drive_llvm(args),
    }
}

fn main() {
    let args = Args::parse();
    logger::init_with_level(if args.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    });

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        for cause in e.causes() {
            eprintln!("  caused by: {}", cause);
        }
        process::exit(1);
    }
}
