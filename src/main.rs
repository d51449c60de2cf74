// ABOUTME: CLI entry point: reads a source file and runs it through the interpreter

mod ast;
mod config;
mod error;
mod interpreter;
mod io;
mod lexer;
mod parser;
mod scope;
mod value;

use clap::Parser;
use io::{StdinSink, StdoutSink};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "l")]
#[command(version = config::VERSION)]
#[command(about = config::ABOUT)]
#[command(long_about = config::LONG_ABOUT)]
struct CliArgs {
    /// Source file to execute
    #[arg(value_name = "FILE")]
    script: PathBuf,
}

fn main() -> ExitCode {
    let args = CliArgs::parse();

    let source = match std::fs::read_to_string(&args.script) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("cannot read {}: {}", args.script.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut out = StdoutSink;
    let mut input = StdinSink;
    match interpreter::run(&source, &mut out, &mut input) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
