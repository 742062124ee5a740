use std::{io::Write, process::ExitCode};

use clap::{Args, Parser, Subcommand};
use lox_vm::{InterpretResult, Vm};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "lox", about = "Compile and run scripts on the bytecode VM")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    pub fn command(&self) -> &Command {
        self.command.as_ref().unwrap_or(&Command::Repl)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script file
    Run(RunArgs),
    /// Start an interactive session
    Repl,
}

#[derive(Debug, Args)]
struct RunArgs {
    file: String,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match args.command() {
        Command::Repl => repl_command(),
        Command::Run(args) => run_command(args),
    }
}

fn repl_command() -> ExitCode {
    let mut vm = Vm::with_stdio();

    loop {
        let mut input = String::new();

        print!("> ");
        if let Err(e) = std::io::stdout().flush() {
            error!("failed to flush stdout: {e}");
            return ExitCode::FAILURE;
        }

        let read = match std::io::stdin().read_line(&mut input) {
            Ok(read) => read,
            Err(e) => {
                error!("failed to read from stdin: {e}");
                return ExitCode::FAILURE;
            }
        };

        if read == 0 {
            println!();
            break;
        }

        // Diagnostics were already written by the VM; the session stays usable.
        let _ = vm.interpret(&input);
    }

    ExitCode::SUCCESS
}

fn run_command(args: &RunArgs) -> ExitCode {
    let source = match std::fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Could not read file \"{}\": {e}", args.file);
            return ExitCode::from(74);
        }
    };

    let mut vm = Vm::with_stdio();
    let status = match vm.interpret(&source) {
        Ok(()) => InterpretResult::Ok,
        Err(e) => e.status(),
    };

    match status {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(65),
        InterpretResult::RuntimeError => ExitCode::from(70),
    }
}
