//! msc - command-line compiler for minisharp
//!
//! Usage: msc [OPTIONS] <inputs>... [-o <output>]

use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use minisharp::driver::{Driver, DriverConfig};
use minisharp::{Culture, OutputKind};

/// Output type
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Default)]
enum Target {
    /// Executable with an entry point
    #[default]
    Exe,
    /// Library of types for other compilations
    Library,
}

#[derive(ClapParser, Debug)]
#[command(name = "msc")]
#[command(version)]
#[command(about = "Compiler for a small C# subset targeting the msvm host", long_about = None)]
struct Args {
    /// Input source files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output image
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output type (exe or library)
    #[arg(short, long, value_enum, default_value = "exe")]
    target: Target,

    /// Referenced image
    #[arg(short, long = "reference")]
    reference: Vec<PathBuf>,

    /// Do not reference the core library
    #[arg(long)]
    nocorlib: bool,

    /// Type that contains the entry point
    #[arg(short, long)]
    main: Option<String>,

    /// Report all warnings as errors
    #[arg(long)]
    warnaserror: bool,

    /// Suppress warnings by id, e.g. CS0168,CS0162
    #[arg(long, value_delimiter = ',')]
    nowarn: Vec<String>,

    /// Culture for diagnostic messages, e.g. de-DE
    #[arg(long)]
    culture: Option<String>,

    /// Run the program after building it
    #[arg(long)]
    run: bool,

    /// Arguments passed to Main with --run
    #[arg(last = true)]
    args: Vec<String>,

    /// Dump tokens (for debugging)
    #[arg(long)]
    dump_tokens: bool,

    /// Dump AST (for debugging)
    #[arg(long)]
    dump_ast: bool,

    /// Dump IR (for debugging)
    #[arg(long)]
    dump_ir: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    match run(args) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            process::exit(1);
        }
    }
}

fn run(args: Args) -> Result<i32> {
    let mut config = DriverConfig::new(args.inputs);
    config.output = args.output;
    config.output_kind = match args.target {
        Target::Exe => OutputKind::Executable,
        Target::Library => OutputKind::DynamicallyLinkedLibrary,
    };
    config.references = args.reference;
    config.no_corlib = args.nocorlib;
    config.main_type = args.main;
    config.warnings_as_errors = args.warnaserror;
    config.suppressed = args.nowarn;
    config.culture = args.culture.as_deref().map_or(Culture::Invariant, Culture::from_name);
    config.run = args.run;
    config.run_args = args.args;
    config.dump_tokens = args.dump_tokens;
    config.dump_ast = args.dump_ast;
    config.dump_ir = args.dump_ir;

    let mut driver = Driver::new(config);
    let outcome = driver
        .run(&mut io::stderr())
        .context("compilation aborted")?;
    driver.reporter().report(&outcome.diagnostics);

    let errors = outcome.error_count();
    if errors > 0 {
        eprintln!("{} error(s)", errors);
        return Ok(1);
    }
    if let Some(output) = &outcome.output {
        log::info!("compiled to {}", output.display());
    }
    Ok(outcome.exit_code.unwrap_or(0))
}
