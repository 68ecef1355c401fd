//! # makeval
//!
//! Evaluates a Makefile-style build description and prints the resulting
//! variables and expanded rules.
//!
//! ## Usage
//!
//! - Evaluate `GNUmakefile`, `makefile` or `Makefile` in the current directory: `makeval`
//! - Evaluate a specific file: `makeval -f build.mk`
//! - Override a variable: `makeval CC=clang`
//! - Machine-readable output: `makeval --format json`

use clap::{Parser as ClapParser, ValueEnum};
use makeval::{EvalResult, Evaluator, parser};
use std::collections::HashMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI arguments for makeval.
#[derive(ClapParser)]
#[command(name = "makeval")]
#[command(version = PKG_VERSION)]
#[command(about = "Evaluate a Makefile-style build description", long_about = None)]
struct Cli {
    /// Build file to read instead of probing GNUmakefile, makefile, Makefile
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Change to this directory before doing anything else
    #[arg(short = 'C', long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Keep evaluating after a statement fails, reporting every failure
    #[arg(short, long)]
    keep_going: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text)]
    format: Format,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Variable overrides, e.g. CC=clang
    #[arg(value_name = "NAME=VALUE", value_parser = parse_override)]
    overrides: Vec<(String, String)>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn parse_override(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", arg)),
    }
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time()
        .init();

    if let Some(dir) = &cli.directory
        && let Err(e) = std::env::set_current_dir(dir)
    {
        eprintln!("Error: cannot change to directory '{}': {}", dir.display(), e);
        std::process::exit(1);
    }

    let path = match &cli.file {
        Some(path) => path.clone(),
        None => match std::env::current_dir()
            .map_err(makeval::ParseError::from)
            .and_then(|dir| parser::find_build_file(&dir))
        {
            Ok(path) => path,
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    };

    let program = match parser::parse_file(&path) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let overrides: HashMap<String, String> = cli.overrides.into_iter().collect();
    let mut evaluator = Evaluator::with_overrides(overrides);
    let file_prefix = path.display().to_string();

    let failed = if cli.keep_going {
        let errors = evaluator.execute_keep_going(&program);
        for e in &errors {
            eprintln!("{}: {}", file_prefix, e);
        }
        !errors.is_empty()
    } else if let Err(e) = evaluator.execute(&program) {
        eprintln!("{}: {}", file_prefix, e);
        std::process::exit(1);
    } else {
        false
    };

    let result = evaluator.into_result();
    match cli.format {
        Format::Text => print_text(&result),
        Format::Json => match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing result: {}", e);
                std::process::exit(1);
            }
        },
    }

    if failed {
        std::process::exit(1);
    }
}

/// Print the result in a Makefile-like listing.
fn print_text(result: &EvalResult) {
    println!("# Variables");
    for (name, value) in &result.variables {
        println!("{} = {}", name, value);
    }

    println!();
    println!("# Rules");
    for rule in &result.rules {
        println!("{}: {}", rule.output, rule.inputs.join(" "));
        for command in &rule.commands {
            println!("\t{}", command);
        }
    }

    if !result.references.is_empty() {
        println!();
        println!("# References");
        for name in &result.references {
            println!("{}", name);
        }
    }
}
