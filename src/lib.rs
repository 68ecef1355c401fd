//! # makeval
//!
//! Reads a Makefile-style build description and evaluates it into a set of
//! variables and a list of fully expanded rules. Running the rules is left to
//! whatever consumes the result.
//!
//! ```no_run
//! let program = makeval::parser::parse_script("CC = cc\nhello: hello.c\n\t$(CC) -o $@ hello.c\n")?;
//! let result = makeval::interpreter::evaluate(&program)?;
//! assert_eq!(result.rules[0].commands, vec!["cc -o hello hello.c"]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod ast;
pub mod error;
pub mod functions;
pub mod interpreter;
pub mod parser;
pub mod reader;

pub use ast::{Program, Statement};
pub use error::{EvalError, FunctionError, ParseError};
pub use interpreter::{EvalResult, Evaluator, Rule, evaluate};
