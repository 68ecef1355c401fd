// Error types for parsing and evaluation

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating or reading a build file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("No targets specified and no makefile found (looked for {})", .candidates.join(", "))]
    NotFound { candidates: Vec<String> },

    #[error("Cannot read '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised by the built-in functions.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("invalid wildcard pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to spawn shell for '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("shell command '{command}' failed with status {}: {output}", status_text(.status))]
    CommandFailed {
        command: String,
        status: Option<i32>,
        output: String,
    },
}

fn status_text(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Errors raised while evaluating a single statement. Each carries the
/// source line the statement started on.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("line {line}: $@ used outside of a rule")]
    AutomaticOutsideRule { line: usize },

    #[error("line {line}: empty variable name")]
    EmptyVariableName { line: usize },

    #[error("line {line}: unterminated variable reference in '{text}'")]
    UnterminatedReference { line: usize, text: String },

    #[error("line {line}: $({expr}): {source}")]
    Function {
        line: usize,
        expr: String,
        #[source]
        source: FunctionError,
    },
}

impl EvalError {
    /// Source line of the statement that failed.
    pub fn line(&self) -> usize {
        match self {
            EvalError::AutomaticOutsideRule { line }
            | EvalError::EmptyVariableName { line }
            | EvalError::UnterminatedReference { line, .. }
            | EvalError::Function { line, .. } => *line,
        }
    }
}
