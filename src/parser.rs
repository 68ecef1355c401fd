// Statement classifier: turns logical lines into assignments and rules

use crate::ast::{Program, Statement};
use crate::error::ParseError;
use crate::reader::{LineReader, LogicalLine};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Conventional build file names, probed in this order.
pub const DEFAULT_FILENAMES: [&str; 3] = ["GNUmakefile", "makefile", "Makefile"];

pub fn parse_script(input: &str) -> Result<Program, ParseError> {
    parse_reader(input.as_bytes())
}

pub fn parse_reader<R: BufRead>(input: R) -> Result<Program, ParseError> {
    let mut reader = LineReader::new(input);
    let mut statements = Vec::new();

    while let Some(line) = reader.read_line()? {
        if let Some(stmt) = parse_statement(line, &mut reader)? {
            statements.push(stmt);
        }
    }

    Ok(Program { statements })
}

pub fn parse_file(path: &Path) -> Result<Program, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "parsing build file");
    parse_reader(BufReader::new(file))
}

/// Find the first conventional build file in `dir`.
pub fn find_build_file(dir: &Path) -> Result<PathBuf, ParseError> {
    DEFAULT_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| ParseError::NotFound {
            candidates: DEFAULT_FILENAMES.iter().map(|s| s.to_string()).collect(),
        })
}

/// Classify one logical line by whichever of `:` or `=` appears first.
fn parse_statement<R: BufRead>(
    line: LogicalLine,
    reader: &mut LineReader<R>,
) -> Result<Option<Statement>, ParseError> {
    let Some(sep) = line.text.find([':', '=']) else {
        if !line.text.trim().is_empty() {
            warn!(line = line.start, text = %line.text, "ignoring line without ':' or '='");
        }
        return Ok(None);
    };

    let lhs = line.text[..sep].trim().to_string();
    let rhs = line.text[sep + 1..].trim().to_string();

    if line.text.as_bytes()[sep] == b'=' {
        return Ok(Some(Statement::Assignment {
            lhs,
            rhs,
            line: line.start,
        }));
    }

    let commands = read_commands(reader)?;
    Ok(Some(Statement::Rule {
        lhs,
        rhs,
        commands,
        line: line.start,
    }))
}

/// Collect tab-indented command lines following a rule line. A blank line ends
/// the block; any other line ends it and is pushed back for reclassification.
fn read_commands<R: BufRead>(reader: &mut LineReader<R>) -> Result<Vec<String>, ParseError> {
    let mut commands = Vec::new();
    while let Some(line) = reader.read_line()? {
        if line.text.is_empty() {
            break;
        }
        if let Some(command) = line.text.strip_prefix('\t') {
            commands.push(command.trim().to_string());
        } else {
            reader.unread_line(line);
            break;
        }
    }
    Ok(commands)
}
