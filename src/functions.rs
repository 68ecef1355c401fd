// Built-in functions: `$(wildcard ...)` and `$(shell ...)`

use crate::error::FunctionError;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use tracing::debug;

const WILDCARD: &str = "wildcard ";
const SHELL: &str = "shell ";

/// Run the built-in named by the prefix of `expr`, if any.
///
/// `expr` is the fully expanded text inside `$( )`. Matching is a plain
/// prefix test, so a variable name that starts with `shell ` is taken as a call.
pub fn call(expr: &str) -> Option<Result<String, FunctionError>> {
    if let Some(pattern) = expr.strip_prefix(WILDCARD) {
        Some(wildcard(pattern))
    } else if let Some(command) = expr.strip_prefix(SHELL) {
        Some(shell(command))
    } else {
        None
    }
}

/// Expand a filesystem glob into space-separated paths, sorted. Entries that
/// cannot be read are skipped; only a malformed pattern is an error.
pub fn wildcard(pattern: &str) -> Result<String, FunctionError> {
    let paths = glob::glob(pattern).map_err(|source| FunctionError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut matches = Vec::new();
    for path in paths {
        match path {
            Ok(path) => matches.push(path.to_string_lossy().into_owned()),
            Err(e) => {
                debug!(path = %e.path().display(), error = %e.error(), "skipping unreadable path")
            }
        }
    }
    matches.sort();

    debug!(pattern = %pattern, count = matches.len(), "wildcard expanded");
    Ok(matches.join(" "))
}

/// Run `command` through the shell and return its combined output with
/// whitespace runs collapsed to single spaces.
pub fn shell(command: &str) -> Result<String, FunctionError> {
    let shell_cmd = shell_program();
    debug!(shell = %shell_cmd, command = %command, "spawning shell");

    let spawn_error = |source| FunctionError::Spawn {
        command: command.to_string(),
        source,
    };

    // stdout and stderr share one pipe so their output keeps its order.
    let (mut reader, writer) = io::pipe().map_err(spawn_error)?;
    let stdout = writer.try_clone().map_err(spawn_error)?;

    // The Command holds the write ends; it must be dropped before reading or
    // the pipe never reaches end of file.
    let mut child = {
        let mut cmd = Command::new(&shell_cmd);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(writer);
        cmd.spawn().map_err(spawn_error)?
    };

    let mut raw = Vec::new();
    let read = reader.read_to_end(&mut raw);
    let status = child.wait().map_err(spawn_error)?;
    read.map_err(spawn_error)?;

    let collapsed = collapse_whitespace(&String::from_utf8_lossy(&raw));

    if !status.success() {
        return Err(FunctionError::CommandFailed {
            command: command.to_string(),
            status: status.code(),
            output: collapsed,
        });
    }

    Ok(collapsed)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shell used for `$(shell ...)`: `MAKEVAL_SHELL`, else the platform default.
fn shell_program() -> String {
    if let Ok(custom_shell) = std::env::var("MAKEVAL_SHELL") {
        custom_shell
    } else if cfg!(target_os = "windows") {
        if which::which("bash").is_ok() {
            "bash".to_string()
        } else {
            r"C:\Program Files\Git\bin\bash.exe".to_string()
        }
    } else {
        "sh".to_string()
    }
}
