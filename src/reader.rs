// Logical line reader: continuation joining, comment stripping, one line of pushback

use std::io::{self, BufRead};
use std::iter;

/// One logical line, possibly joined from several physical lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalLine {
    pub text: String,
    /// First physical line (1-based).
    pub start: usize,
    /// Last physical line; equals `start` unless continuations were joined.
    pub end: usize,
}

pub struct LineReader<R> {
    input: R,
    lineno: usize,
    pushed_back: Option<LogicalLine>,
    done: bool,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input,
            lineno: 0,
            pushed_back: None,
            done: false,
        }
    }

    /// Whether the underlying input is exhausted and no line is pending.
    pub fn is_done(&self) -> bool {
        self.done && self.pushed_back.is_none()
    }

    /// Read the next logical line, or `None` at end of input.
    pub fn read_line(&mut self) -> io::Result<Option<LogicalLine>> {
        if let Some(line) = self.pushed_back.take() {
            return Ok(Some(line));
        }

        let Some(mut raw) = self.read_physical()? else {
            return Ok(None);
        };
        let start = self.lineno;

        while ends_in_continuation(&raw) {
            raw.pop();
            match self.read_physical()? {
                Some(next) => raw.push_str(&next),
                None => break,
            }
        }

        Ok(Some(LogicalLine {
            text: strip_comment(&raw),
            start,
            end: self.lineno,
        }))
    }

    /// Push a line back so the next `read_line` returns it again.
    ///
    /// # Panics
    /// Panics if a line is already pushed back; callers never need more than
    /// one line of lookahead, so a second pushback is a logic error.
    pub fn unread_line(&mut self, line: LogicalLine) {
        if self.pushed_back.is_some() {
            panic!("unread_line called twice without an intervening read");
        }
        self.pushed_back = Some(line);
    }

    fn read_physical(&mut self) -> io::Result<Option<String>> {
        if self.done {
            return Ok(None);
        }
        let mut buf = Vec::new();
        if self.input.read_until(b'\n', &mut buf)? == 0 {
            self.done = true;
            return Ok(None);
        }
        self.lineno += 1;
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") {
                buf.pop();
            }
        } else {
            // Last line without a trailing newline.
            self.done = true;
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// An odd run of trailing backslashes marks a continuation; `\\` is a literal.
fn ends_in_continuation(line: &str) -> bool {
    let trailing = line.bytes().rev().take_while(|&b| b == b'\\').count();
    trailing % 2 == 1
}

/// Drop everything from the first unescaped `#`. A run of backslashes before
/// a `#` is halved; an odd run escapes the `#`, so `\#` is a literal `#` and
/// `\\#` is a backslash followed by a comment.
fn strip_comment(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut backslashes = 0;
    for ch in line.chars() {
        match ch {
            '\\' => {
                backslashes += 1;
                continue;
            }
            '#' => {
                out.extend(iter::repeat_n('\\', backslashes / 2));
                if backslashes % 2 == 0 {
                    return out;
                }
                out.push('#');
            }
            _ => {
                out.extend(iter::repeat_n('\\', backslashes));
                out.push(ch);
            }
        }
        backslashes = 0;
    }
    out.extend(iter::repeat_n('\\', backslashes));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(text: &str) -> LineReader<&[u8]> {
        LineReader::new(text.as_bytes())
    }

    fn all_lines(text: &str) -> Vec<LogicalLine> {
        let mut rd = reader(text);
        let mut lines = Vec::new();
        while let Some(line) = rd.read_line().unwrap() {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_plain_lines_with_numbers() {
        let lines = all_lines("a\nb\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "a");
        assert_eq!((lines[1].start, lines[1].end), (2, 2));
    }

    #[test]
    fn test_last_line_without_newline() {
        let lines = all_lines("a\nlast");
        assert_eq!(lines[1].text, "last");
    }

    #[test]
    fn test_continuation_joins_lines() {
        let lines = all_lines("FOO = a \\\nb \\\nc\nnext\n");
        assert_eq!(lines[0].text, "FOO = a b c");
        assert_eq!((lines[0].start, lines[0].end), (1, 3));
        assert_eq!(lines[1].text, "next");
        assert_eq!((lines[1].start, lines[1].end), (4, 4));
    }

    #[test]
    fn test_double_backslash_is_not_continuation() {
        let lines = all_lines("a\\\\\nb\n");
        assert_eq!(lines[0].text, "a\\\\");
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn test_comment_stripped_after_join() {
        let lines = all_lines("x = 1 # note \\\nstill comment\ny\n");
        assert_eq!(lines[0].text, "x = 1 ");
        assert_eq!(lines[1].text, "y");
    }

    #[test]
    fn test_escaped_hash_is_kept() {
        let lines = all_lines("x = a\\#b # c\n");
        assert_eq!(lines[0].text, "x = a#b ");
    }

    #[test]
    fn test_escaped_backslash_before_hash_starts_comment() {
        let lines = all_lines("x = a\\\\# c\ny = b\\\\\\#d\n");
        assert_eq!(lines[0].text, "x = a\\");
        assert_eq!(lines[1].text, "y = b\\#d");
    }

    #[test]
    fn test_backslashes_not_before_hash_are_kept() {
        let lines = all_lines("p = a\\\\b\\c\n");
        assert_eq!(lines[0].text, "p = a\\\\b\\c");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut rd = LineReader::new(&b"X = 1 # caf\xe9\nY = \xff\n"[..]);
        assert_eq!(rd.read_line().unwrap().unwrap().text, "X = 1 ");
        assert_eq!(rd.read_line().unwrap().unwrap().text, "Y = \u{FFFD}");
        assert!(rd.read_line().unwrap().is_none());
    }

    #[test]
    fn test_crlf_line_endings() {
        let lines = all_lines("a\r\nb\r\n");
        assert_eq!(lines[0].text, "a");
        assert_eq!(lines[1].text, "b");
    }

    #[test]
    fn test_unread_returns_same_line() {
        let mut rd = reader("one\ntwo\n");
        let first = rd.read_line().unwrap().unwrap();
        rd.unread_line(first.clone());
        assert_eq!(rd.read_line().unwrap(), Some(first));
        assert_eq!(rd.read_line().unwrap().unwrap().text, "two");
        assert!(rd.read_line().unwrap().is_none());
        assert!(rd.is_done());
    }

    #[test]
    #[should_panic(expected = "unread_line called twice")]
    fn test_double_unread_panics() {
        let mut rd = reader("one\n");
        let line = rd.read_line().unwrap().unwrap();
        rd.unread_line(line.clone());
        rd.unread_line(line);
    }
}
