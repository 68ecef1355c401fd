// Evaluator: expands `$` references and turns statements into variables and rules

use crate::ast::{Program, Statement};
use crate::error::EvalError;
use crate::functions;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, warn};

/// A fully expanded build rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub output: String,
    pub inputs: Vec<String>,
    pub commands: Vec<String>,
}

/// Everything an evaluation run produces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvalResult {
    pub variables: BTreeMap<String, String>,
    pub rules: Vec<Rule>,
    /// Names looked up during expansion that were not supplied as overrides.
    pub references: BTreeSet<String>,
}

/// Evaluation state for one run. Statements are evaluated strictly in order,
/// and each one sees the variable store as it stands at that point.
#[derive(Debug, Default)]
pub struct Evaluator {
    overrides: HashMap<String, String>,
    result: EvalResult,
    /// Output of the rule being evaluated; the binding for `$@`.
    current_output: Option<String>,
    line: usize,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluator whose lookups consult `overrides` before the variable store.
    pub fn with_overrides(overrides: HashMap<String, String>) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    /// Evaluate every statement, stopping at the first failure.
    pub fn execute(&mut self, program: &Program) -> Result<(), EvalError> {
        for statement in &program.statements {
            self.eval_statement(statement)?;
        }
        Ok(())
    }

    /// Evaluate every statement, collecting failures and carrying on with the
    /// next statement after each one.
    pub fn execute_keep_going(&mut self, program: &Program) -> Vec<EvalError> {
        program
            .statements
            .iter()
            .filter_map(|statement| self.eval_statement(statement).err())
            .collect()
    }

    /// Evaluate a single statement. A failing rule is never added to the
    /// rule list and a failing assignment leaves the store untouched.
    pub fn eval_statement(&mut self, statement: &Statement) -> Result<(), EvalError> {
        self.line = statement.line();
        match statement {
            Statement::Assignment { lhs, rhs, .. } => self.eval_assignment(lhs, rhs),
            Statement::Rule {
                lhs, rhs, commands, ..
            } => self.eval_rule(lhs, rhs, commands),
        }
    }

    pub fn result(&self) -> &EvalResult {
        &self.result
    }

    pub fn into_result(self) -> EvalResult {
        self.result
    }

    fn eval_assignment(&mut self, lhs: &str, rhs: &str) -> Result<(), EvalError> {
        let name = self.expand_whole(lhs)?;
        if name.is_empty() {
            return Err(EvalError::EmptyVariableName { line: self.line });
        }
        if !is_identifier(&name) {
            warn!(line = self.line, name = %name, "variable name is not an identifier");
        }
        let value = self.expand_whole(rhs)?;
        debug!(line = self.line, "ASSIGN {}={}", name, value);
        self.result.variables.insert(name, value);
        Ok(())
    }

    fn eval_rule(&mut self, lhs: &str, rhs: &str, commands: &[String]) -> Result<(), EvalError> {
        let output = self.expand_whole(lhs)?;

        self.current_output = Some(output.clone());
        let body = self.expand_rule_body(rhs, commands);
        self.current_output = None;
        let (inputs, commands) = body?;

        debug!(line = self.line, "RULE {}: {}", output, inputs.join(" "));
        self.result.rules.push(Rule {
            output,
            inputs,
            commands,
        });
        Ok(())
    }

    fn expand_rule_body(
        &mut self,
        rhs: &str,
        commands: &[String],
    ) -> Result<(Vec<String>, Vec<String>), EvalError> {
        let prerequisites = self.expand_whole(rhs)?;
        let inputs = if prerequisites.is_empty() {
            Vec::new()
        } else {
            prerequisites.split(' ').map(str::to_string).collect()
        };

        let commands = commands
            .iter()
            .map(|command| self.expand_whole(command))
            .collect::<Result<Vec<_>, _>>()?;

        Ok((inputs, commands))
    }

    /// Expand all of `text`.
    ///
    /// # Panics
    /// Panics if the scanner stops before the end of `text`. With no terminator
    /// the scan only stops at the end, so anything else is a scanner bug.
    pub fn expand_whole(&mut self, text: &str) -> Result<String, EvalError> {
        let (value, consumed) = self.expand(text, None)?;
        assert_eq!(
            consumed,
            text.len(),
            "expansion of {text:?} stopped after {consumed} bytes"
        );
        Ok(value)
    }

    /// Expand `text` up to `terminator` (or the end), returning the expanded
    /// string and the number of bytes consumed. The terminator itself is not
    /// consumed.
    fn expand(&mut self, text: &str, terminator: Option<u8>) -> Result<(String, usize), EvalError> {
        let bytes = text.as_bytes();
        let stops = |b: u8| Some(b) == terminator;
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < bytes.len() && !stops(bytes[i]) {
            if bytes[i] != b'$' {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b'$' || stops(b))
                    .map_or(bytes.len(), |n| i + n);
                out.push_str(&text[i..end]);
                i = end;
                continue;
            }

            i += 1;
            if i >= bytes.len() || stops(bytes[i]) {
                continue;
            }

            let name = match bytes[i] {
                b'@' => {
                    let output = self
                        .current_output
                        .as_deref()
                        .ok_or(EvalError::AutomaticOutsideRule { line: self.line })?;
                    out.push_str(output);
                    i += 1;
                    continue;
                }
                b'(' => {
                    let (inner, used) = self.expand(&text[i + 1..], Some(b')'))?;
                    let close = i + 1 + used;
                    if close >= bytes.len() {
                        return Err(EvalError::UnterminatedReference {
                            line: self.line,
                            text: text.to_string(),
                        });
                    }
                    i = close + 1;

                    // Dispatch on the expanded text, so a computed name can select a function.
                    if let Some(result) = functions::call(&inner) {
                        let value = result.map_err(|source| EvalError::Function {
                            line: self.line,
                            expr: inner.clone(),
                            source,
                        })?;
                        out.push_str(&value);
                        continue;
                    }
                    inner
                }
                _ => {
                    let ch = text[i..].chars().next().unwrap_or_default();
                    i += ch.len_utf8();
                    ch.to_string()
                }
            };

            out.push_str(&self.lookup(&name));
        }

        Ok((out, i))
    }

    /// Resolve a variable: overrides first, then the store. Never fails;
    /// undefined names expand to the empty string.
    fn lookup(&mut self, name: &str) -> String {
        if let Some(value) = self.overrides.get(name) {
            return value.clone();
        }
        self.result.references.insert(name.to_string());
        self.result.variables.get(name).cloned().unwrap_or_default()
    }
}

/// Letters, digits, `_` and `.`, not starting with a digit.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Evaluate `program` with no overrides, aborting on the first error.
pub fn evaluate(program: &Program) -> Result<EvalResult, EvalError> {
    let mut evaluator = Evaluator::new();
    evaluator.execute(program)?;
    Ok(evaluator.into_result())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_script;

    fn eval(text: &str) -> EvalResult {
        evaluate(&parse_script(text).unwrap()).unwrap()
    }

    fn eval_err(text: &str) -> EvalError {
        evaluate(&parse_script(text).unwrap()).unwrap_err()
    }

    #[test]
    fn test_undefined_reference_is_empty_and_recorded() {
        let mut ev = Evaluator::new();
        assert_eq!(ev.expand_whole("[$(NOPE)]").unwrap(), "[]");
        assert!(ev.result().references.contains("NOPE"));
    }

    #[test]
    fn test_plain_assignment_records_no_references() {
        let result = eval("X = a b\n");
        assert_eq!(result.variables["X"], "a b");
        assert!(result.references.is_empty());
    }

    #[test]
    fn test_declaration_order_semantics() {
        let result = eval("FOO = $(BAR)baz\nBAR = 1\n");
        assert_eq!(result.variables["FOO"], "baz");
        assert_eq!(result.variables["BAR"], "1");
        assert!(result.references.contains("BAR"));
    }

    #[test]
    fn test_rule_with_automatic_output() {
        let result = eval("out: a b\n\tcmd $@\n");
        assert_eq!(
            result.rules,
            vec![Rule {
                output: "out".to_string(),
                inputs: vec!["a".to_string(), "b".to_string()],
                commands: vec!["cmd out".to_string()],
            }]
        );
    }

    #[test]
    fn test_last_assignment_wins() {
        let result = eval("X = 1\nX = 2\n");
        assert_eq!(result.variables["X"], "2");
        assert_eq!(result.variables.len(), 1);
    }

    #[test]
    fn test_duplicate_rules_are_kept_in_order() {
        let result = eval("out: a\n\tfirst\nout: b\n\tsecond\n");
        assert_eq!(result.rules.len(), 2);
        assert_eq!(result.rules[0].inputs, vec!["a"]);
        assert_eq!(result.rules[1].commands, vec!["second"]);
    }

    #[test]
    fn test_single_character_variable() {
        let result = eval("X = x\nY = <$X$Xy>\n");
        assert_eq!(result.variables["Y"], "<xxy>");
    }

    #[test]
    fn test_nested_and_computed_names() {
        let result = eval("N = AME\nNAME = found\nV = $(N$(N))\nW = $(NAME)\nK = NAME\n$(K)2 = copy\n");
        assert_eq!(result.variables["W"], "found");
        assert_eq!(result.variables["NAME2"], "copy");
        assert_eq!(result.variables["V"], "found");
        assert!(result.references.contains("NAME"));
    }

    #[test]
    fn test_empty_assignment_name_is_an_error() {
        let err = eval_err("X = 1\n= x\n");
        assert!(matches!(err, EvalError::EmptyVariableName { line: 2 }));

        let err = eval_err("E =\n$(E) = x\n");
        assert!(matches!(err, EvalError::EmptyVariableName { line: 2 }));
    }

    #[test]
    fn test_identifier_names() {
        assert!(is_identifier("CFLAGS"));
        assert!(is_identifier("_x.y2"));
        assert!(is_identifier(".PHONY"));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_nested_reference_resumes_outer_scan() {
        let mut ev = Evaluator::new();
        ev.eval_statement(&Statement::Assignment {
            lhs: "A".to_string(),
            rhs: "B".to_string(),
            line: 1,
        })
        .unwrap();
        ev.eval_statement(&Statement::Assignment {
            lhs: "B".to_string(),
            rhs: "deep".to_string(),
            line: 2,
        })
        .unwrap();
        assert_eq!(ev.expand_whole("x$($(A))y").unwrap(), "xdeepy");
    }

    #[test]
    fn test_trailing_dollar_expands_to_nothing() {
        let mut ev = Evaluator::new();
        assert_eq!(ev.expand_whole("cost$").unwrap(), "cost");
        assert_eq!(ev.expand_whole("$($)").unwrap(), "");
    }

    #[test]
    fn test_automatic_outside_rule_is_an_error() {
        let err = eval_err("X = 1\nY = $@\n");
        assert!(matches!(err, EvalError::AutomaticOutsideRule { line: 2 }));
    }

    #[test]
    fn test_automatic_in_rule_output_is_an_error() {
        let err = eval_err("$@: a\n");
        assert!(matches!(err, EvalError::AutomaticOutsideRule { line: 1 }));
    }

    #[test]
    fn test_rule_context_ends_after_rule() {
        let err = eval_err("out: a\n\techo $@\nX = $@\n");
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn test_unterminated_reference() {
        let err = eval_err("X = $(FOO\n");
        assert!(matches!(err, EvalError::UnterminatedReference { line: 1, .. }));
    }

    #[test]
    fn test_prerequisites_keep_empty_tokens() {
        let result = eval("E =\nout: a $(E) b\n");
        assert_eq!(result.rules[0].inputs, vec!["a", "", "b"]);
    }

    #[test]
    fn test_rule_without_prerequisites() {
        let result = eval("clean:\n\trm -f $@.o\n");
        assert!(result.rules[0].inputs.is_empty());
        assert_eq!(result.rules[0].commands, vec!["rm -f clean.o"]);
    }

    #[test]
    fn test_automatic_in_prerequisites_and_nested() {
        let result = eval("out: $@.c $(SRC_$@)\n");
        assert_eq!(result.rules[0].inputs, vec!["out.c", ""]);
        assert!(result.references.contains("SRC_out"));
    }

    #[test]
    fn test_overrides_win_and_are_not_references() {
        let overrides = HashMap::from([("CC".to_string(), "clang".to_string())]);
        let mut ev = Evaluator::with_overrides(overrides);
        ev.execute(&parse_script("CC = gcc\nX = $(CC)\n").unwrap()).unwrap();
        let result = ev.into_result();
        assert_eq!(result.variables["X"], "clang");
        assert_eq!(result.variables["CC"], "gcc");
        assert!(result.references.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_function() {
        let result = eval("X = $(shell echo a  b)\n");
        assert_eq!(result.variables["X"], "a b");
    }

    #[cfg(unix)]
    #[test]
    fn test_function_name_from_expansion() {
        let result = eval("F = shell\nX = $($(F) echo hi)\n");
        assert_eq!(result.variables["X"], "hi");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_function_keeps_going() {
        let program = parse_script("A = 1\nout: $(shell exit 1)\nB = 2\n").unwrap();
        let mut ev = Evaluator::new();
        let errors = ev.execute_keep_going(&program);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], EvalError::Function { line: 2, .. }));

        let result = ev.into_result();
        assert!(result.rules.is_empty());
        assert_eq!(result.variables["B"], "2");
    }

    #[test]
    fn test_wildcard_function() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();

        let text = format!("FILES = $(wildcard {}/*.txt)\n", dir.path().display());
        let result = eval(&text);
        let names: BTreeSet<&str> = result.variables["FILES"]
            .split(' ')
            .filter_map(|p| p.rsplit('/').next())
            .collect();
        assert_eq!(names, BTreeSet::from(["a.txt", "b.txt"]));
    }
}
