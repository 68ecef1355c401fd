// Program model: parsed, unexpanded statements

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

/// A classified statement. Text fields are raw and get expanded during evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Assignment {
        lhs: String,
        rhs: String,
        line: usize,
    },
    Rule {
        lhs: String,
        rhs: String,
        commands: Vec<String>,
        line: usize,
    },
}

impl Statement {
    pub fn line(&self) -> usize {
        match self {
            Statement::Assignment { line, .. } | Statement::Rule { line, .. } => *line,
        }
    }
}
