/// Errors detected while lowering the AST to bytecode.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// An operator the instruction set has no encoding for (this includes
    /// `<=`, which the frontend accepts but the bytecode path does not).
    UnknownOperator(String),

    /// An identifier that resolves nowhere along the scope chain and is
    /// not a built-in.
    UndefinedVariable(String),
}

impl CompileError {
    pub fn unknown_operator(operator: &str) -> Self {
        CompileError::UnknownOperator(operator.to_string())
    }

    pub fn undefined_variable(name: &str) -> Self {
        CompileError::UndefinedVariable(name.to_string())
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::UnknownOperator(operator) => {
                write!(f, "unknown operator {}", operator)
            }
            CompileError::UndefinedVariable(name) => {
                write!(f, "undefined variable {}", name)
            }
        }
    }
}

impl std::error::Error for CompileError {}
