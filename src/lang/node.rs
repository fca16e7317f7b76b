use serde::{Deserialize, Serialize};

/// A parsed TypeR program: an ordered sequence of statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    /// `let name <- value`
    Let { name: String, value: Expression },

    /// Bare `name <- value`.
    ///
    /// Compiles exactly like `Let`; the tree-walking evaluator additionally
    /// treats the binding as constant.
    Const { name: String, value: Expression },

    /// `return value`
    Return(Expression),

    /// An expression in statement position.
    Expression(Expression),
}

/// A `{ ... }` body, as used by conditionals and function literals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Integer(i64),
    Boolean(bool),
    String(String),
    Array(Vec<Expression>),
    Identifier(String),

    /// `!right` or `-right`. The operator is kept as written so the
    /// compiler owns the unknown-operator diagnostics.
    Prefix {
        operator: String,
        right: Box<Expression>,
    },

    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },

    /// `function(params) { body }`, or the shorthand `(params) { body }`.
    ///
    /// `name` is filled in by the parser when the literal is the direct
    /// right-hand side of a binding, so the function can refer to itself.
    Function {
        name: Option<String>,
        parameters: Vec<String>,
        body: BlockStatement,
    },

    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },

    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} <- {};", name, value),
            Statement::Const { name, value } => write!(f, "{} <- {};", name, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

impl std::fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Integer(value) => write!(f, "{}", value),
            Expression::Boolean(value) => {
                if *value {
                    write!(f, "TRUE")
                } else {
                    write!(f, "FALSE")
                }
            }
            Expression::String(value) => write!(f, "{}", value),
            Expression::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if {} {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, " else {}", alternative)?;
                }
                Ok(())
            }
            Expression::Function {
                name,
                parameters,
                body,
            } => {
                write!(f, "function")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                let rendered: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, rendered.join(", "))
            }
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
