use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::op::Instructions;
use crate::lang::node::BlockStatement;
use crate::runtime::environment::Environment;

/// Signature of a native built-in. `None` means "no interesting result";
/// callers substitute `Null`.
pub type BuiltinFunction = fn(&[Value]) -> Option<Value>;

/// Runtime value in the TypeR language.
///
/// Heap-backed variants are `Rc`-shared: pushing a value on the VM stack,
/// capturing it in a closure or storing it in a global clones the handle,
/// never the payload.
#[derive(Debug, Clone)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),

    /// Boolean value, printed `TRUE` / `FALSE`.
    Boolean(bool),

    /// The absent value.
    Null,

    /// UTF-8 string value.
    String(Rc<String>),

    /// Ordered sequence of values.
    Array(Rc<Vec<Value>>),

    /// A user function on the tree-walking path: parameters, body and the
    /// environment it closed over.
    Function(Rc<Function>),

    /// Bytecode-compiled function body. Lives in the constants pool.
    CompiledFunction(Rc<CompiledFunction>),

    /// A compiled function paired with its captured values.
    Closure(Rc<Closure>),

    /// Native built-in function.
    Builtin(Builtin),

    /// Error produced by a built-in or by the evaluator. Flows on the
    /// stack like any other value.
    Error(String),

    /// Wrapper the evaluator uses to unwind `return`; never a surface
    /// value on the VM path.
    ReturnValue(Box<Value>),
}

pub struct Function {
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free_variables: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFunction,
}

impl Value {
    /// The type tag used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Function(_) => "FUNCTION",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION_OBJECT",
            Value::Closure(_) => "CLOSURE_OBJECT",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
            Value::ReturnValue(_) => "RETURN_VALUE",
        }
    }

    /// Everything is truthy except `FALSE` and `NULL`; in particular the
    /// integer 0 and the empty string are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false) | Value::Null)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Reference identity, the comparison the runtime falls back to for
    /// non-integer operands of `==` / `!=`.
    ///
    /// Booleans and `NULL` behave as shared singletons and compare by
    /// value. Strings, arrays and functions compare by handle: two
    /// independently built strings with the same contents are distinct
    /// objects and therefore unequal here.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Null, Value::Null) => true,
            (Value::String(left), Value::String(right)) => Rc::ptr_eq(left, right),
            (Value::Array(left), Value::Array(right)) => Rc::ptr_eq(left, right),
            (Value::Function(left), Value::Function(right)) => Rc::ptr_eq(left, right),
            (Value::CompiledFunction(left), Value::CompiledFunction(right)) => {
                Rc::ptr_eq(left, right)
            }
            (Value::Closure(left), Value::Closure(right)) => Rc::ptr_eq(left, right),
            (Value::Builtin(left), Value::Builtin(right)) => {
                left.func as usize == right.func as usize
            }
            _ => false,
        }
    }
}

/// Structural equality, used by tests and by nothing on the runtime paths;
/// the `==` operator of the language goes through integer comparison and
/// `same_object` instead.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Null, Value::Null) => true,
            (Value::String(left), Value::String(right)) => left == right,
            (Value::Array(left), Value::Array(right)) => left == right,
            (Value::Function(left), Value::Function(right)) => Rc::ptr_eq(left, right),
            (Value::CompiledFunction(left), Value::CompiledFunction(right)) => left == right,
            (Value::Closure(left), Value::Closure(right)) => {
                left.func == right.func && left.free_variables == right.free_variables
            }
            (Value::Builtin(left), Value::Builtin(right)) => {
                left.name == right.name && left.func as usize == right.func as usize
            }
            (Value::Error(left), Value::Error(right)) => left == right,
            (Value::ReturnValue(left), Value::ReturnValue(right)) => left == right,
            _ => false,
        }
    }
}

impl std::fmt::Display for Value {
    /// The display form shown by `puts` and the REPL.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Boolean(value) => {
                if *value {
                    write!(f, "TRUE")
                } else {
                    write!(f, "FALSE")
                }
            }
            Value::Null => write!(f, "NULL"),
            Value::String(value) => write!(f, "{}", value),
            Value::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Value::Function(function) => {
                write!(
                    f,
                    "function({}) {{\n{}\n}}",
                    function.parameters.join(", "),
                    function.body
                )
            }
            Value::CompiledFunction(function) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(function))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Error(message) => write!(f, "[ERROR]: {}", message),
            Value::ReturnValue(value) => write!(f, "{}", value),
        }
    }
}

impl std::fmt::Debug for Function {
    // Environments can be cyclic (a recursive function closes over the
    // scope that holds it), so the env is elided from debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("parameters", &self.parameters)
            .field("body", &self.body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::String(Rc::new(String::new())).is_truthy());
        assert!(Value::Boolean(true).is_truthy());
        assert!(!Value::Boolean(false).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn test_same_object_for_strings_is_identity() {
        let a = Value::String(Rc::new("x".to_string()));
        let b = Value::String(Rc::new("x".to_string()));
        let c = a.clone();

        assert!(!a.same_object(&b));
        assert!(a.same_object(&c));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(Value::Integer(5).to_string(), "5");
        assert_eq!(Value::Boolean(true).to_string(), "TRUE");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(
            Value::Array(Rc::new(vec![Value::Integer(1), Value::Integer(2)])).to_string(),
            "[1, 2]"
        );
        assert_eq!(
            Value::Error("boom".to_string()).to_string(),
            "[ERROR]: boom"
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Integer(1).type_name(), "INTEGER");
        assert_eq!(Value::Boolean(true).type_name(), "BOOLEAN");
        assert_eq!(Value::Null.type_name(), "NULL");
        assert_eq!(
            Value::String(Rc::new("s".to_string())).type_name(),
            "STRING"
        );
    }
}
