use crate::bytecode::op::Op;
use crate::lang::value::Value;

/// A fatal error raised by the virtual machine. Aborts execution; distinct
/// from the `Error` values built-ins place on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        RuntimeError {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl std::error::Error for RuntimeError {}

pub fn stack_overflow() -> RuntimeError {
    RuntimeError::new("stack overflow")
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("stack underflow")
}

pub fn frame_overflow() -> RuntimeError {
    RuntimeError::new("frame overflow")
}

pub fn unknown_opcode(byte: u8) -> RuntimeError {
    RuntimeError::new(format!("opcode {} is undefined", byte))
}

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("division by zero")
}

pub fn unsupported_binary_types(left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "unsupported types for binary operation: {} {}",
        left.type_name(),
        right.type_name()
    ))
}

pub fn unknown_integer_operator(op: Op) -> RuntimeError {
    RuntimeError::new(format!("unknown integer operator: {}", op.name()))
}

pub fn unknown_string_operator(op: Op) -> RuntimeError {
    RuntimeError::new(format!("unknown string operator: {}", op.name()))
}

pub fn unknown_operator(op: Op, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "unknown operator: {} {} {}",
        op.name(),
        left.type_name(),
        right.type_name()
    ))
}

pub fn unsupported_negation_type(operand: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "unsupported type for negation: {}",
        operand.type_name()
    ))
}

pub fn index_not_supported(left: &Value) -> RuntimeError {
    RuntimeError::new(format!(
        "index operator not supported: {}",
        left.type_name()
    ))
}

pub fn calling_non_function() -> RuntimeError {
    RuntimeError::new("calling a non-function and non-built-in")
}

pub fn wrong_parameter_count(want: usize, got: usize) -> RuntimeError {
    RuntimeError::new(format!(
        "wrong number of parameters: want={}, got={}",
        want, got
    ))
}

pub fn not_a_function(constant: &Value) -> RuntimeError {
    RuntimeError::new(format!("not a function: {}", constant))
}

pub fn return_outside_function() -> RuntimeError {
    RuntimeError::new("return outside of a function")
}
