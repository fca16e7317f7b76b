use std::rc::Rc;

use crate::lang::value::{Builtin, Value};

/// The built-in registry.
///
/// Both the compiler (via `define_builtin`) and the VM (via `GetBuiltin`)
/// address built-ins by position in this table, so the order is part of the
/// bytecode contract: appending is fine, reordering is not.
pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "puts",
        func: builtin_puts,
    },
    Builtin {
        name: "head",
        func: builtin_head,
    },
    Builtin {
        name: "first",
        func: builtin_first,
    },
    Builtin {
        name: "last",
        func: builtin_last,
    },
    Builtin {
        name: "tail",
        func: builtin_tail,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
];

/// Finds a built-in by name, for the evaluator path and for tests.
pub fn lookup(name: &str) -> Option<Builtin> {
    BUILTINS.iter().find(|b| b.name == name).copied()
}

fn error(message: String) -> Option<Value> {
    Some(Value::Error(message))
}

fn wrong_parameter_count(got: usize, want: usize) -> Option<Value> {
    error(format!(
        "wrong number of parameters, got={}, want={}",
        got, want
    ))
}

/// `len(x)` - byte length of a string or element count of an array.
fn builtin_len(parameters: &[Value]) -> Option<Value> {
    if parameters.len() != 1 {
        return wrong_parameter_count(parameters.len(), 1);
    }

    match &parameters[0] {
        Value::String(value) => Some(Value::Integer(value.len() as i64)),
        Value::Array(elements) => Some(Value::Integer(elements.len() as i64)),
        other => error(format!(
            "parameters to `len` not supported, got={}",
            other.type_name()
        )),
    }
}

/// `puts(...)` - prints each argument's display form on its own line.
fn builtin_puts(parameters: &[Value]) -> Option<Value> {
    for parameter in parameters {
        println!("{}", parameter);
    }

    None
}

fn first_element(name: &str, parameters: &[Value]) -> Option<Value> {
    if parameters.len() != 1 {
        return wrong_parameter_count(parameters.len(), 1);
    }

    match &parameters[0] {
        Value::Array(elements) => Some(elements.first().cloned().unwrap_or(Value::Null)),
        other => error(format!(
            "argument to `{}` must be ARRAY, got={}",
            name,
            other.type_name()
        )),
    }
}

/// `head(arr)` - first element, or NULL for the empty array.
fn builtin_head(parameters: &[Value]) -> Option<Value> {
    first_element("head", parameters)
}

/// `first(arr)` - alias of `head`.
fn builtin_first(parameters: &[Value]) -> Option<Value> {
    first_element("first", parameters)
}

/// `last(arr)` - last element, or NULL for the empty array.
fn builtin_last(parameters: &[Value]) -> Option<Value> {
    if parameters.len() != 1 {
        return wrong_parameter_count(parameters.len(), 1);
    }

    match &parameters[0] {
        Value::Array(elements) => Some(elements.last().cloned().unwrap_or(Value::Null)),
        other => error(format!(
            "argument to `last` must be ARRAY, got={}",
            other.type_name()
        )),
    }
}

/// `tail(arr)` - a new array of everything but the first element, or NULL
/// for the empty array.
fn builtin_tail(parameters: &[Value]) -> Option<Value> {
    if parameters.len() != 1 {
        return wrong_parameter_count(parameters.len(), 1);
    }

    match &parameters[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                return Some(Value::Null);
            }

            Some(Value::Array(Rc::new(elements[1..].to_vec())))
        }
        other => error(format!(
            "argument to `tail` must be ARRAY, got={}",
            other.type_name()
        )),
    }
}

/// `push(arr, v)` - a new array with `v` appended; the original array is
/// unchanged.
fn builtin_push(parameters: &[Value]) -> Option<Value> {
    if parameters.len() != 2 {
        return wrong_parameter_count(parameters.len(), 2);
    }

    match &parameters[0] {
        Value::Array(elements) => {
            let mut extended = elements.as_ref().clone();
            extended.push(parameters[1].clone());

            Some(Value::Array(Rc::new(extended)))
        }
        other => error(format!(
            "argument to `push` must be ARRAY, got={}",
            other.type_name()
        )),
    }
}
