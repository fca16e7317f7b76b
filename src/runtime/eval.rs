use std::cell::RefCell;
use std::rc::Rc;

use crate::lang::builtins;
use crate::lang::node::{BlockStatement, Expression, Program, Statement};
use crate::lang::value::{Function, Value};
use crate::runtime::environment::Environment;

// =============================================================================
// EVAL - tree-walking evaluator, the alternative back-end to the VM
// =============================================================================

/// Evaluates a whole program, unwrapping a top-level `return`.
pub fn eval_program(program: &Program, env: &Rc<RefCell<Environment>>) -> Value {
    let mut result = Value::Null;

    for statement in &program.statements {
        result = eval_statement(statement, env);

        match result {
            Value::ReturnValue(value) => return *value,
            Value::Error(_) => return result,
            _ => {}
        }
    }

    result
}

fn eval_statement(statement: &Statement, env: &Rc<RefCell<Environment>>) -> Value {
    match statement {
        Statement::Let { name, value } => eval_binding(name, value, false, env),
        Statement::Const { name, value } => eval_binding(name, value, true, env),
        Statement::Return(value) => {
            let value = eval_expression(value, env);
            if value.is_error() {
                return value;
            }

            Value::ReturnValue(Box::new(value))
        }
        Statement::Expression(expression) => eval_expression(expression, env),
    }
}

fn eval_binding(
    name: &str,
    value: &Expression,
    constant: bool,
    env: &Rc<RefCell<Environment>>,
) -> Value {
    // A name first bound with the bare `<-` form stays bound: the
    // evaluator enforces the constness the VM path ignores.
    if let Some(existing) = env.borrow().get(name) {
        if existing.constant {
            return Value::Error(format!("cannot reassign constant: {}", name));
        }
    }

    let value = eval_expression(value, env);
    if value.is_error() {
        return value;
    }

    env.borrow_mut().set(name, constant, value);

    Value::Null
}

fn eval_block(block: &BlockStatement, env: &Rc<RefCell<Environment>>) -> Value {
    let mut result = Value::Null;

    for statement in &block.statements {
        result = eval_statement(statement, env);

        // Return values bubble up unexamined so nested blocks unwind.
        if matches!(result, Value::ReturnValue(_) | Value::Error(_)) {
            return result;
        }
    }

    result
}

fn eval_expression(expression: &Expression, env: &Rc<RefCell<Environment>>) -> Value {
    match expression {
        Expression::Integer(value) => Value::Integer(*value),
        Expression::Boolean(value) => Value::Boolean(*value),
        Expression::String(value) => Value::String(Rc::new(value.clone())),

        Expression::Identifier(name) => match env.borrow().get(name) {
            Some(field) => field.value,
            None => match builtins::lookup(name) {
                Some(builtin) => Value::Builtin(builtin),
                None => Value::Error(format!("identifier not found: {}", name)),
            },
        },

        Expression::Prefix { operator, right } => {
            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }

            eval_prefix_expression(operator, right)
        }

        Expression::Infix {
            operator,
            left,
            right,
        } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }

            let right = eval_expression(right, env);
            if right.is_error() {
                return right;
            }

            eval_infix_expression(operator, left, right)
        }

        Expression::If {
            condition,
            consequence,
            alternative,
        } => {
            let condition = eval_expression(condition, env);
            if condition.is_error() {
                return condition;
            }

            if condition.is_truthy() {
                eval_block(consequence, env)
            } else if let Some(alternative) = alternative {
                eval_block(alternative, env)
            } else {
                Value::Null
            }
        }

        Expression::Array(elements) => match eval_expressions(elements, env) {
            Ok(elements) => Value::Array(Rc::new(elements)),
            Err(error) => error,
        },

        Expression::Index { left, index } => {
            let left = eval_expression(left, env);
            if left.is_error() {
                return left;
            }

            let index = eval_expression(index, env);
            if index.is_error() {
                return index;
            }

            eval_index_expression(left, index)
        }

        Expression::Function {
            parameters, body, ..
        } => Value::Function(Rc::new(Function {
            parameters: parameters.clone(),
            body: body.clone(),
            env: env.clone(),
        })),

        Expression::Call {
            function,
            arguments,
        } => {
            let function = eval_expression(function, env);
            if function.is_error() {
                return function;
            }

            let arguments = match eval_expressions(arguments, env) {
                Ok(arguments) => arguments,
                Err(error) => return error,
            };

            apply_function(function, arguments)
        }
    }
}

fn eval_expressions(
    expressions: &[Expression],
    env: &Rc<RefCell<Environment>>,
) -> Result<Vec<Value>, Value> {
    let mut values = Vec::with_capacity(expressions.len());

    for expression in expressions {
        let value = eval_expression(expression, env);
        if value.is_error() {
            return Err(value);
        }

        values.push(value);
    }

    Ok(values)
}

fn eval_prefix_expression(operator: &str, right: Value) -> Value {
    match operator {
        "!" => Value::Boolean(!right.is_truthy()),
        "-" => match right {
            Value::Integer(value) => Value::Integer(value.wrapping_neg()),
            other => Value::Error(format!("unknown operator: -{}", other.type_name())),
        },
        _ => Value::Error(format!("unknown operator: {}{}", operator, right.type_name())),
    }
}

fn eval_infix_expression(operator: &str, left: Value, right: Value) -> Value {
    if let (Value::Integer(left), Value::Integer(right)) = (&left, &right) {
        return eval_integer_infix_expression(operator, *left, *right);
    }

    if let (Value::String(left_str), Value::String(right_str)) = (&left, &right) {
        if operator == "+" {
            let mut concatenated = String::with_capacity(left_str.len() + right_str.len());
            concatenated.push_str(left_str);
            concatenated.push_str(right_str);

            return Value::String(Rc::new(concatenated));
        }
    }

    // Equality on non-integers is reference identity, like the VM path.
    match operator {
        "==" => Value::Boolean(left.same_object(&right)),
        "!=" => Value::Boolean(!left.same_object(&right)),
        _ if left.type_name() != right.type_name() => Value::Error(format!(
            "type mismatch: {} {} {}",
            left.type_name(),
            operator,
            right.type_name()
        )),
        _ => Value::Error(format!(
            "unknown operator: {} {} {}",
            left.type_name(),
            operator,
            right.type_name()
        )),
    }
}

fn eval_integer_infix_expression(operator: &str, left: i64, right: i64) -> Value {
    match operator {
        "+" => Value::Integer(left.wrapping_add(right)),
        "-" => Value::Integer(left.wrapping_sub(right)),
        "*" => Value::Integer(left.wrapping_mul(right)),
        "/" => {
            if right == 0 {
                return Value::Error("division by zero".to_string());
            }

            Value::Integer(left.wrapping_div(right))
        }
        "<" => Value::Boolean(left < right),
        ">" => Value::Boolean(left > right),
        "==" => Value::Boolean(left == right),
        "!=" => Value::Boolean(left != right),
        _ => Value::Error(format!("unknown operator: INTEGER {} INTEGER", operator)),
    }
}

fn eval_index_expression(left: Value, index: Value) -> Value {
    match (&left, &index) {
        (Value::Array(elements), Value::Integer(position)) => {
            let max = elements.len() as i64 - 1;

            if *position < 0 || *position > max {
                return Value::Null;
            }

            elements[*position as usize].clone()
        }
        _ => Value::Error(format!(
            "index operator not supported: {}",
            left.type_name()
        )),
    }
}

fn apply_function(function: Value, arguments: Vec<Value>) -> Value {
    match function {
        Value::Function(function) => {
            if arguments.len() != function.parameters.len() {
                return Value::Error(format!(
                    "wrong number of parameters: want={}, got={}",
                    function.parameters.len(),
                    arguments.len()
                ));
            }

            let call_env = Environment::enclosed(function.env.clone());
            for (parameter, argument) in function.parameters.iter().zip(arguments) {
                call_env.borrow_mut().set(parameter, false, argument);
            }

            let result = eval_block(&function.body, &call_env);

            match result {
                Value::ReturnValue(value) => *value,
                other => other,
            }
        }
        Value::Builtin(builtin) => (builtin.func)(&arguments).unwrap_or(Value::Null),
        other => Value::Error(format!("not a function: {}", other.type_name())),
    }
}
