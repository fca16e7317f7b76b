use std::rc::Rc;

use crate::bytecode::compile::Bytecode;
use crate::bytecode::op::{read_u16, read_u8, Op};
use crate::lang::builtins::BUILTINS;
use crate::lang::value::{Builtin, Closure, CompiledFunction, Value};
use crate::runtime::runtime_error::{self, RuntimeError};

/// Capacity of the value stack.
pub const STACK_SIZE: usize = 2048;

/// Number of global slots; a `u16` operand can address all of them.
pub const GLOBAL_SIZE: usize = 65536;

/// Capacity of the frame stack.
pub const FRAME_SIZE: usize = 1024;

/// One activation record: the closure being run, the instruction pointer
/// into its bytecode, and where its locals start on the value stack.
struct Frame {
    closure: Rc<Closure>,
    ip: usize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    fn instructions(&self) -> &crate::bytecode::op::Instructions {
        &self.closure.func.instructions
    }
}

/// The stack machine executing compiled bytecode.
///
/// Frame 0 wraps the top-level instructions in a synthetic closure with no
/// captures; it is never popped.
pub struct VirtualMachine {
    constants: Vec<Value>,

    stack: Vec<Value>,
    /// Points at the next free stack slot; `stack[sp]` holds the most
    /// recently popped value.
    sp: usize,

    globals: Vec<Value>,

    frames: Vec<Frame>,
}

impl VirtualMachine {
    pub fn new(bytecode: Bytecode) -> Self {
        let main_function = Rc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Rc::new(Closure {
            func: main_function,
            free_variables: Vec::new(),
        });

        let mut frames = Vec::with_capacity(FRAME_SIZE);
        frames.push(Frame::new(main_closure, 0));

        VirtualMachine {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals: vec![Value::Null; GLOBAL_SIZE],
            frames,
        }
    }

    /// REPL constructor: shares the global store across lines.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        let mut vm = VirtualMachine::new(bytecode);
        vm.globals = globals;

        vm
    }

    /// Hands the global store back to the REPL after a run.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value of the last expression statement executed: the slot just
    /// above the logical stack top.
    pub fn last_popped(&self) -> Value {
        self.stack[self.sp].clone()
    }

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.current_frame().ip < self.current_frame().instructions().len() {
            let ip = self.current_frame().ip;
            let byte = self.current_frame().instructions().bytes()[ip];
            let op = Op::from_byte(byte).ok_or_else(|| runtime_error::unknown_opcode(byte))?;
            self.current_frame_mut().ip += 1;

            match op {
                Op::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self.constants[index].clone();
                    self.push(constant)?;
                }

                Op::Add | Op::Subtract | Op::Multiply | Op::Divide => {
                    self.execute_binary_operation(op)?;
                }

                Op::Pop => {
                    self.pop()?;
                }

                Op::True => self.push(Value::Boolean(true))?,
                Op::False => self.push(Value::Boolean(false))?,
                Op::Null => self.push(Value::Null)?,

                Op::Equal | Op::NotEqual | Op::GreaterThan => {
                    self.execute_comparison(op)?;
                }

                Op::Bang => {
                    let operand = self.pop()?;
                    self.push(Value::Boolean(!operand.is_truthy()))?;
                }

                Op::Minus => {
                    let operand = self.pop()?;
                    match operand {
                        Value::Integer(value) => {
                            self.push(Value::Integer(value.wrapping_neg()))?
                        }
                        other => return Err(runtime_error::unsupported_negation_type(&other)),
                    }
                }

                Op::Jump => {
                    let target = self.read_u16_operand();
                    self.current_frame_mut().ip = target;
                }

                Op::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;

                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target;
                    }
                }

                Op::SetGlobal => {
                    let index = self.read_u16_operand();
                    self.globals[index] = self.pop()?;
                }

                Op::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }

                Op::Array => {
                    let count = self.read_u16_operand();
                    let array = self.build_array(self.sp - count, self.sp);
                    self.sp -= count;
                    self.push(array)?;
                }

                Op::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                Op::Call => {
                    let num_args = self.read_u8_operand();
                    self.execute_call(num_args)?;
                }

                Op::ReturnValue => {
                    let return_value = self.pop()?;
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;
                    self.push(return_value)?;
                }

                Op::Return => {
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                Op::SetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    self.stack[base + index] = self.pop()?;
                }

                Op::GetLocal => {
                    let index = self.read_u8_operand();
                    let base = self.current_frame().base_pointer;
                    let value = self.stack[base + index].clone();
                    self.push(value)?;
                }

                Op::GetBuiltin => {
                    let index = self.read_u8_operand();
                    let builtin = BUILTINS[index];
                    self.push(Value::Builtin(builtin))?;
                }

                Op::Closure => {
                    let const_index = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_index, num_free)?;
                }

                Op::GetFreeVariable => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free_variables[index].clone();
                    self.push(value)?;
                }

                Op::CurrentClosure => {
                    let closure = Value::Closure(self.current_frame().closure.clone());
                    self.push(closure)?;
                }
            }
        }

        Ok(())
    }

    // Operand fetches advance the instruction pointer past what they read,
    // so the loop resumes at the next opcode.

    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let value = read_u16(&frame.closure.func.instructions.bytes()[frame.ip..]) as usize;
        frame.ip += 2;

        value
    }

    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let value = read_u8(&frame.closure.func.instructions.bytes()[frame.ip..]) as usize;
        frame.ip += 1;

        value
    }

    fn current_frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= FRAME_SIZE {
            return Err(runtime_error::frame_overflow());
        }

        self.frames.push(frame);

        Ok(())
    }

    fn pop_frame(&mut self) -> Result<Frame, RuntimeError> {
        // Frame 0 wraps the top-level program; a `return` there has no
        // caller to unwind into.
        if self.frames.len() == 1 {
            return Err(runtime_error::return_outside_function());
        }

        Ok(self.frames.pop().expect("frame stack is never empty"))
    }

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= STACK_SIZE {
            return Err(runtime_error::stack_overflow());
        }

        self.stack[self.sp] = value;
        self.sp += 1;

        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        if self.sp == 0 {
            return Err(runtime_error::stack_underflow());
        }

        self.sp -= 1;

        Ok(self.stack[self.sp].clone())
    }

    fn execute_binary_operation(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_integer_binary_operation(op, *left, *right)
            }
            (Value::String(left), Value::String(right)) => {
                if op != Op::Add {
                    return Err(runtime_error::unknown_string_operator(op));
                }

                let mut concatenated = String::with_capacity(left.len() + right.len());
                concatenated.push_str(left);
                concatenated.push_str(right);

                self.push(Value::String(Rc::new(concatenated)))
            }
            _ => Err(runtime_error::unsupported_binary_types(&left, &right)),
        }
    }

    // Overflow wraps; the numeric surface is plain two's-complement i64.
    fn execute_integer_binary_operation(
        &mut self,
        op: Op,
        left: i64,
        right: i64,
    ) -> Result<(), RuntimeError> {
        let result = match op {
            Op::Add => left.wrapping_add(right),
            Op::Subtract => left.wrapping_sub(right),
            Op::Multiply => left.wrapping_mul(right),
            Op::Divide => {
                if right == 0 {
                    return Err(runtime_error::division_by_zero());
                }

                left.wrapping_div(right)
            }
            _ => return Err(runtime_error::unknown_integer_operator(op)),
        };

        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, op: Op) -> Result<(), RuntimeError> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Integer(left), Value::Integer(right)) = (&left, &right) {
            let result = match op {
                Op::Equal => left == right,
                Op::NotEqual => left != right,
                Op::GreaterThan => left > right,
                _ => return Err(runtime_error::unknown_integer_operator(op)),
            };

            return self.push(Value::Boolean(result));
        }

        // Non-integer operands compare by reference identity; see
        // `Value::same_object` for what that means per variant.
        match op {
            Op::Equal => {
                let result = right.same_object(&left);
                self.push(Value::Boolean(result))
            }
            Op::NotEqual => {
                let result = !right.same_object(&left);
                self.push(Value::Boolean(result))
            }
            _ => Err(runtime_error::unknown_operator(op, &left, &right)),
        }
    }

    fn build_array(&self, start: usize, end: usize) -> Value {
        Value::Array(Rc::new(self.stack[start..end].to_vec()))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> Result<(), RuntimeError> {
        match (&left, &index) {
            (Value::Array(elements), Value::Integer(position)) => {
                let max = elements.len() as i64 - 1;

                if *position < 0 || *position > max {
                    return self.push(Value::Null);
                }

                let element = elements[*position as usize].clone();
                self.push(element)
            }
            _ => Err(runtime_error::index_not_supported(&left)),
        }
    }

    fn execute_call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.sp - 1 - num_args].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            _ => Err(runtime_error::calling_non_function()),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RuntimeError> {
        if num_args != closure.func.num_parameters {
            return Err(runtime_error::wrong_parameter_count(
                closure.func.num_parameters,
                num_args,
            ));
        }

        // The arguments already sit where the first locals live; the rest
        // of the local slots are reserved by bumping sp.
        let base_pointer = self.sp - num_args;
        let num_locals = closure.func.num_locals;

        if base_pointer + num_locals > STACK_SIZE {
            return Err(runtime_error::stack_overflow());
        }

        self.push_frame(Frame::new(closure, base_pointer))?;
        self.sp = base_pointer + num_locals;

        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, num_args: usize) -> Result<(), RuntimeError> {
        let arguments = &self.stack[self.sp - num_args..self.sp];
        let result = (builtin.func)(arguments);

        // Drop the arguments and the callee underneath them.
        self.sp = self.sp - num_args - 1;

        match result {
            Some(value) => self.push(value),
            None => self.push(Value::Null),
        }
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let constant = self.constants[const_index].clone();
        let function = match constant {
            Value::CompiledFunction(function) => function,
            other => return Err(runtime_error::not_a_function(&other)),
        };

        let free_variables = self.stack[self.sp - num_free..self.sp].to_vec();
        self.sp -= num_free;

        self.push(Value::Closure(Rc::new(Closure {
            func: function,
            free_variables,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::frontend::lexer::Lexer;
    use crate::frontend::parser::Parser;
    use crate::lang::node::Program;

    // ============================================================
    // Test helpers
    // ============================================================

    fn parse(input: &str) -> Program {
        let tokens = Lexer::new(input).tokenize().expect("lexing should succeed");
        Parser::new(tokens)
            .parse_program()
            .expect("parsing should succeed")
    }

    fn run(input: &str) -> Result<Value, RuntimeError> {
        let program = parse(input);
        let mut compiler = Compiler::new();
        compiler
            .compile(&program)
            .expect("compilation should succeed");

        let mut vm = VirtualMachine::new(compiler.bytecode());
        vm.run()?;

        Ok(vm.last_popped())
    }

    fn assert_value(input: &str, expected: Value) {
        let result = run(input).expect("execution should succeed");

        assert_eq!(result, expected, "wrong result for {:?}", input);
    }

    fn assert_integer(input: &str, expected: i64) {
        assert_value(input, Value::Integer(expected));
    }

    fn assert_boolean(input: &str, expected: bool) {
        assert_value(input, Value::Boolean(expected));
    }

    fn assert_runtime_error(input: &str, expected_message: &str) {
        let error = run(input).expect_err("execution should fail");

        assert_eq!(error.message, expected_message, "for input {:?}", input);
    }

    fn assert_error_value(input: &str, expected_message: &str) {
        let result = run(input).expect("execution should succeed");

        match result {
            Value::Error(message) => assert_eq!(message, expected_message),
            other => panic!("expected an Error value, got {:?}", other),
        }
    }

    fn int_array(values: &[i64]) -> Value {
        Value::Array(Rc::new(
            values.iter().map(|v| Value::Integer(*v)).collect(),
        ))
    }

    fn string(value: &str) -> Value {
        Value::String(Rc::new(value.to_string()))
    }

    // ============================================================
    // Arithmetic
    // ============================================================

    #[test]
    fn test_integer_arithmetic() {
        assert_integer("1", 1);
        assert_integer("2", 2);
        assert_integer("1 + 2", 3);
        assert_integer("1 - 2", -1);
        assert_integer("1 * 2", 2);
        assert_integer("4 / 2", 2);
        assert_integer("50 / 2 * 2 + 10 - 5", 55);
        assert_integer("5 * (2 + 10)", 60);
        assert_integer("-5", -5);
        assert_integer("-50 + 100 + -50", 0);
        assert_integer("(5 + 10 * 2 + 15 / 3) * 2 + -10", 50);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        assert_integer("7 / 2", 3);
        assert_integer("-7 / 2", -3);
    }

    #[test]
    fn test_division_by_zero() {
        assert_runtime_error("1 / 0", "division by zero");
    }

    // ============================================================
    // Booleans and comparisons
    // ============================================================

    #[test]
    fn test_boolean_expressions() {
        assert_boolean("TRUE", true);
        assert_boolean("FALSE", false);
        assert_boolean("1 < 2", true);
        assert_boolean("1 > 2", false);
        assert_boolean("1 < 1", false);
        assert_boolean("1 > 1", false);
        assert_boolean("1 == 1", true);
        assert_boolean("1 != 1", false);
        assert_boolean("1 == 2", false);
        assert_boolean("1 != 2", true);
        assert_boolean("TRUE == TRUE", true);
        assert_boolean("FALSE == FALSE", true);
        assert_boolean("TRUE == FALSE", false);
        assert_boolean("TRUE != FALSE", true);
        assert_boolean("(1 < 2) == TRUE", true);
        assert_boolean("(1 < 2) == FALSE", false);
    }

    #[test]
    fn test_bang_operator() {
        assert_boolean("!TRUE", false);
        assert_boolean("!FALSE", true);
        assert_boolean("!5", false);
        assert_boolean("!!TRUE", true);
        assert_boolean("!!5", true);
        assert_boolean("!(if (FALSE) { 5; })", true);
    }

    #[test]
    fn test_string_equality_is_identity() {
        // Two separately constructed strings are distinct heap objects, so
        // the identity fallback reports them unequal; a value compared with
        // itself shares the handle and reports equal.
        assert_boolean(r#""a" == "a""#, false);
        assert_boolean(r#""a" != "a""#, true);
        assert_boolean(r#"let s <- "a"; s == s"#, true);
    }

    #[test]
    fn test_order_comparison_on_non_integers_fails() {
        assert_runtime_error(
            "TRUE > FALSE",
            "unknown operator: OpGreaterThan BOOLEAN BOOLEAN",
        );
    }

    // ============================================================
    // Conditionals
    // ============================================================

    #[test]
    fn test_conditionals() {
        assert_integer("if (TRUE) { 10 }", 10);
        assert_integer("if (TRUE) { 10 } else { 20 }", 10);
        assert_integer("if (FALSE) { 10 } else { 20 }", 20);
        assert_integer("if (1) { 10 }", 10);
        assert_integer("if (1 < 2) { 10 }", 10);
        assert_integer("if (1 > 2) { 10 } else { 20 }", 20);
        // Zero is truthy.
        assert_integer("if (0) { 10 } else { 20 }", 10);
    }

    #[test]
    fn test_conditionals_without_alternative_yield_null() {
        assert_value("if (1 > 2) { 10 }", Value::Null);
        assert_value("if (FALSE) { 10 }", Value::Null);
    }

    #[test]
    fn test_conditional_condition_can_be_null() {
        assert_integer("if ((if (FALSE) { 10 })) { 10 } else { 20 }", 20);
    }

    #[test]
    fn test_conditional_value_is_popped_between_statements() {
        assert_integer("if (TRUE) { 10 } else { 20 }; 3333;", 3333);
    }

    // ============================================================
    // Bindings
    // ============================================================

    #[test]
    fn test_global_let_statements() {
        assert_integer("let one <- 1; one", 1);
        assert_integer("let one <- 1; let two <- 2; one + two", 3);
        assert_integer("let one <- 1; let two <- one + one; one + two", 3);
    }

    #[test]
    fn test_bare_assignment_is_not_const_on_the_vm_path() {
        assert_integer("one <- 1; one <- one + 1; one", 2);
    }

    #[test]
    fn test_last_popped_is_the_final_expression_statement() {
        assert_integer("1; 2; 3", 3);
    }

    // ============================================================
    // Strings
    // ============================================================

    #[test]
    fn test_string_expressions() {
        assert_value(r#""typer""#, string("typer"));
        assert_value(r#""ty" + "per""#, string("typer"));
        assert_value(r#""ty" + "pe" + "R""#, string("typeR"));
    }

    #[test]
    fn test_string_operators_other_than_add_fail() {
        assert_runtime_error(r#""a" - "b""#, "unknown string operator: OpSubtract");
    }

    #[test]
    fn test_mixed_operand_types_fail() {
        assert_runtime_error(
            "5 + TRUE",
            "unsupported types for binary operation: INTEGER BOOLEAN",
        );
        assert_runtime_error(
            "TRUE + FALSE",
            "unsupported types for binary operation: BOOLEAN BOOLEAN",
        );
        assert_runtime_error("-TRUE", "unsupported type for negation: BOOLEAN");
    }

    // ============================================================
    // Arrays and indexing
    // ============================================================

    #[test]
    fn test_array_literals() {
        assert_value("[]", int_array(&[]));
        assert_value("[1, 2, 3]", int_array(&[1, 2, 3]));
        assert_value("[1 + 2, 3 * 4, 5 + 6]", int_array(&[3, 12, 11]));
    }

    #[test]
    fn test_index_expressions() {
        assert_integer("[1, 2, 3][1]", 2);
        assert_integer("[1, 2, 3][0 + 2]", 3);
        assert_integer("[[1, 1, 1]][0][0]", 1);
        assert_value("[][0]", Value::Null);
        assert_value("[1, 2, 3][99]", Value::Null);
        assert_value("[1][-1]", Value::Null);
    }

    #[test]
    fn test_index_on_unsupported_type() {
        assert_runtime_error(r#""s"[0]"#, "index operator not supported: STRING");
    }

    // ============================================================
    // Functions and calls
    // ============================================================

    #[test]
    fn test_calling_functions_without_arguments() {
        assert_integer("let fivePlusTen <- function() { 5 + 10; }; fivePlusTen();", 15);
        assert_integer(
            "let one <- function() { 1; }; let two <- function() { 2; }; one() + two()",
            3,
        );
        assert_integer(
            "let a <- function() { 1 }; \
             let b <- function() { a() + 1 }; \
             let c <- function() { b() + 1 }; \
             c();",
            3,
        );
    }

    #[test]
    fn test_functions_with_return_statement() {
        assert_integer("let earlyExit <- function() { return 99; 100; }; earlyExit();", 99);
        assert_integer(
            "let earlyExit <- function() { return 99; return 100; }; earlyExit();",
            99,
        );
    }

    #[test]
    fn test_functions_without_return_value() {
        assert_value("let noReturn <- function() { }; noReturn();", Value::Null);
        assert_value(
            "let noReturn <- function() { }; \
             let noReturnTwo <- function() { noReturn(); }; \
             noReturn(); noReturnTwo();",
            Value::Null,
        );
    }

    #[test]
    fn test_first_class_functions() {
        assert_integer(
            "let returnsOne <- function() { 1; }; \
             let returnsOneReturner <- function() { returnsOne; }; \
             returnsOneReturner()();",
            1,
        );
    }

    #[test]
    fn test_calling_functions_with_bindings() {
        assert_integer("let one <- function() { let one <- 1; one }; one();", 1);
        assert_integer(
            "let oneAndTwo <- function() { let one <- 1; let two <- 2; one + two; }; oneAndTwo();",
            3,
        );
        assert_integer(
            "let firstFoobar <- function() { let foobar <- 50; foobar; }; \
             let secondFoobar <- function() { let foobar <- 100; foobar; }; \
             firstFoobar() + secondFoobar();",
            150,
        );
        assert_integer(
            "let globalSeed <- 50; \
             let minusOne <- function() { let num <- 1; globalSeed - num; }; \
             let minusTwo <- function() { let num <- 2; globalSeed - num; }; \
             minusOne() + minusTwo();",
            97,
        );
    }

    #[test]
    fn test_calling_functions_with_arguments() {
        assert_integer("let identity <- function(a) { a; }; identity(4);", 4);
        assert_integer("let sum <- function(a, b) { a + b; }; sum(1, 2);", 3);
        assert_integer(
            "let sum <- function(a, b) { let c <- a + b; c; }; sum(1, 2) + sum(3, 4);",
            10,
        );
        assert_integer(
            "let globalNum <- 10; \
             let sum <- function(a, b) { let c <- a + b; c + globalNum; }; \
             let outer <- function() { sum(1, 2) + sum(3, 4) + globalNum; }; \
             outer() + globalNum;",
            50,
        );
    }

    #[test]
    fn test_calling_with_wrong_number_of_arguments() {
        assert_runtime_error(
            "function() { 1; }(1);",
            "wrong number of parameters: want=0, got=1",
        );
        assert_runtime_error(
            "function(a) { a; }();",
            "wrong number of parameters: want=1, got=0",
        );
        assert_runtime_error(
            "function(a, b) { a + b; }(1);",
            "wrong number of parameters: want=2, got=1",
        );
    }

    #[test]
    fn test_calling_a_non_function() {
        assert_runtime_error("1(2)", "calling a non-function and non-built-in");
    }

    #[test]
    fn test_return_at_the_top_level_fails() {
        assert_runtime_error("return 5;", "return outside of a function");
    }

    // ============================================================
    // Built-ins
    // ============================================================

    #[test]
    fn test_builtin_len() {
        assert_integer(r#"len("")"#, 0);
        assert_integer(r#"len("four")"#, 4);
        assert_integer(r#"len("hello world")"#, 11);
        assert_integer("len([1, 2, 3])", 3);
        assert_integer("len([])", 0);
    }

    #[test]
    fn test_builtin_error_values_flow_on_the_stack() {
        assert_error_value("len(1)", "parameters to `len` not supported, got=INTEGER");
        assert_error_value(
            r#"len("one", "two")"#,
            "wrong number of parameters, got=2, want=1",
        );
        assert_error_value(
            "head(1)",
            "argument to `head` must be ARRAY, got=INTEGER",
        );
        assert_error_value(
            "push(1, 1)",
            "argument to `push` must be ARRAY, got=INTEGER",
        );
    }

    #[test]
    fn test_builtin_array_functions() {
        assert_integer("head([1, 2, 3])", 1);
        assert_integer("first([1, 2, 3])", 1);
        assert_value("head([])", Value::Null);
        assert_integer("last([1, 2, 3])", 3);
        assert_value("last([])", Value::Null);
        assert_value("tail([1, 2, 3])", int_array(&[2, 3]));
        assert_value("tail([])", Value::Null);
        assert_value("push([], 1)", int_array(&[1]));
    }

    #[test]
    fn test_builtin_push_copies() {
        assert_value(
            "let arr <- [1]; push(arr, 2); arr;",
            int_array(&[1]),
        );
    }

    #[test]
    fn test_builtin_puts_returns_null() {
        assert_value(r#"puts("hello")"#, Value::Null);
    }

    // ============================================================
    // Closures
    // ============================================================

    #[test]
    fn test_closures() {
        assert_integer(
            "let newClosure <- function(a) { function() { a; }; }; \
             let closure <- newClosure(99); \
             closure();",
            99,
        );
        assert_integer(
            "let newAdder <- function(a, b) { function(c) { a + b + c }; }; \
             let adder <- newAdder(1, 2); \
             adder(8);",
            11,
        );
        assert_integer(
            "let newAdder <- function(a, b) { let c <- a + b; function(d) { c + d }; }; \
             let adder <- newAdder(1, 2); \
             adder(8);",
            11,
        );
    }

    #[test]
    fn test_curried_application() {
        assert_integer(
            "let newAdder <- function(a) { function(b) { a + b } }; newAdder(1)(2);",
            3,
        );
    }

    #[test]
    fn test_closures_over_closures() {
        assert_integer(
            "let newAdderOuter <- function(a, b) { \
                 let c <- a + b; \
                 function(d) { let e <- d + c; function(f) { e + f; }; }; \
             }; \
             let newAdderInner <- newAdderOuter(1, 2); \
             let adder <- newAdderInner(3); \
             adder(8);",
            14,
        );
        assert_integer(
            "let a <- 1; \
             let newAdderOuter <- function(b) { function(c) { function(d) { a + b + c + d }; }; }; \
             let newAdderInner <- newAdderOuter(2); \
             let adder <- newAdderInner(3); \
             adder(8);",
            14,
        );
    }

    #[test]
    fn test_capture_is_by_value_at_closure_creation() {
        // Rebinding the local after the closure is created is not observed.
        assert_integer(
            "let makeGetter <- function() { \
                 let x <- 1; \
                 let getter <- function() { x; }; \
                 let x <- 2; \
                 getter(); \
             }; \
             makeGetter();",
            1,
        );
    }

    #[test]
    fn test_recursive_closures() {
        assert_integer(
            "let countDown <- function(x) { if (0 == x) { return 0; }; countDown(x - 1); }; \
             countDown(1);",
            0,
        );
        assert_integer(
            "let countDown <- function(x) { if (0 == x) { return 0; } else { countDown(x - 1); } }; \
             countDown(1);",
            0,
        );
        assert_integer(
            "let wrapper <- function() { \
                 let countDown <- function(x) { if (0 == x) { return 0; } else { countDown(x - 1); } }; \
                 countDown(1); \
             }; \
             wrapper();",
            0,
        );
    }

    #[test]
    fn test_fibonacci() {
        assert_integer(
            "let fibonacci <- function(x) { \
                 if (0 == x) { \
                     0 \
                 } else { \
                     if (1 == x) { \
                         1 \
                     } else { \
                         fibonacci(x - 1) + fibonacci(x - 2) \
                     } \
                 } \
             }; \
             fibonacci(15);",
            610,
        );
    }

    // ============================================================
    // Resource limits
    // ============================================================

    #[test]
    fn test_frame_overflow_on_runaway_recursion() {
        assert_runtime_error(
            "let loop <- function() { loop(); }; loop();",
            "frame overflow",
        );
    }

    #[test]
    fn test_stack_overflow() {
        // Each recursive call keeps two extra values on the caller's stack
        // segment, so the value stack fills up long before the frame stack.
        assert_runtime_error(
            "let grow <- function(x) { 1 + grow(x + 1) + 1; }; grow(0);",
            "stack overflow",
        );
    }

    // ============================================================
    // REPL state
    // ============================================================

    #[test]
    fn test_globals_survive_across_runs() {
        let program = parse("let x <- 5;");
        let mut compiler = Compiler::new();
        compiler
            .compile(&program)
            .expect("compilation should succeed");

        let mut vm = VirtualMachine::new(compiler.bytecode());
        vm.run().expect("first run should succeed");

        let globals = vm.into_globals();
        let (symbol_table, constants) = compiler.into_state();

        let program = parse("x + 1");
        let mut compiler = Compiler::with_state(symbol_table, constants);
        compiler
            .compile(&program)
            .expect("compilation should succeed");

        let mut vm = VirtualMachine::with_globals(compiler.bytecode(), globals);
        vm.run().expect("second run should succeed");

        assert_eq!(vm.last_popped(), Value::Integer(6));
    }
}
