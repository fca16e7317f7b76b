use std::mem;
use std::rc::Rc;

use crate::bytecode::compile_error::CompileError;
use crate::bytecode::op::{make, Instructions, Op};
use crate::bytecode::symbol_table::{Symbol, SymbolScope, SymbolTable};
use crate::lang::builtins::BUILTINS;
use crate::lang::node::{BlockStatement, Expression, Program, Statement};
use crate::lang::value::{CompiledFunction, Value};

/// Operand emitted for a forward jump before its target is known.
const JUMP_PLACEHOLDER: usize = 0xFFFF;

/// The compiler's output: top-level instructions plus the constants pool.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Op,
    position: usize,
}

/// Per-function compilation state. The records of the last two emitted
/// instructions are what the peephole rewrites operate on.
#[derive(Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// Single-pass AST-to-bytecode compiler.
///
/// One `CompilationScope` per function being compiled; the bottom scope is
/// the top-level program. The symbol table nests in step with the scopes.
pub struct Compiler {
    constants: Vec<Value>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();

        for (index, builtin) in BUILTINS.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }

        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Continues an interactive session: reuses the symbol table and
    /// constants accumulated by previous lines.
    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Value>) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        for statement in &program.statements {
            self.compile_statement(statement)?;
        }

        Ok(())
    }

    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scopes[0].instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Hands the session state back to the REPL.
    pub fn into_state(self) -> (SymbolTable, Vec<Value>) {
        (self.symbol_table, self.constants)
    }

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            // `let` and the bare `<-` binding compile identically. The name
            // is defined before its value is compiled so that a function
            // literal on the right-hand side can refer to itself.
            Statement::Let { name, value } | Statement::Const { name, value } => {
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;

                match symbol.scope {
                    SymbolScope::Global => self.emit(Op::SetGlobal, &[symbol.index]),
                    _ => self.emit(Op::SetLocal, &[symbol.index]),
                };
            }

            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Op::ReturnValue, &[]);
            }

            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Op::Pop, &[]);
            }
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        for statement in &block.statements {
            self.compile_statement(statement)?;
        }

        Ok(())
    }

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Integer(value) => {
                let index = self.add_constant(Value::Integer(*value));
                self.emit(Op::Constant, &[index]);
            }

            Expression::String(value) => {
                let index = self.add_constant(Value::String(Rc::new(value.clone())));
                self.emit(Op::Constant, &[index]);
            }

            Expression::Boolean(value) => {
                if *value {
                    self.emit(Op::True, &[]);
                } else {
                    self.emit(Op::False, &[]);
                }
            }

            Expression::Identifier(name) => match self.symbol_table.resolve(name) {
                Some(symbol) => self.load_symbol(&symbol),
                None => return Err(CompileError::undefined_variable(name)),
            },

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;

                match operator.as_str() {
                    "!" => self.emit(Op::Bang, &[]),
                    "-" => self.emit(Op::Minus, &[]),
                    _ => return Err(CompileError::unknown_operator(operator)),
                };
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => {
                // `<` has no opcode of its own: swap the operands and reuse
                // OpGreaterThan.
                if operator == "<" {
                    self.compile_expression(right)?;
                    self.compile_expression(left)?;
                    self.emit(Op::GreaterThan, &[]);

                    return Ok(());
                }

                self.compile_expression(left)?;
                self.compile_expression(right)?;

                match operator.as_str() {
                    "+" => self.emit(Op::Add, &[]),
                    "-" => self.emit(Op::Subtract, &[]),
                    "*" => self.emit(Op::Multiply, &[]),
                    "/" => self.emit(Op::Divide, &[]),
                    ">" => self.emit(Op::GreaterThan, &[]),
                    "==" => self.emit(Op::Equal, &[]),
                    "!=" => self.emit(Op::NotEqual, &[]),
                    _ => return Err(CompileError::unknown_operator(operator)),
                };
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                self.compile_expression(condition)?;

                let jump_not_truthy = self.emit(Op::JumpNotTruthy, &[JUMP_PLACEHOLDER]);

                self.compile_block(consequence)?;

                // The arm is an expression; its value must survive the
                // statement-level Pop.
                if self.last_instruction_is(Op::Pop) {
                    self.remove_last_pop();
                }

                let jump = self.emit(Op::Jump, &[JUMP_PLACEHOLDER]);

                let after_consequence = self.current_instructions().len();
                self.change_operand(jump_not_truthy, after_consequence);

                match alternative {
                    None => {
                        self.emit(Op::Null, &[]);
                    }
                    Some(alternative) => {
                        self.compile_block(alternative)?;

                        if self.last_instruction_is(Op::Pop) {
                            self.remove_last_pop();
                        }
                    }
                }

                let after_alternative = self.current_instructions().len();
                self.change_operand(jump, after_alternative);
            }

            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }

                self.emit(Op::Array, &[elements.len()]);
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Op::Index, &[]);
            }

            Expression::Function {
                name,
                parameters,
                body,
            } => {
                self.enter_scope();

                if let Some(name) = name {
                    self.symbol_table.define_function_name(name);
                }

                for parameter in parameters {
                    self.symbol_table.define(parameter);
                }

                self.compile_block(body)?;

                // An implicit return of the last expression, or a bare
                // Return for an empty body.
                if self.last_instruction_is(Op::Pop) {
                    self.replace_last_pop_with_return();
                }
                if !self.last_instruction_is(Op::ReturnValue) {
                    self.emit(Op::Return, &[]);
                }

                let free_symbols = self.symbol_table.free_symbols.clone();
                let num_locals = self.symbol_table.num_definitions;
                let instructions = self.leave_scope();

                // The capture loads run in the enclosing scope, pushing the
                // values OpClosure packs into the closure.
                for symbol in &free_symbols {
                    self.load_symbol(symbol);
                }

                let function = CompiledFunction {
                    instructions,
                    num_locals,
                    num_parameters: parameters.len(),
                };
                let index = self.add_constant(Value::CompiledFunction(Rc::new(function)));

                self.emit(Op::Closure, &[index, free_symbols.len()]);
            }

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;

                for argument in arguments {
                    self.compile_expression(argument)?;
                }

                self.emit(Op::Call, &[arguments.len()]);
            }
        }

        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) {
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Op::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, &[symbol.index]),
            SymbolScope::FreeVariable => self.emit(Op::GetFreeVariable, &[symbol.index]),
            SymbolScope::Function => self.emit(Op::CurrentClosure, &[]),
        };
    }

    /// Appends `value` to the constants pool and returns its index. Equal
    /// literals are deliberately not deduplicated.
    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Op, operands: &[usize]) -> usize {
        let instruction = make(op, operands);
        let position = self.current_scope_mut().instructions.append(&instruction);
        self.set_last_instruction(op, position);

        position
    }

    fn set_last_instruction(&mut self, opcode: Op, position: usize) {
        let scope = self.current_scope_mut();
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction { opcode, position });
    }

    fn last_instruction_is(&self, op: Op) -> bool {
        matches!(
            self.current_scope().last_instruction,
            Some(EmittedInstruction { opcode, .. }) if opcode == op
        )
    }

    /// Drops the trailing Pop so a block yields its last expression.
    fn remove_last_pop(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope
            .last_instruction
            .expect("remove_last_pop requires an emitted instruction");

        scope.instructions.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    /// Rewrites a trailing Pop into ReturnValue in place. Both opcodes are
    /// a single byte, so positions stay valid.
    fn replace_last_pop_with_return(&mut self) {
        let scope = self.current_scope_mut();
        let last = scope
            .last_instruction
            .expect("replace_last_pop_with_return requires an emitted instruction");

        scope
            .instructions
            .replace_at(last.position, &make(Op::ReturnValue, &[]));

        scope.last_instruction = Some(EmittedInstruction {
            opcode: Op::ReturnValue,
            position: last.position,
        });
    }

    /// Re-encodes the instruction at `position` with a new operand; used to
    /// patch jump placeholders once the target is known.
    fn change_operand(&mut self, position: usize, operand: usize) {
        let op = Op::from_byte(self.current_instructions().bytes()[position])
            .expect("patching an instruction that was emitted by this compiler");

        self.current_scope_mut()
            .instructions
            .replace_at(position, &make(op, &[operand]));
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());

        let outer = mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self
            .scopes
            .pop()
            .expect("leave_scope is only called after enter_scope");

        let table = mem::take(&mut self.symbol_table);
        self.symbol_table = table
            .into_outer()
            .expect("leave_scope is only called after enter_scope");

        scope.instructions
    }

    fn current_scope(&self) -> &CompilationScope {
        self.scopes.last().expect("at least the top-level scope")
    }

    fn current_scope_mut(&mut self) -> &mut CompilationScope {
        self.scopes.last_mut().expect("at least the top-level scope")
    }

    fn current_instructions(&self) -> &Instructions {
        &self.current_scope().instructions
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}
