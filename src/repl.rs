use std::mem;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::bytecode::compile::Compiler;
use crate::bytecode::symbol_table::SymbolTable;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::lang::builtins::BUILTINS;
use crate::lang::node::Program;
use crate::lang::value::Value;
use crate::runtime::environment::Environment;
use crate::runtime::eval;
use crate::runtime::vm::{VirtualMachine, GLOBAL_SIZE};

const PROMPT: &str = "λ ";

/// Which back-end executes REPL input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    VirtualMachine,
    Evaluator,
}

/// Runs the interactive loop until EOF or Ctrl-C.
pub fn start(engine: Engine) {
    match engine {
        Engine::VirtualMachine => run_vm_loop(),
        Engine::Evaluator => run_eval_loop(),
    }
}

fn read_program(line: &str) -> Option<Program> {
    let mut lexer = Lexer::new(line);
    let tokens = match lexer.tokenize() {
        Ok(tokens) => tokens,
        Err(error) => {
            println!("\t{}", error);

            return None;
        }
    };

    match Parser::new(tokens).parse_program() {
        Ok(program) => Some(program),
        Err(error) => {
            println!("\t{}", error);

            None
        }
    }
}

/// The default REPL: compiles each line and runs it on the VM, carrying the
/// symbol table, constants pool and global store across lines.
fn run_vm_loop() {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("could not initialize the line editor: {}", error);

            return;
        }
    };

    let mut symbol_table = SymbolTable::new();
    for (index, builtin) in BUILTINS.iter().enumerate() {
        symbol_table.define_builtin(index, builtin.name);
    }

    let mut constants: Vec<Value> = Vec::new();
    let mut globals = vec![Value::Null; GLOBAL_SIZE];

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("readline error: {}", error);

                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        let program = match read_program(&line) {
            Some(program) => program,
            None => continue,
        };

        let mut compiler =
            Compiler::with_state(mem::take(&mut symbol_table), mem::take(&mut constants));

        let compiled = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        (symbol_table, constants) = compiler.into_state();

        if let Err(error) = compiled {
            println!("Woops: Compilation failed:\n {}", error);

            continue;
        }

        let mut vm = VirtualMachine::with_globals(bytecode, mem::take(&mut globals));

        match vm.run() {
            Ok(()) => println!("{}", vm.last_popped()),
            Err(error) => println!("Woops: executing bytecode fails:\n {}", error),
        }

        globals = vm.into_globals();
    }
}

/// The `--eval` REPL: tree-walking evaluator with a persistent environment.
fn run_eval_loop() {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("could not initialize the line editor: {}", error);

            return;
        }
    };

    let env = Environment::new();

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("readline error: {}", error);

                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        if let Some(program) = read_program(&line) {
            let result = eval::eval_program(&program, &env);
            println!("{}", result);
        }
    }
}
