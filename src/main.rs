mod bytecode;
mod frontend;
mod lang;
mod repl;
mod runtime;

use std::time::Instant;
use std::{env, fs, path::Path, process};

use crate::bytecode::compile::Compiler;
use crate::bytecode::disasm::{bytecode_to_json, print_bytecode};
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::frontend::token_dumper::TokenDumper;
use crate::lang::node::Program;
use crate::lang::value::Value;
use crate::repl::Engine;
use crate::runtime::environment::Environment;
use crate::runtime::eval;
use crate::runtime::vm::VirtualMachine;

const BENCHMARK_PROGRAM: &str = "
fibonacci <- function(x) {
    if (0 == x) {
        0
    } else {
        if (1 == x) {
            1
        } else {
            fibonacci(x - 1) + fibonacci(x - 2)
        }
    }
}

fibonacci(25)
";

fn main() {
    let args: Vec<String> = env::args().collect();

    let tokens_only = args.contains(&"--tokens".to_string());
    let no_color = args.contains(&"--no-color".to_string());
    let pretty = args.contains(&"--pretty".to_string());
    let ast = args.contains(&"--ast".to_string());
    let ast_json = args.contains(&"--ast-json".to_string());
    let bc = args.contains(&"--bc".to_string()) || args.contains(&"--bytecode".to_string());
    let bc_json = args.contains(&"--bc-json".to_string());
    let use_evaluator = args.contains(&"--eval".to_string());
    let benchmark = args.contains(&"--benchmark".to_string());
    let want_repl = args.contains(&"--repl".to_string()) || args.contains(&"-i".to_string());
    let help = args.contains(&"--help".to_string()) || args.contains(&"-h".to_string());

    if help {
        print_usage();

        return;
    }

    let engine = if use_evaluator {
        Engine::Evaluator
    } else {
        Engine::VirtualMachine
    };

    if benchmark {
        run_benchmark(engine);

        return;
    }

    // first non-flag argument is the filename
    let filename = args.iter().skip(1).find(|a| !a.starts_with('-'));

    match filename {
        Some(filename) => {
            ensure_extension(filename);
            match fs::read_to_string(filename) {
                Ok(source) => {
                    if tokens_only {
                        dump_tokens(&source, no_color, pretty);
                    } else {
                        run_program(&source, engine, ast, ast_json, bc, bc_json);
                    }
                }
                Err(error) => {
                    eprintln!("Failed to read '{}': {}", filename, error);
                    process::exit(1);
                }
            }
        }
        None => {
            if args.len() == 1 || want_repl || use_evaluator {
                greet();
                repl::start(engine);
            } else {
                print_usage();
            }
        }
    }
}

fn greet() {
    let user = env::var("USER").unwrap_or_else(|_| "there".to_string());

    println!("Hello {}! This is the TypeR programming language!", user);
    println!("Feel free to type in commands");
}

fn ensure_extension(filename: &str) {
    let path = Path::new(filename);
    if path.extension().and_then(|e| e.to_str()) != Some("tr") {
        eprintln!("Error: expected a .tr file, got {}", filename);
        process::exit(1);
    }
}

fn print_usage() {
    println!("TypeR - An Expression-Oriented Functional Language");
    println!();
    println!("Usage:");
    println!("  typer                     Start interactive REPL");
    println!("  typer <file.tr>           Compile and run a program on the VM");
    println!("  typer --eval <file.tr>    Run a program on the tree-walking evaluator");
    println!("  typer --repl, -i          Start interactive REPL explicitly");
    println!("  typer --tokens <file>     Show tokens only (--no-color, --pretty)");
    println!("  typer --ast <file.tr>     Show the parsed AST");
    println!("  typer --ast-json <file>   Show the parsed AST as JSON");
    println!("  typer --bc <file.tr>      Show bytecode disassembly, then run");
    println!("  typer --bc-json <file>    Show bytecode as JSON");
    println!("  typer --benchmark         Time fibonacci(25) on the chosen engine");
    println!("  typer --help, -h          Show this help");
}

fn parse_source(source: &str) -> Program {
    let mut lexer = Lexer::new(source);
    let tokens = match lexer.tokenize() {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("Lexer error: {}", error);
            process::exit(1);
        }
    };

    let mut parser = Parser::new(tokens);
    match parser.parse_program() {
        Ok(program) => program,
        Err(error) => {
            eprintln!("Parse error: {}", error);
            process::exit(1);
        }
    }
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    let mut lexer = Lexer::new(source);

    match lexer.tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();

            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }

            dumper.dump(&tokens);
        }
        Err(error) => {
            eprintln!("Lexer error: {}", error);
            process::exit(1);
        }
    }
}

fn run_program(source: &str, engine: Engine, ast: bool, ast_json: bool, bc: bool, bc_json: bool) {
    let program = parse_source(source);

    // AST inspection modes (do not depend on the engine)
    if ast {
        println!("{:#?}", program);

        return;
    }

    if ast_json {
        match serde_json::to_string_pretty(&program) {
            Ok(rendered) => println!("{}", rendered),
            Err(error) => {
                eprintln!("Failed to render AST: {}", error);
                process::exit(1);
            }
        }

        return;
    }

    if engine == Engine::Evaluator {
        run_program_eval(&program);

        return;
    }

    run_program_vm(&program, bc, bc_json);
}

fn run_program_vm(program: &Program, bc: bool, bc_json: bool) {
    let mut compiler = Compiler::new();

    if let Err(error) = compiler.compile(program) {
        eprintln!("Compile error: {}", error);
        process::exit(1);
    }

    let bytecode = compiler.bytecode();

    if bc_json {
        match serde_json::to_string_pretty(&bytecode_to_json(&bytecode)) {
            Ok(rendered) => println!("{}", rendered),
            Err(error) => {
                eprintln!("Failed to render bytecode: {}", error);
                process::exit(1);
            }
        }

        return;
    }

    if bc {
        print_bytecode(&bytecode);
    }

    let mut vm = VirtualMachine::new(bytecode);

    if let Err(error) = vm.run() {
        eprintln!("Runtime error: {}", error.message);
        process::exit(1);
    }
}

fn run_program_eval(program: &Program) {
    let env = Environment::new();
    let result = eval::eval_program(program, &env);

    if let Value::Error(message) = result {
        eprintln!("Runtime error: {}", message);
        process::exit(1);
    }
}

fn run_benchmark(engine: Engine) {
    let program = parse_source(BENCHMARK_PROGRAM);

    let (label, result, duration) = match engine {
        Engine::VirtualMachine => {
            let mut compiler = Compiler::new();

            if let Err(error) = compiler.compile(&program) {
                eprintln!("Compile error: {}", error);
                process::exit(1);
            }

            let mut vm = VirtualMachine::new(compiler.bytecode());
            let start = Instant::now();

            if let Err(error) = vm.run() {
                eprintln!("Runtime error: {}", error.message);
                process::exit(1);
            }

            ("vm", vm.last_popped(), start.elapsed())
        }
        Engine::Evaluator => {
            let env = Environment::new();
            let start = Instant::now();
            let result = eval::eval_program(&program, &env);

            ("eval", result, start.elapsed())
        }
    };

    println!(
        "engine={}, result={}, duration={:?}",
        label, result, duration
    );
}
