use serde_json::json;

use crate::bytecode::compile::Bytecode;
use crate::bytecode::op::Instructions;
use crate::lang::value::Value;

/// Print the disassembly of a compiled program: the top-level instruction
/// stream first, then every constant, with compiled functions expanded.
pub fn print_bytecode(bytecode: &Bytecode) {
    println!("=== INSTRUCTIONS ===");
    print!("{}", bytecode.instructions);
    println!();

    println!("=== CONSTANTS ({}) ===", bytecode.constants.len());

    for (index, constant) in bytecode.constants.iter().enumerate() {
        match constant {
            Value::CompiledFunction(function) => {
                println!(
                    "{:04}: CompiledFunction (locals={}, parameters={})",
                    index, function.num_locals, function.num_parameters
                );
                print_indented(&function.instructions);
            }
            other => println!("{:04}: {}", index, other),
        }
    }
}

fn print_indented(instructions: &Instructions) {
    for line in instructions.to_string().lines() {
        println!("      {}", line);
    }
}

/// Renders a compiled program as JSON for the `--bc-json` CLI mode. The
/// constants pool only ever holds integers, strings and compiled functions,
/// so this covers the whole bytecode surface.
pub fn bytecode_to_json(bytecode: &Bytecode) -> serde_json::Value {
    json!({
        "instructions": listing(&bytecode.instructions),
        "constants": bytecode
            .constants
            .iter()
            .map(constant_to_json)
            .collect::<Vec<_>>(),
    })
}

fn listing(instructions: &Instructions) -> Vec<String> {
    instructions
        .to_string()
        .lines()
        .map(|line| line.to_string())
        .collect()
}

fn constant_to_json(constant: &Value) -> serde_json::Value {
    match constant {
        Value::Integer(value) => json!({ "type": "INTEGER", "value": value }),
        Value::String(value) => json!({ "type": "STRING", "value": value.as_str() }),
        Value::CompiledFunction(function) => json!({
            "type": "COMPILED_FUNCTION_OBJECT",
            "num_locals": function.num_locals,
            "num_parameters": function.num_parameters,
            "instructions": listing(&function.instructions),
        }),
        other => json!({ "type": other.type_name(), "value": other.to_string() }),
    }
}
