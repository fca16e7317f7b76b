pub mod environment;
pub mod eval;
pub mod runtime_error;
pub mod vm;

pub use runtime_error::RuntimeError;
pub use vm::VirtualMachine;
