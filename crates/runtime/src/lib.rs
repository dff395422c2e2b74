//! Monkey virtual machine: call-frame stack machine and builtin table.
//!
//! Depends on `monkey-core` for the object model and `monkey-compiler` for
//! `Bytecode`/`Instructions`/`Opcode` — the VM never parses or compiles,
//! only executes what it's handed.

pub mod builtins;
pub mod frame;
pub mod vm;

pub use frame::Frame;
pub use vm::{Vm, VmError, VmErrorCode};
