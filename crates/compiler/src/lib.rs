//! Monkey compiler: Pratt parser, symbol table, and AST-to-bytecode compiler.
//!
//! Depends only on `monkey-core` for tokens/AST/object model and the
//! `Instructions`/`Opcode` vocabulary; produces `Bytecode` that `monkey-vm`
//! executes.

pub mod compiler;
pub mod parser;
pub mod symbol_table;

pub use compiler::{Bytecode, CompileError, CompileErrorCode, Compiler, BUILTIN_NAMES};
pub use parser::{Parser, ParserErrors};
pub use symbol_table::{Symbol, SymbolScope, SymbolTable};
