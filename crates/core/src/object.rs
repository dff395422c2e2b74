//! Runtime value model shared by the compiler's constant pool and the VM.
//!
//! Mirrors the shape of `navicore-cem3`'s `runtime::value::Value`: heap
//! variants are `Rc`-wrapped for O(1) cloning, and a restricted `HashKey`
//! subset (mirroring that crate's `MapKey`) is the only thing allowed as a
//! hash key. This VM is single-threaded, so `Rc` replaces the teacher's
//! `Arc` and there is no `Send`/`Sync` story to maintain.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::opcode::Instructions;

/// A value that may be used as a `Hash` key: integers, booleans and
/// strings only (spec.md §3). Anything else fails to convert and the VM
/// raises `UnhashableKey`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl HashKey {
    pub fn from_object(obj: &Object) -> Option<HashKey> {
        match obj {
            Object::Integer(n) => Some(HashKey::Integer(*n)),
            Object::Boolean(b) => Some(HashKey::Boolean(*b)),
            Object::String(s) => Some(HashKey::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for HashKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashKey::Integer(n) => write!(f, "{n}"),
            HashKey::Boolean(b) => write!(f, "{b}"),
            HashKey::String(s) => write!(f, "{s}"),
        }
    }
}

/// An immutable code object produced by the compiler: a function body's
/// instructions plus enough metadata for the VM to set up a call frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_args: usize,
}

/// A runtime pairing of a compiled function with its captured free
/// variables, constructed by `OPCLOSURE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Rc<Object>>,
}

/// A native function. Implementations live in `monkey-vm`; only the
/// signature is known here so the object model stays dependency-free.
#[derive(Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub func: fn(&[Rc<Object>]) -> Result<Rc<Object>, String>,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Builtin({})", self.name)
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && std::ptr::eq(self.func as *const (), other.func as *const ())
    }
}

/// A runtime value. Note there is no `ReturnValue`/`Function{env}` variant:
/// those belong to the tree-walking evaluator, which this implementation
/// omits (spec.md §1 permits this; the VM unwinds calls via `OPRETURNVALUE`
/// directly instead of a sentinel wrapper value).
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Integer(i64),
    Boolean(bool),
    Null,
    String(String),
    Array(Vec<Rc<Object>>),
    Hash(HashMap<HashKey, Rc<Object>>),
    Error(String),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(Builtin),
}

impl Object {
    /// Truthiness for `OPJMPFALSE`/`OPBANG`: everything but `false` and
    /// `null` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Object::Boolean(false) | Object::Null)
    }

    /// The name `type()` reports for this value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Integer(_) => "INTEGER",
            Object::Boolean(_) => "BOOLEAN",
            Object::Null => "NULL",
            Object::String(_) => "STRING",
            Object::Array(_) => "ARRAY",
            Object::Hash(_) => "HASH",
            Object::Error(_) => "ERROR",
            Object::CompiledFunction(_) => "COMPILED_FUNCTION",
            Object::Closure(_) => "FUNCTION",
            Object::Builtin(_) => "BUILTIN",
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Object::Integer(n) => write!(f, "{n}"),
            Object::Boolean(b) => write!(f, "{b}"),
            Object::Null => write!(f, "null"),
            Object::String(s) => write!(f, "{s}"),
            Object::Array(elements) => {
                let rendered: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
            Object::Hash(pairs) => {
                let rendered: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Object::Error(msg) => write!(f, "{msg}"),
            Object::CompiledFunction(_) => write!(f, "CompiledFunction[...]"),
            Object::Closure(_) => write!(f, "Closure[...]"),
            Object::Builtin(_) => write!(f, "builtin function"),
        }
    }
}
