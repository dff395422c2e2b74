//! Native functions exposed to Monkey programs.
//!
//! Arity and message text are grounded on `examples/original_source/src/builtins.c`
//! (`len`, `first`, `last`, `rest`, `push`, `puts`, `type`); the ordering here
//! must match `monkey_compiler::BUILTIN_NAMES` exactly, since `OPGETBUILTIN idx`
//! is resolved against both tables independently.

use std::rc::Rc;

use monkey_core::{Builtin, Object};
use monkey_compiler::BUILTIN_NAMES;

fn wrong_arity(got: usize, want: &str) -> String {
    format!("wrong number of arguments. got={got}, want={want}")
}

fn len(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), "1"));
    }
    let result = match args[0].as_ref() {
        Object::String(s) => s.len() as i64,
        Object::Array(elems) => elems.len() as i64,
        Object::Hash(pairs) => pairs.len() as i64,
        other => return Err(format!("argument to `len` not supported, got {}", other.type_name())),
    };
    Ok(Rc::new(Object::Integer(result)))
}

fn first(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), "1"));
    }
    let Object::Array(elems) = args[0].as_ref() else {
        return Err(format!(
            "argument to `first` must be ARRAY, got {}",
            args[0].type_name()
        ));
    };
    Ok(elems.first().cloned().unwrap_or_else(|| Rc::new(Object::Null)))
}

fn last(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), "1"));
    }
    let Object::Array(elems) = args[0].as_ref() else {
        return Err(format!(
            "argument to `last` must be ARRAY, got {}",
            args[0].type_name()
        ));
    };
    Ok(elems.last().cloned().unwrap_or_else(|| Rc::new(Object::Null)))
}

fn rest(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), "1"));
    }
    let Object::Array(elems) = args[0].as_ref() else {
        return Err(format!(
            "argument to `rest` must be ARRAY, got {}",
            args[0].type_name()
        ));
    };
    if elems.is_empty() {
        return Ok(Rc::new(Object::Null));
    }
    Ok(Rc::new(Object::Array(elems[1..].to_vec())))
}

fn push(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 2 {
        return Err(wrong_arity(args.len(), "2"));
    }
    let Object::Array(elems) = args[0].as_ref() else {
        return Err(format!(
            "argument to `push` must be ARRAY, got {}",
            args[0].type_name()
        ));
    };
    let mut new_elems = elems.clone();
    new_elems.push(args[1].clone());
    Ok(Rc::new(Object::Array(new_elems)))
}

fn puts(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    for arg in args {
        println!("{arg}");
    }
    Ok(Rc::new(Object::Null))
}

fn type_of(args: &[Rc<Object>]) -> Result<Rc<Object>, String> {
    if args.len() != 1 {
        return Err(wrong_arity(args.len(), "1"));
    }
    Ok(Rc::new(Object::String(args[0].type_name().to_string())))
}

/// The builtin table, in `BUILTIN_NAMES` order so `OPGETBUILTIN idx` indexes
/// the same function the compiler resolved the name to.
pub fn table() -> Vec<Builtin> {
    let funcs: [fn(&[Rc<Object>]) -> Result<Rc<Object>, String>; 7] =
        [len, first, last, rest, push, puts, type_of];
    BUILTIN_NAMES
        .iter()
        .zip(funcs)
        .map(|(&name, func)| Builtin { name, func })
        .collect()
}
