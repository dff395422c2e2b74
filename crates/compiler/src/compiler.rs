//! AST → bytecode compiler.
//!
//! Structured as a stack of `CompilationScope`s (one per function body plus
//! the top level), matching the teacher's codegen module's scope-stack/
//! back-patch pattern (`codegen/state.rs`, `codegen/control_flow.rs`) but
//! targeting raw byte emission instead of LLVM IR text.

use std::fmt;
use std::rc::Rc;

use monkey_core::{Block, Expression, Identifier, Instructions, Object, Opcode, Program, Statement};

use crate::symbol_table::{SymbolScope, SymbolTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorCode {
    None,
    UnknownOperator,
    UndefinedVariable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub code: CompileErrorCode,
    pub message: String,
}

impl CompileError {
    fn unknown_operator(op: &str) -> CompileError {
        CompileError {
            code: CompileErrorCode::UnknownOperator,
            message: format!("unknown operator: {op}"),
        }
    }

    fn undefined_variable(name: &str) -> CompileError {
        CompileError {
            code: CompileErrorCode::UndefinedVariable,
            message: format!("undefined variable: {name}"),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

/// The names registered as `Builtin` symbols, in the fixed order the VM's
/// builtin table is indexed by. Both `monkey-compiler` and `monkey-vm`
/// import this so `OPGETBUILTIN idx` agrees on the same index across both
/// crates without either depending on the other's builtin implementations.
pub const BUILTIN_NAMES: &[&str] = &["len", "first", "last", "rest", "push", "puts", "type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last_instruction: Option<EmittedInstruction>,
    previous_instruction: Option<EmittedInstruction>,
}

/// The output of a successful compilation: the entry-point instructions plus
/// the constant pool they (and any nested `CompiledFunction`s) reference.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Rc<Object>>,
}

pub struct Compiler {
    constants: Vec<Rc<Object>>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Compiler {
    pub fn new() -> Self {
        let mut symbol_table = SymbolTable::new();
        for (i, name) in BUILTIN_NAMES.iter().enumerate() {
            symbol_table.define_builtin(i, name);
        }
        Compiler {
            constants: Vec::new(),
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Resume compiling into a preexisting constant pool and symbol table,
    /// so a REPL session can keep definitions visible across lines.
    pub fn new_with_state(constants: Vec<Rc<Object>>, symbol_table: SymbolTable) -> Self {
        Compiler {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn into_state(self) -> (Vec<Rc<Object>>, SymbolTable) {
        (self.constants, self.symbol_table)
    }

    pub fn compile_program(&mut self, program: &Program) -> Result<Bytecode, CompileError> {
        for stmt in &program.statements {
            self.compile_statement(stmt)?;
        }
        Ok(Bytecode {
            instructions: self.current_instructions().clone(),
            constants: self.constants.clone(),
        })
    }

    fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        for stmt in &block.statements {
            self.compile_statement(stmt)?;
        }
        Ok(())
    }

    fn compile_statement(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Let { name, value } => {
                // Only a function literal needs its own name defined before
                // the value is compiled (so a recursive call inside the body
                // can resolve it); the literal itself binds that name as
                // `FunctionSelf` inside its own scope (see
                // `compile_function_literal`), which shadows this binding
                // locally. Every other value must compile against the *old*
                // binding of `name`, so that `let x = x - 1;` reads the prior
                // `x` instead of the not-yet-set slot it is about to
                // allocate.
                let symbol = if matches!(value, Expression::FunctionLiteral { .. }) {
                    let symbol = self.symbol_table.define(&name.name);
                    self.compile_expression(value)?;
                    symbol
                } else {
                    self.compile_expression(value)?;
                    self.symbol_table.define(&name.name)
                };
                match symbol.scope {
                    SymbolScope::Global => {
                        self.emit(Opcode::SetGlobal, &[symbol.index]);
                    }
                    SymbolScope::Local => {
                        self.emit(Opcode::SetLocal, &[symbol.index]);
                    }
                    _ => unreachable!("let only ever defines Global or Local bindings"),
                }
                Ok(())
            }
            Statement::Return { value } => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[]);
                Ok(())
            }
            Statement::Expression(expr) => {
                self.compile_expression(expr)?;
                self.emit(Opcode::Pop, &[]);
                Ok(())
            }
            Statement::Block(block) => self.compile_block(block),
        }
    }

    fn compile_expression(&mut self, expr: &Expression) -> Result<(), CompileError> {
        match expr {
            Expression::IntegerLiteral(value) => {
                let idx = self.add_constant(Object::Integer(*value));
                self.emit(Opcode::Constant, &[idx]);
                Ok(())
            }
            Expression::StringLiteral(value) => {
                let idx = self.add_constant(Object::String(value.clone()));
                self.emit(Opcode::Constant, &[idx]);
                Ok(())
            }
            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[]);
                Ok(())
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[]);
                Ok(())
            }
            Expression::Identifier(ident) => self.compile_identifier(ident),
            Expression::Prefix { operator, right } => self.compile_prefix(operator, right),
            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(operator, left, right),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref()),
            Expression::While { condition, body } => self.compile_while(condition, body),
            Expression::ArrayLiteral(elements) => {
                for elem in elements {
                    self.compile_expression(elem)?;
                }
                self.emit(Opcode::Array, &[elements.len()]);
                Ok(())
            }
            Expression::HashLiteral(pairs) => {
                for (key, value) in pairs {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2]);
                Ok(())
            }
            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::Index, &[]);
                Ok(())
            }
            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for arg in arguments {
                    self.compile_expression(arg)?;
                }
                self.emit(Opcode::Call, &[arguments.len()]);
                Ok(())
            }
            Expression::FunctionLiteral {
                parameters,
                body,
                name,
            } => self.compile_function_literal(parameters, body, name.as_deref()),
        }
    }

    fn compile_identifier(&mut self, ident: &Identifier) -> Result<(), CompileError> {
        let symbol = self
            .symbol_table
            .resolve(&ident.name)
            .ok_or_else(|| CompileError::undefined_variable(&ident.name))?;
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
            SymbolScope::FunctionSelf => self.emit(Opcode::CurrentClosure, &[]),
        };
        Ok(())
    }

    fn compile_prefix(&mut self, operator: &str, right: &Expression) -> Result<(), CompileError> {
        self.compile_expression(right)?;
        match operator {
            "-" => {
                self.emit(Opcode::Minus, &[]);
            }
            "!" => {
                self.emit(Opcode::Bang, &[]);
            }
            other => return Err(CompileError::unknown_operator(other)),
        }
        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        if operator == "&&" || operator == "||" {
            return self.compile_logical(operator, left, right);
        }
        if operator == "<" {
            // a < b compiles as b > a.
            self.compile_expression(right)?;
            self.compile_expression(left)?;
            self.emit(Opcode::GreaterThan, &[]);
            return Ok(());
        }
        self.compile_expression(left)?;
        self.compile_expression(right)?;
        match operator {
            "+" => {
                self.emit(Opcode::Add, &[]);
            }
            "-" => {
                self.emit(Opcode::Sub, &[]);
            }
            "*" => {
                self.emit(Opcode::Mul, &[]);
            }
            "/" => {
                self.emit(Opcode::Div, &[]);
            }
            "%" => {
                self.emit(Opcode::Mod, &[]);
            }
            "==" => {
                self.emit(Opcode::Equal, &[]);
            }
            "!=" => {
                self.emit(Opcode::NotEqual, &[]);
            }
            ">" => {
                self.emit(Opcode::GreaterThan, &[]);
            }
            other => return Err(CompileError::unknown_operator(other)),
        }
        Ok(())
    }

    /// Short-circuit without a dedicated dup opcode: `left` is evaluated
    /// exactly once and consumed by `OPJMPFALSE`, then the taken branch
    /// pushes a plain boolean for the short-circuited case or `right`'s
    /// value otherwise.
    fn compile_logical(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        self.compile_expression(left)?;
        let jump_false_pos = self.emit(Opcode::JmpFalse, &[9999]);

        if operator == "&&" {
            self.compile_expression(right)?;
            let jump_over_false = self.emit(Opcode::Jmp, &[9999]);
            let false_pos = self.current_instructions().len();
            self.change_operand(jump_false_pos, false_pos);
            self.emit(Opcode::False, &[]);
            let after = self.current_instructions().len();
            self.change_operand(jump_over_false, after);
        } else {
            self.emit(Opcode::True, &[]);
            let jump_over_right = self.emit(Opcode::Jmp, &[9999]);
            let eval_right_pos = self.current_instructions().len();
            self.change_operand(jump_false_pos, eval_right_pos);
            self.compile_expression(right)?;
            let after = self.current_instructions().len();
            self.change_operand(jump_over_right, after);
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_false_pos = self.emit(Opcode::JmpFalse, &[9999]);

        self.compile_block(consequence)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        }

        let jump_pos = self.emit(Opcode::Jmp, &[9999]);
        let after_consequence = self.current_instructions().len();
        self.change_operand(jump_false_pos, after_consequence);

        match alternative {
            Some(alt) => {
                self.compile_block(alt)?;
                if self.last_instruction_is(Opcode::Pop) {
                    self.remove_last_pop();
                }
            }
            None => {
                self.emit(Opcode::Null, &[]);
            }
        }

        let after_alternative = self.current_instructions().len();
        self.change_operand(jump_pos, after_alternative);
        Ok(())
    }

    /// A while loop leaves exactly one value on the stack: `null` if the
    /// condition fails before the body ever runs, otherwise the last body
    /// value. A slot for that result is pushed before the loop and swapped
    /// out on every iteration, so the invariant "exactly one result value
    /// sits under the condition at `loop_start`" holds on every pass.
    fn compile_while(&mut self, condition: &Expression, body: &Block) -> Result<(), CompileError> {
        self.emit(Opcode::Null, &[]);
        let loop_start = self.current_instructions().len();
        self.compile_expression(condition)?;
        let jump_false_pos = self.emit(Opcode::JmpFalse, &[9999]);

        self.emit(Opcode::Pop, &[]);
        self.compile_block(body)?;
        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(Opcode::Null, &[]);
        }
        self.emit(Opcode::Jmp, &[loop_start]);

        let after_loop = self.current_instructions().len();
        self.change_operand(jump_false_pos, after_loop);
        Ok(())
    }

    fn compile_function_literal(
        &mut self,
        parameters: &[Identifier],
        body: &Block,
        name: Option<&str>,
    ) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbol_table.define_function_self(name);
        }
        for param in parameters {
            self.symbol_table.define(&param.name);
        }

        self.compile_block(body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if self.scopes.last().unwrap().last_instruction.is_none()
            || !(self.last_instruction_is(Opcode::ReturnValue) || self.last_instruction_is(Opcode::Return))
        {
            self.emit(Opcode::Return, &[]);
        }

        let free_symbols = std::mem::take(&mut self.symbol_table.free_symbols);
        let num_locals = self.symbol_table.num_definitions();
        let instructions = self.leave_scope();

        let num_free = free_symbols.len();
        for symbol in &free_symbols {
            match symbol.scope {
                SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
                SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
                SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index]),
                SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index]),
                SymbolScope::FunctionSelf => self.emit(Opcode::CurrentClosure, &[]),
            };
        }

        let compiled = Object::CompiledFunction(Rc::new(monkey_core::CompiledFunction {
            instructions,
            num_locals,
            num_args: parameters.len(),
        }));
        let const_idx = self.add_constant(compiled);
        self.emit(Opcode::Closure, &[const_idx, num_free]);
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbol_table);
        self.symbol_table = SymbolTable::new_enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().expect("scope stack is never empty");
        let outer = std::mem::take(&mut self.symbol_table)
            .pop()
            .expect("leave_scope called without a matching enter_scope");
        self.symbol_table = outer;
        scope.instructions
    }

    fn current_instructions(&mut self) -> &mut Instructions {
        &mut self.scopes.last_mut().unwrap().instructions
    }

    fn add_constant(&mut self, obj: Object) -> usize {
        self.constants.push(Rc::new(obj));
        self.constants.len() - 1
    }

    fn emit(&mut self, op: Opcode, operands: &[usize]) -> usize {
        let scope = self.scopes.last_mut().unwrap();
        let pos = scope.instructions.emit(op, operands);
        scope.previous_instruction = scope.last_instruction;
        scope.last_instruction = Some(EmittedInstruction {
            opcode: op,
            position: pos,
        });
        pos
    }

    fn last_instruction_is(&self, op: Opcode) -> bool {
        self.scopes
            .last()
            .unwrap()
            .last_instruction
            .is_some_and(|last| last.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scopes.last_mut().unwrap();
        let last = scope.last_instruction.expect("checked by last_instruction_is");
        scope.instructions.0.truncate(last.position);
        scope.last_instruction = scope.previous_instruction;
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scopes.last_mut().unwrap();
        let last = scope.last_instruction.expect("checked by last_instruction_is");
        scope.instructions.0.truncate(last.position);
        scope.instructions.emit(Opcode::ReturnValue, &[]);
        scope.last_instruction = Some(EmittedInstruction {
            opcode: Opcode::ReturnValue,
            position: last.position,
        });
    }

    /// Rewrite the operand of the (fixed-width) instruction at `pos`,
    /// preserving the opcode and instruction length. Used for jump
    /// back-patching.
    fn change_operand(&mut self, pos: usize, new_operand: usize) {
        let scope = self.scopes.last_mut().unwrap();
        let op = Opcode::from_byte(scope.instructions.0[pos]).expect("patched position holds an opcode byte");
        let width = op.operand_widths()[0];
        scope.instructions.write_operand_at(pos + 1, width, new_operand);
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn compile(input: &str) -> Bytecode {
        let mut parser = Parser::new(input);
        let (program, errors) = parser.parse_program();
        assert!(errors.is_empty(), "parser errors: {errors}");
        let mut compiler = Compiler::new();
        compiler.compile_program(&program).expect("compile failed")
    }

    fn constant_ints(bytecode: &Bytecode) -> Vec<i64> {
        bytecode
            .constants
            .iter()
            .filter_map(|c| match c.as_ref() {
                Object::Integer(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn integer_arithmetic_emits_constants_and_add() {
        let bytecode = compile("1 + 2");
        assert_eq!(constant_ints(&bytecode), vec![1, 2]);
        let expected = "0000 OPCONSTANT 0\n0003 OPCONSTANT 1\n0006 OPADD\n0007 OPPOP";
        assert_eq!(bytecode.instructions.to_string(), expected);
    }

    #[test]
    fn less_than_compiles_identically_to_swapped_greater_than() {
        let lt = compile("1 < 2");
        let gt = compile("2 > 1");
        assert_eq!(lt.instructions, gt.instructions);
        assert_eq!(constant_ints(&lt), constant_ints(&gt));
    }

    #[test]
    fn if_without_alternative_emits_null_branch() {
        let bytecode = compile("if (true) { 10 }; 3333;");
        let expected = "0000 OPTRUE\n\
                         0001 OPJMPFALSE 10\n\
                         0004 OPCONSTANT 0\n\
                         0007 OPJMP 11\n\
                         0010 OPNULL\n\
                         0011 OPPOP\n\
                         0012 OPCONSTANT 1\n\
                         0015 OPPOP";
        assert_eq!(bytecode.instructions.to_string(), expected);
    }

    #[test]
    fn global_let_bindings_emit_set_and_get() {
        let bytecode = compile("let one = 1; let two = 2; one + two;");
        let expected = "0000 OPCONSTANT 0\n\
                         0003 OPSETGLOBAL 0\n\
                         0006 OPCONSTANT 1\n\
                         0009 OPSETGLOBAL 1\n\
                         0012 OPGETGLOBAL 0\n\
                         0015 OPGETGLOBAL 1\n\
                         0018 OPADD\n\
                         0019 OPPOP";
        assert_eq!(bytecode.instructions.to_string(), expected);
    }

    #[test]
    fn function_literal_compiles_locals_and_implicit_return() {
        let bytecode = compile("fn(a, b) { a + b }");
        let compiled_fn = bytecode
            .constants
            .iter()
            .find_map(|c| match c.as_ref() {
                Object::CompiledFunction(f) => Some(f.clone()),
                _ => None,
            })
            .expect("expected a compiled function constant");
        assert_eq!(compiled_fn.num_args, 2);
        assert_eq!(compiled_fn.num_locals, 2);
        let expected = "0000 OPGETLOCAL 0\n0002 OPGETLOCAL 1\n0003 OPADD\n0004 OPRETURNVALUE";
        assert_eq!(compiled_fn.instructions.to_string(), expected);
    }

    #[test]
    fn closure_captures_free_variables_in_first_use_order() {
        let bytecode = compile("fn(a) { fn(b) { a + b } }");
        let inner = bytecode
            .constants
            .iter()
            .find_map(|c| match c.as_ref() {
                Object::CompiledFunction(f) if f.num_args == 1 => Some(f.clone()),
                _ => None,
            });
        assert!(inner.is_some());
        assert!(bytecode.instructions.to_string().contains("OPCLOSURE"));
    }

    #[test]
    fn self_recursive_let_binding_uses_current_closure() {
        let bytecode = compile("let fib = fn(n) { fib(n) };");
        let compiled_fn = bytecode
            .constants
            .iter()
            .find_map(|c| match c.as_ref() {
                Object::CompiledFunction(f) => Some(f.clone()),
                _ => None,
            })
            .expect("expected compiled function");
        assert!(compiled_fn.instructions.to_string().contains("OPCURRENTCLOSURE"));
    }

    #[test]
    fn self_referential_let_reads_old_binding_before_rebinding() {
        // `let x = x - 1;` must resolve the RHS `x` to the prior global slot
        // (index 0), not the new one this statement is about to allocate.
        let bytecode = compile("let x = 1; let x = x - 1; x;");
        let expected = "0000 OPCONSTANT 0\n\
                         0003 OPSETGLOBAL 0\n\
                         0006 OPGETGLOBAL 0\n\
                         0009 OPCONSTANT 1\n\
                         0012 OPSUB\n\
                         0013 OPSETGLOBAL 1\n\
                         0016 OPGETGLOBAL 1\n\
                         0019 OPPOP";
        assert_eq!(bytecode.instructions.to_string(), expected);
    }

    #[test]
    fn undefined_variable_is_a_compile_error() {
        let mut parser = Parser::new("foobar;");
        let (program, errors) = parser.parse_program();
        assert!(errors.is_empty());
        let mut compiler = Compiler::new();
        let err = compiler.compile_program(&program).unwrap_err();
        assert_eq!(err.code, CompileErrorCode::UndefinedVariable);
        assert_eq!(err.message, "undefined variable: foobar");
    }

    #[test]
    fn while_loop_jumps_back_to_condition_and_defaults_to_null() {
        let bytecode = compile("while (true) { 1 };");
        let rendered = bytecode.instructions.to_string();
        assert!(rendered.starts_with("0000 OPNULL\n0001 OPTRUE"));
        assert!(rendered.contains("OPJMP 1"));
    }
}
