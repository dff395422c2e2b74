//! Abstract syntax tree.
//!
//! Statements and expressions are tagged enums (no virtual dispatch); each
//! carries enough to render itself via `Display`, producing the canonical,
//! fully-parenthesized form tests rely on (`-a * b` -> `((-a) * b)`).

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let {
        name: Identifier,
        value: Expression,
    },
    Return {
        value: Expression,
    },
    Expression(Expression),
    Block(Block),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {name} = {value};"),
            Statement::Return { value } => write!(f, "return {value};"),
            Statement::Expression(expr) => write!(f, "{expr}"),
            Statement::Block(block) => write!(f, "{block}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(Identifier),
    IntegerLiteral(i64),
    StringLiteral(String),
    Boolean(bool),
    Prefix {
        operator: String,
        right: Box<Expression>,
    },
    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    While {
        condition: Box<Expression>,
        body: Block,
    },
    FunctionLiteral {
        parameters: Vec<Identifier>,
        body: Block,
        /// Set by the parser when this literal is the RHS of `let <name> = fn ...`,
        /// used for self-referential compilation (see symbol_table's FunctionSelf).
        name: Option<String>,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    ArrayLiteral(Vec<Expression>),
    HashLiteral(Vec<(Expression, Expression)>),
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(ident) => write!(f, "{ident}"),
            Expression::IntegerLiteral(value) => write!(f, "{value}"),
            Expression::StringLiteral(value) => write!(f, "{value}"),
            Expression::Boolean(value) => write!(f, "{value}"),
            Expression::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} {consequence}")?;
                if let Some(alt) = alternative {
                    write!(f, " else {alt}")?;
                }
                Ok(())
            }
            Expression::While { condition, body } => write!(f, "while{condition} {body}"),
            Expression::FunctionLiteral {
                parameters, body, ..
            } => {
                let params: Vec<String> = parameters.iter().map(|p| p.to_string()).collect();
                write!(f, "fn({}) {}", params.join(", "), body)
            }
            Expression::Call {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                write!(f, "{function}({})", args.join(", "))
            }
            Expression::ArrayLiteral(elements) => {
                let elems: Vec<String> = elements.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", elems.join(", "))
            }
            Expression::HashLiteral(pairs) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{k}:{v}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Expression::Index { left, index } => write!(f, "({left}[{index}])"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_canonical_and_parenthesized() {
        let expr = Expression::Infix {
            operator: "*".to_string(),
            left: Box::new(Expression::Prefix {
                operator: "-".to_string(),
                right: Box::new(Expression::Identifier(Identifier {
                    name: "a".to_string(),
                })),
            }),
            right: Box::new(Expression::Identifier(Identifier {
                name: "b".to_string(),
            })),
        };
        assert_eq!(expr.to_string(), "((-a) * b)");
    }

    #[test]
    fn display_if_else_matches_canonical_form() {
        let expr = Expression::If {
            condition: Box::new(Expression::Infix {
                operator: "<".to_string(),
                left: Box::new(Expression::Identifier(Identifier {
                    name: "x".to_string(),
                })),
                right: Box::new(Expression::Identifier(Identifier {
                    name: "y".to_string(),
                })),
            }),
            consequence: Block {
                statements: vec![Statement::Expression(Expression::Identifier(Identifier {
                    name: "x".to_string(),
                }))],
            },
            alternative: Some(Block {
                statements: vec![Statement::Expression(Expression::Identifier(Identifier {
                    name: "y".to_string(),
                }))],
            }),
        };
        assert_eq!(expr.to_string(), "if(x < y) x else y");
    }
}
