//! Sandboxed boolean expressions for condition nodes and transitions.
//!
//! The grammar is deliberately small: literals, identifiers with one level
//! of property access, comparisons, `!`, `&&`, `||` and parentheses.
//! Function calls, assignment, and prototype/constructor access are denied
//! so conditions stay safe to evaluate on untrusted input.

mod parser;
mod token;

use std::collections::HashMap;

use serde_json::Value;

/// Errors from expression evaluation. Always surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// Empty input, lexical error, or syntax error.
    #[error("invalid expression: {0}")]
    InvalidExpression(String),

    /// A denied construct: call syntax, assignment, or prototype access.
    #[error("security violation: {0}")]
    SecurityViolation(String),
}

/// Evaluate a condition expression against the variable map.
///
/// The result is always coerced to a boolean; an absent variable (or a
/// property on a non-object base) is false-equivalent. `&&` and `||` are
/// not short-circuiting: both operands evaluate, then each is coerced.
pub fn evaluate(expression: &str, variables: &HashMap<String, Value>) -> Result<bool, ExprError> {
    let tokens = token::tokenize(expression)?;
    let ast = parser::Parser::new(&tokens).parse()?;
    Ok(parser::eval(&ast, variables).truthy())
}
