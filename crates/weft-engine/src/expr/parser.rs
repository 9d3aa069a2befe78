//! Recursive-descent parser and tree-walk evaluator for condition expressions.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::Value;

use super::token::Token;
use super::ExprError;

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Lit),
    Var(String),
    Prop(String, String),
    Not(Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lit {
    Num(f64),
    Str(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

const DENIED_PROPERTIES: [&str; 3] = ["__proto__", "constructor", "prototype"];

pub(crate) struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parse the whole token stream. Trailing tokens (e.g. from a chained
    /// comparison like `a < b < c`) fail the parse.
    pub fn parse(&mut self) -> Result<Expr, ExprError> {
        if self.tokens.is_empty() {
            return Err(ExprError::InvalidExpression(
                "empty expression".to_string(),
            ));
        }
        let expr = self.or_expr()?;
        if self.pos < self.tokens.len() {
            return Err(ExprError::InvalidExpression(format!(
                "unexpected token: {:?}",
                self.tokens[self.pos]
            )));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.cmp_expr()?;
        while self.eat(&Token::And) {
            let right = self.cmp_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    // A single comparison at most; chaining is left for the top level to
    // reject as a trailing token.
    fn cmp_expr(&mut self) -> Result<Expr, ExprError> {
        let left = self.unary_expr()?;
        let op = match self.peek() {
            Some(Token::Eq) => Some(CmpOp::Eq),
            Some(Token::Ne) => Some(CmpOp::Ne),
            Some(Token::Lt) => Some(CmpOp::Lt),
            Some(Token::Gt) => Some(CmpOp::Gt),
            Some(Token::Le) => Some(CmpOp::Le),
            Some(Token::Ge) => Some(CmpOp::Ge),
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let right = self.unary_expr()?;
                Ok(Expr::Cmp(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, ExprError> {
        if self.eat(&Token::Not) {
            let inner = self.unary_expr()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.primary()
        }
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Lit::Num(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Lit::Str(s))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Lit::Bool(b))),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(ExprError::InvalidExpression(
                        "expected ')'".to_string(),
                    ));
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::Dot) {
                    let prop = match self.next() {
                        Some(Token::Ident(p)) => p,
                        _ => {
                            return Err(ExprError::InvalidExpression(
                                "expected property name after '.'".to_string(),
                            ));
                        }
                    };
                    if DENIED_PROPERTIES.contains(&prop.as_str()) {
                        return Err(ExprError::SecurityViolation(format!(
                            "access to '{}' is denied",
                            prop
                        )));
                    }
                    self.deny_call()?;
                    Ok(Expr::Prop(name, prop))
                } else {
                    self.deny_call()?;
                    Ok(Expr::Var(name))
                }
            }
            Some(token) => Err(ExprError::InvalidExpression(format!(
                "unexpected token: {:?}",
                token
            ))),
            None => Err(ExprError::InvalidExpression(
                "unexpected end of expression".to_string(),
            )),
        }
    }

    fn deny_call(&self) -> Result<(), ExprError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            return Err(ExprError::SecurityViolation(
                "function calls are not allowed".to_string(),
            ));
        }
        Ok(())
    }
}

/// Evaluated value. Admits NaN and "absent" (an unresolved identifier),
/// neither of which `serde_json::Value` can represent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EvalValue {
    Absent,
    Bool(bool),
    Num(f64),
    Str(String),
    Json(Value),
}

impl EvalValue {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Bool(b) => EvalValue::Bool(*b),
            Value::Number(n) => EvalValue::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => EvalValue::Str(s.clone()),
            other => EvalValue::Json(other.clone()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            EvalValue::Absent => false,
            EvalValue::Bool(b) => *b,
            EvalValue::Num(n) => *n != 0.0 && !n.is_nan(),
            EvalValue::Str(s) => !s.is_empty(),
            EvalValue::Json(Value::Null) => false,
            EvalValue::Json(_) => true,
        }
    }
}

/// Strict equality: type and value must match, no coercion.
fn strict_eq(a: &EvalValue, b: &EvalValue) -> bool {
    match (a, b) {
        (EvalValue::Num(x), EvalValue::Num(y)) => x == y,
        (EvalValue::Str(x), EvalValue::Str(y)) => x == y,
        (EvalValue::Bool(x), EvalValue::Bool(y)) => x == y,
        (EvalValue::Absent, EvalValue::Absent) => true,
        (EvalValue::Json(x), EvalValue::Json(y)) => x == y,
        _ => false,
    }
}

// Numbers order as f64, strings lexicographically; any other pairing has no
// ordering and every relational operator on it yields false.
fn ordering(a: &EvalValue, b: &EvalValue) -> Option<Ordering> {
    match (a, b) {
        (EvalValue::Num(x), EvalValue::Num(y)) => x.partial_cmp(y),
        (EvalValue::Str(x), EvalValue::Str(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

pub(crate) fn eval(expr: &Expr, variables: &HashMap<String, Value>) -> EvalValue {
    match expr {
        Expr::Literal(Lit::Num(n)) => EvalValue::Num(*n),
        Expr::Literal(Lit::Str(s)) => EvalValue::Str(s.clone()),
        Expr::Literal(Lit::Bool(b)) => EvalValue::Bool(*b),
        Expr::Var(name) => variables
            .get(name)
            .map(EvalValue::from_json)
            .unwrap_or(EvalValue::Absent),
        Expr::Prop(base, prop) => resolve_prop(variables.get(base), prop),
        Expr::Not(inner) => EvalValue::Bool(!eval(inner, variables).truthy()),
        Expr::Cmp(op, left, right) => {
            let lhs = eval(left, variables);
            let rhs = eval(right, variables);
            let verdict = match op {
                CmpOp::Eq => strict_eq(&lhs, &rhs),
                CmpOp::Ne => !strict_eq(&lhs, &rhs),
                CmpOp::Lt => matches!(ordering(&lhs, &rhs), Some(Ordering::Less)),
                CmpOp::Le => matches!(
                    ordering(&lhs, &rhs),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                CmpOp::Gt => matches!(ordering(&lhs, &rhs), Some(Ordering::Greater)),
                CmpOp::Ge => matches!(
                    ordering(&lhs, &rhs),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
            };
            EvalValue::Bool(verdict)
        }
        // Both sides always evaluate; no short-circuiting.
        Expr::And(left, right) => {
            let lhs = eval(left, variables).truthy();
            let rhs = eval(right, variables).truthy();
            EvalValue::Bool(lhs && rhs)
        }
        Expr::Or(left, right) => {
            let lhs = eval(left, variables).truthy();
            let rhs = eval(right, variables).truthy();
            EvalValue::Bool(lhs || rhs)
        }
    }
}

// Single-level property resolution: object fields, plus `length` on arrays
// and strings. Anything else resolves to absent, never an error.
fn resolve_prop(base: Option<&Value>, prop: &str) -> EvalValue {
    match base {
        Some(Value::Object(map)) => map
            .get(prop)
            .map(EvalValue::from_json)
            .unwrap_or(EvalValue::Absent),
        Some(Value::Array(items)) if prop == "length" => EvalValue::Num(items.len() as f64),
        Some(Value::String(s)) if prop == "length" => EvalValue::Num(s.chars().count() as f64),
        _ => EvalValue::Absent,
    }
}

#[cfg(test)]
mod tests {
    use super::super::token::tokenize;
    use super::*;
    use serde_json::json;

    fn parse(input: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(input)?;
        Parser::new(&tokens).parse()
    }

    #[test]
    fn test_parse_empty_input() {
        let err = parse("   ").unwrap_err();
        assert!(matches!(err, ExprError::InvalidExpression(_)));
    }

    #[test]
    fn test_parse_precedence() {
        // `a || b && c` parses as `a || (b && c)`.
        let expr = parse("a || b && c").unwrap();
        match expr {
            Expr::Or(_, right) => assert!(matches!(*right, Expr::And(_, _))),
            other => panic!("unexpected tree: {:?}", other),
        }
    }

    #[test]
    fn test_parse_chained_comparison_rejected() {
        let err = parse("a < b < c").unwrap_err();
        match err {
            ExprError::InvalidExpression(msg) => assert!(msg.contains("unexpected token")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_denied_properties() {
        for expr in ["obj.__proto__", "obj.constructor", "obj.prototype"] {
            let err = parse(expr).unwrap_err();
            assert!(matches!(err, ExprError::SecurityViolation(_)), "{}", expr);
        }
    }

    #[test]
    fn test_parse_call_syntax_rejected() {
        assert!(matches!(
            parse("foo()").unwrap_err(),
            ExprError::SecurityViolation(_)
        ));
        assert!(matches!(
            parse("obj.prop()").unwrap_err(),
            ExprError::SecurityViolation(_)
        ));
    }

    #[test]
    fn test_parse_unbalanced_paren() {
        let err = parse("(a || b").unwrap_err();
        assert!(matches!(err, ExprError::InvalidExpression(_)));
    }

    #[test]
    fn test_eval_strict_equality() {
        let mut vars = HashMap::new();
        vars.insert("count".to_string(), json!(1));
        // Number 1 and string "1" are not equal under strict equality.
        let expr = parse("count == '1'").unwrap();
        assert!(!eval(&expr, &vars).truthy());
        let expr = parse("count == 1").unwrap();
        assert!(eval(&expr, &vars).truthy());
    }

    #[test]
    fn test_eval_mixed_type_ordering_is_false() {
        let mut vars = HashMap::new();
        vars.insert("count".to_string(), json!(3));
        let expr = parse("count < 'ten'").unwrap();
        assert!(!eval(&expr, &vars).truthy());
        let expr = parse("count > 'ten'").unwrap();
        assert!(!eval(&expr, &vars).truthy());
    }

    #[test]
    fn test_eval_string_ordering() {
        let vars = HashMap::new();
        let expr = parse("'apple' < 'banana'").unwrap();
        assert!(eval(&expr, &vars).truthy());
    }

    #[test]
    fn test_eval_nan_literal_never_orders() {
        let mut vars = HashMap::new();
        vars.insert("x".to_string(), json!(5));
        // `1.2.3` lexes to NaN; NaN neither equals nor orders anything.
        assert!(!eval(&parse("x == 1.2.3").unwrap(), &vars).truthy());
        assert!(!eval(&parse("x < 1.2.3").unwrap(), &vars).truthy());
        assert!(eval(&parse("x != 1.2.3").unwrap(), &vars).truthy());
    }

    #[test]
    fn test_eval_absent_variable_is_false() {
        let vars = HashMap::new();
        assert!(!eval(&parse("missing").unwrap(), &vars).truthy());
        assert!(!eval(&parse("missing.prop").unwrap(), &vars).truthy());
    }

    #[test]
    fn test_eval_length_on_arrays_and_strings() {
        let mut vars = HashMap::new();
        vars.insert("items".to_string(), json!([1, 2, 3]));
        vars.insert("name".to_string(), json!("weft"));
        assert!(eval(&parse("items.length >= 1").unwrap(), &vars).truthy());
        assert!(eval(&parse("name.length == 4").unwrap(), &vars).truthy());
    }

    #[test]
    fn test_eval_property_on_non_object_is_absent() {
        let mut vars = HashMap::new();
        vars.insert("n".to_string(), json!(42));
        assert!(!eval(&parse("n.anything").unwrap(), &vars).truthy());
    }
}
