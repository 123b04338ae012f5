//! Restricted boolean/arithmetic expression grammar.
//!
//! Used for row-level checks (`end_date >= start_date`, `price < 2000`) and
//! for template custom rules over dimension scores (`validity >= 15 and
//! completeness >= 15`). Expressions are parsed into an AST once and then
//! evaluated against a [`Scope`]; nothing is ever executed dynamically.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or         := and (("or" | "||") and)*
//! and        := not (("and" | "&&") not)*
//! not        := ("not" | "!") not | comparison
//! comparison := additive (("<" | "<=" | ">" | ">=" | "==" | "=" | "!=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := "-" unary | primary
//! primary    := number | string | "true" | "false" | "null" | ident | "(" or ")"
//! ```
//!
//! Comparisons with `null` are unknown; `and`/`or` follow three-valued logic.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::value::{Value, parse_date, parse_timestamp};

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("parse error at position {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("division by zero")]
    DivisionByZero,
}

/// Variable lookup for expression evaluation.
pub trait Scope {
    /// Value bound to `name`, `None` when the identifier is not defined.
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl<F> Scope for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn lookup(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    Ident(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Operand {
    fn from_value(value: Value) -> Operand {
        match value {
            Value::Null | Value::NotApplicable => Operand::Null,
            Value::Bool(value) => Operand::Bool(value),
            Value::Int(value) => Operand::Number(value as f64),
            Value::Float(value) => Operand::Number(value),
            Value::Text(value) => Operand::Text(value),
            Value::Date(_) | Value::Timestamp(_) => value
                .as_timestamp()
                .map(Operand::Timestamp)
                .unwrap_or(Operand::Null),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Operand::Null => "null",
            Operand::Bool(_) => "boolean",
            Operand::Number(_) => "number",
            Operand::Text(_) => "text",
            Operand::Timestamp(_) => "timestamp",
        }
    }
}

/// Parse an expression string.
pub fn parse_expression(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        position: 0,
    };
    let expr = parser.parse_or()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(ExprError::Parse {
            position: token.position,
            message: format!("unexpected token {:?}", token.kind),
        }),
    }
}

impl Expr {
    /// Identifiers referenced by the expression, in first-seen order.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_identifiers(&mut names);
        names
    }

    fn collect_identifiers<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Ident(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name.as_str());
                }
            }
            Expr::Unary { expr, .. } => expr.collect_identifiers(names),
            Expr::Binary { left, right, .. } => {
                left.collect_identifiers(names);
                right.collect_identifiers(names);
            }
            _ => {}
        }
    }

    pub fn evaluate(&self, scope: &dyn Scope) -> Result<Operand, ExprError> {
        match self {
            Expr::Number(value) => Ok(Operand::Number(*value)),
            Expr::Text(value) => Ok(Operand::Text(value.clone())),
            Expr::Bool(value) => Ok(Operand::Bool(*value)),
            Expr::Null => Ok(Operand::Null),
            Expr::Ident(name) => scope
                .lookup(name)
                .map(Operand::from_value)
                .ok_or_else(|| ExprError::UnknownIdentifier(name.clone())),
            Expr::Unary { op, expr } => {
                let operand = expr.evaluate(scope)?;
                match (op, operand) {
                    (_, Operand::Null) => Ok(Operand::Null),
                    (UnaryOp::Not, Operand::Bool(value)) => Ok(Operand::Bool(!value)),
                    (UnaryOp::Neg, Operand::Number(value)) => Ok(Operand::Number(-value)),
                    (UnaryOp::Not, other) => Err(ExprError::TypeMismatch(format!(
                        "'not' expects a boolean, found {}",
                        other.type_name()
                    ))),
                    (UnaryOp::Neg, other) => Err(ExprError::TypeMismatch(format!(
                        "'-' expects a number, found {}",
                        other.type_name()
                    ))),
                }
            }
            Expr::Binary { op, left, right } => match op {
                BinaryOp::And | BinaryOp::Or => {
                    let left = as_logical(left.evaluate(scope)?, *op)?;
                    // short-circuit only on decided values
                    match (op, left) {
                        (BinaryOp::And, Some(false)) => return Ok(Operand::Bool(false)),
                        (BinaryOp::Or, Some(true)) => return Ok(Operand::Bool(true)),
                        _ => {}
                    }
                    let right = as_logical(right.evaluate(scope)?, *op)?;
                    Ok(combine_logical(*op, left, right))
                }
                _ => {
                    let left = left.evaluate(scope)?;
                    let right = right.evaluate(scope)?;
                    apply_binary(*op, left, right)
                }
            },
        }
    }

    /// Evaluate as a predicate: `Some(bool)` when decided, `None` when unknown.
    pub fn evaluate_predicate(&self, scope: &dyn Scope) -> Result<Option<bool>, ExprError> {
        match self.evaluate(scope)? {
            Operand::Bool(value) => Ok(Some(value)),
            Operand::Null => Ok(None),
            other => Err(ExprError::TypeMismatch(format!(
                "expression must be boolean, found {}",
                other.type_name()
            ))),
        }
    }
}

fn as_logical(operand: Operand, op: BinaryOp) -> Result<Option<bool>, ExprError> {
    match operand {
        Operand::Bool(value) => Ok(Some(value)),
        Operand::Null => Ok(None),
        other => Err(ExprError::TypeMismatch(format!(
            "'{}' expects booleans, found {}",
            op.symbol(),
            other.type_name()
        ))),
    }
}

fn combine_logical(op: BinaryOp, left: Option<bool>, right: Option<bool>) -> Operand {
    let result = match op {
        BinaryOp::And => match (left, right) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        _ => match (left, right) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
    };
    result.map(Operand::Bool).unwrap_or(Operand::Null)
}

fn apply_binary(op: BinaryOp, left: Operand, right: Operand) -> Result<Operand, ExprError> {
    if matches!(left, Operand::Null) || matches!(right, Operand::Null) {
        return Ok(Operand::Null);
    }

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
            let (Operand::Number(a), Operand::Number(b)) = (&left, &right) else {
                return Err(ExprError::TypeMismatch(format!(
                    "'{}' expects numbers, found {} and {}",
                    op.symbol(),
                    left.type_name(),
                    right.type_name()
                )));
            };
            let value = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                _ => {
                    if *b == 0.0 {
                        return Err(ExprError::DivisionByZero);
                    }
                    a / b
                }
            };
            Ok(Operand::Number(value))
        }
        _ => {
            let ordering = compare(&left, &right).ok_or_else(|| {
                ExprError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    left.type_name(),
                    right.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Operand::Bool(result))
        }
    }
}

fn compare(left: &Operand, right: &Operand) -> Option<Ordering> {
    match (left, right) {
        (Operand::Number(a), Operand::Number(b)) => a.partial_cmp(b),
        (Operand::Text(a), Operand::Text(b)) => Some(a.cmp(b)),
        (Operand::Bool(a), Operand::Bool(b)) => Some(a.cmp(b)),
        (Operand::Timestamp(a), Operand::Timestamp(b)) => Some(a.cmp(b)),
        (Operand::Timestamp(a), Operand::Text(b)) => text_timestamp(b).map(|b| a.cmp(&b)),
        (Operand::Text(a), Operand::Timestamp(b)) => text_timestamp(a).map(|a| a.cmp(b)),
        _ => None,
    }
}

fn text_timestamp(value: &str) -> Option<NaiveDateTime> {
    parse_timestamp(value).or_else(|| {
        parse_date(value).map(|date| date.and_time(chrono::NaiveTime::MIN))
    })
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Text(String),
    Ident(String),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
    Op(BinaryOp),
    Minus,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        let start = idx;

        if ch.is_whitespace() {
            idx += 1;
            continue;
        }

        let two = chars.get(idx + 1).copied();
        let kind = match ch {
            '(' => {
                idx += 1;
                TokenKind::LParen
            }
            ')' => {
                idx += 1;
                TokenKind::RParen
            }
            '+' => {
                idx += 1;
                TokenKind::Op(BinaryOp::Add)
            }
            '-' => {
                idx += 1;
                TokenKind::Minus
            }
            '*' => {
                idx += 1;
                TokenKind::Op(BinaryOp::Mul)
            }
            '/' => {
                idx += 1;
                TokenKind::Op(BinaryOp::Div)
            }
            '<' | '>' | '=' | '!' => {
                let (kind, width) = match (ch, two) {
                    ('<', Some('=')) => (TokenKind::Op(BinaryOp::Le), 2),
                    ('<', _) => (TokenKind::Op(BinaryOp::Lt), 1),
                    ('>', Some('=')) => (TokenKind::Op(BinaryOp::Ge), 2),
                    ('>', _) => (TokenKind::Op(BinaryOp::Gt), 1),
                    ('=', Some('=')) => (TokenKind::Op(BinaryOp::Eq), 2),
                    ('=', _) => (TokenKind::Op(BinaryOp::Eq), 1),
                    ('!', Some('=')) => (TokenKind::Op(BinaryOp::Ne), 2),
                    _ => (TokenKind::Not, 1),
                };
                idx += width;
                kind
            }
            '&' | '|' => {
                if two != Some(ch) {
                    return Err(ExprError::Parse {
                        position: start,
                        message: format!("expected '{ch}{ch}'"),
                    });
                }
                idx += 2;
                if ch == '&' { TokenKind::And } else { TokenKind::Or }
            }
            '\'' | '"' => {
                let quote = ch;
                idx += 1;
                let mut text = String::new();
                loop {
                    match chars.get(idx) {
                        Some(c) if *c == quote => {
                            idx += 1;
                            break;
                        }
                        Some(c) => {
                            text.push(*c);
                            idx += 1;
                        }
                        None => {
                            return Err(ExprError::Parse {
                                position: start,
                                message: "unterminated string literal".to_string(),
                            });
                        }
                    }
                }
                TokenKind::Text(text)
            }
            c if c.is_ascii_digit() || (c == '.' && two.is_some_and(|n| n.is_ascii_digit())) => {
                while idx < chars.len() && (chars[idx].is_ascii_digit() || chars[idx] == '.') {
                    idx += 1;
                }
                if idx < chars.len() && matches!(chars[idx], 'e' | 'E') {
                    let mut lookahead = idx + 1;
                    if lookahead < chars.len() && matches!(chars[lookahead], '+' | '-') {
                        lookahead += 1;
                    }
                    if lookahead < chars.len() && chars[lookahead].is_ascii_digit() {
                        idx = lookahead;
                        while idx < chars.len() && chars[idx].is_ascii_digit() {
                            idx += 1;
                        }
                    }
                }
                let literal: String = chars[start..idx].iter().collect();
                let value = literal.parse::<f64>().map_err(|_| ExprError::Parse {
                    position: start,
                    message: format!("invalid number '{literal}'"),
                })?;
                TokenKind::Number(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                while idx < chars.len()
                    && (chars[idx].is_alphanumeric() || chars[idx] == '_' || chars[idx] == '.')
                {
                    idx += 1;
                }
                let word: String = chars[start..idx].iter().collect();
                match word.to_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word),
                }
            }
            other => {
                return Err(ExprError::Parse {
                    position: start,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };

        tokens.push(Token {
            kind,
            position: start,
        });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn end_position(&self) -> usize {
        self.tokens
            .last()
            .map(|token| token.position + 1)
            .unwrap_or(0)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::And)) {
            self.next();
            let right = self.parse_not()?;
            left = binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Not)) {
            self.next();
            let expr = self.parse_not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_additive()?;
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Op(
                op @ (BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge),
            )) => *op,
            _ => return Ok(left),
        };
        self.next();
        let right = self.parse_additive()?;
        Ok(binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Op(BinaryOp::Add)) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.next();
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Op(BinaryOp::Mul)) => BinaryOp::Mul,
                Some(TokenKind::Op(BinaryOp::Div)) => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.next();
            let right = self.parse_unary()?;
            left = binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Minus)) {
            self.next();
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let position = self.end_position();
        let Some(token) = self.next() else {
            return Err(ExprError::Parse {
                position,
                message: "unexpected end of expression".to_string(),
            });
        };

        match token.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Text(value) => Ok(Expr::Text(value)),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::Ident(name) => Ok(Expr::Ident(name)),
            TokenKind::LParen => {
                let expr = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(expr),
                    _ => Err(ExprError::Parse {
                        position: token.position,
                        message: "missing closing parenthesis".to_string(),
                    }),
                }
            }
            other => Err(ExprError::Parse {
                position: token.position,
                message: format!("unexpected token {other:?}"),
            }),
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn scope(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn eval(expr: &str, vars: &HashMap<String, Value>) -> Result<Option<bool>, ExprError> {
        let lookup = |name: &str| vars.get(name).cloned();
        parse_expression(expr)
            .expect("parse")
            .evaluate_predicate(&lookup)
    }

    #[test]
    fn evaluates_comparisons_and_logic() {
        let vars = scope(&[("price", Value::Float(9999.99)), ("qty", Value::Int(2))]);
        assert_eq!(eval("price < 2000", &vars), Ok(Some(false)));
        assert_eq!(eval("qty * 2 == 4 and not price < 0", &vars), Ok(Some(true)));
        assert_eq!(eval("qty > 5 || (price >= 9999.99)", &vars), Ok(Some(true)));
        assert_eq!(eval("-qty < 0", &vars), Ok(Some(true)));
    }

    #[test]
    fn nulls_are_unknown() {
        let vars = scope(&[("a", Value::Null), ("b", Value::Int(1))]);
        assert_eq!(eval("a > 1", &vars), Ok(None));
        assert_eq!(eval("a > 1 and b > 5", &vars), Ok(Some(false)));
        assert_eq!(eval("a > 1 or b > 0", &vars), Ok(Some(true)));
    }

    #[test]
    fn compares_dates_with_text_literals() {
        let vars = scope(&[
            ("start", Value::infer("2024-01-01")),
            ("end", Value::infer("2024-02-01T00:00:00")),
        ]);
        assert_eq!(eval("end >= start", &vars), Ok(Some(true)));
        assert_eq!(eval("start < '2023-12-31'", &vars), Ok(Some(false)));
    }

    #[test]
    fn reports_unknown_identifiers_and_type_errors() {
        let vars = scope(&[("name", Value::Text("x".to_string()))]);
        assert_eq!(
            eval("missing > 1", &vars),
            Err(ExprError::UnknownIdentifier("missing".to_string()))
        );
        assert!(matches!(eval("name > 1", &vars), Err(ExprError::TypeMismatch(_))));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_expression("a >"), Err(ExprError::Parse { .. })));
        assert!(matches!(parse_expression("(a > 1"), Err(ExprError::Parse { .. })));
        assert!(matches!(parse_expression("a & b"), Err(ExprError::Parse { .. })));
        assert!(matches!(parse_expression("__import__('os')"), Err(ExprError::Parse { .. })));
    }

    #[test]
    fn lists_dotted_identifiers() {
        let expr = parse_expression("validity.score >= 15 and validity.score < overall").expect("parse");
        assert_eq!(expr.identifiers(), vec!["validity.score", "overall"]);
    }
}
