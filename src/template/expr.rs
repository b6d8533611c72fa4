//! Sandboxed expression language for `${...}` placeholders.
//!
//! A small JavaScript-flavoured subset: literals, environment identifiers, member and
//! index access, arithmetic, comparison, logical and conditional operators, and calls to
//! an enumerated set of built-ins (`String`, `Number`, `parseInt`, `Math.*`, string and
//! number methods). Nothing outside that set is reachable.

use crate::environment::{number_to_text, Environment};
use serde_json::Value;
use std::fmt;

/// Runtime value of an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
}

impl Scalar {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => Scalar::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Scalar::Str(s.clone()),
            other => Scalar::Str(other.to_string()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Scalar::Undefined | Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Number(n) => *n != 0.0 && !n.is_nan(),
            Scalar::Str(s) => !s.is_empty(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Scalar::Undefined => f64::NAN,
            Scalar::Null => 0.0,
            Scalar::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Scalar::Number(n) => *n,
            Scalar::Str(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Text form used when a value lands in a filename. `undefined` and `null` render
    /// as nothing.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Undefined | Scalar::Null => String::new(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Number(n) => number_to_text(*n),
            Scalar::Str(s) => s.clone(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Scalar::Undefined => "undefined",
            Scalar::Null => "null",
            Scalar::Bool(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::Str(_) => "string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnaryOp {
    Neg,
    Plus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(Scalar),
    Ident(String),
    Member(Box<Node>, String),
    Index(Box<Node>, Box<Node>),
    Call(Box<Node>, Vec<Node>),
    Unary(UnaryOp, Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Conditional(Box<Node>, Box<Node>, Box<Node>),
}

/// A parsed placeholder expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

/// Parse or evaluation failure, without the surrounding template context
#[derive(Debug, Clone, PartialEq)]
pub struct ExprError(pub String);

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

type ExprResult<T> = Result<T, ExprError>;

/// Upper bound on `repeat` counts and `padStart`/`padEnd` lengths
const MAX_GENERATED: f64 = 1000.0;

fn fail<T>(message: impl Into<String>) -> ExprResult<T> {
    Err(ExprError(message.into()))
}

impl Expression {
    pub fn parse(source: &str) -> ExprResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        if parser.peek().is_none() {
            return fail("empty expression");
        }
        let root = parser.conditional()?;
        if let Some(token) = parser.peek() {
            return fail(format!("unexpected token {}", token));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn evaluate(&self, env: &Environment) -> ExprResult<Scalar> {
        eval(&self.root, env)
    }
}

// ---------------------------------------------------------------------------
// Lexer

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", number_to_text(*n)),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(s) => write!(f, "`{}`", s),
            Token::Punct(p) => write!(f, "`{}`", p),
        }
    }
}

const PUNCTUATION: &[&str] = &[
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", ".", ",", "?", ":",
    "+", "-", "*", "/", "%", "!", "<", ">",
];

fn tokenize(source: &str) -> ExprResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit()
            || (c == '.' && chars.get(i + 1).map_or(false, |n| n.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExprError(format!("invalid number {}", text)))?;
            tokens.push(Token::Number(value));
        } else if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut text = String::new();
            loop {
                match chars.get(i) {
                    None => return fail("unterminated string literal"),
                    Some(&ch) if ch == quote => {
                        i += 1;
                        break;
                    }
                    Some('\\') => {
                        let escaped = match chars.get(i + 1) {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some(&other) => other,
                            None => return fail("unterminated string literal"),
                        };
                        text.push(escaped);
                        i += 2;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Str(text));
        } else if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
            match PUNCTUATION.iter().find(|p| rest.starts_with(**p)) {
                Some(p) => {
                    tokens.push(Token::Punct(*p));
                    i += p.chars().count();
                }
                None => return fail(format!("unexpected character `{}`", c)),
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_punct(&self, punct: &str) -> bool {
        matches!(self.peek(), Some(Token::Punct(p)) if *p == punct)
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.peek_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> ExprResult<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            match self.peek() {
                Some(token) => fail(format!("expected `{}`, found {}", punct, token)),
                None => fail(format!("expected `{}` before end of expression", punct)),
            }
        }
    }

    fn conditional(&mut self) -> ExprResult<Node> {
        let test = self.binary(0)?;
        if self.eat("?") {
            let consequent = self.conditional()?;
            self.expect(":")?;
            let alternate = self.conditional()?;
            return Ok(Node::Conditional(
                Box::new(test),
                Box::new(consequent),
                Box::new(alternate),
            ));
        }
        Ok(test)
    }

    fn binary_op(&self) -> Option<(BinaryOp, u8)> {
        let Some(Token::Punct(p)) = self.peek() else {
            return None;
        };
        let op = match *p {
            "||" => (BinaryOp::Or, 1),
            "&&" => (BinaryOp::And, 2),
            "==" => (BinaryOp::Eq, 3),
            "!=" => (BinaryOp::Ne, 3),
            "===" => (BinaryOp::StrictEq, 3),
            "!==" => (BinaryOp::StrictNe, 3),
            "<" => (BinaryOp::Lt, 4),
            "<=" => (BinaryOp::Le, 4),
            ">" => (BinaryOp::Gt, 4),
            ">=" => (BinaryOp::Ge, 4),
            "+" => (BinaryOp::Add, 5),
            "-" => (BinaryOp::Sub, 5),
            "*" => (BinaryOp::Mul, 6),
            "/" => (BinaryOp::Div, 6),
            "%" => (BinaryOp::Rem, 6),
            _ => return None,
        };
        Some(op)
    }

    /// Precedence climbing over left-associative binary operators
    fn binary(&mut self, min_precedence: u8) -> ExprResult<Node> {
        let mut left = self.unary()?;
        while let Some((op, precedence)) = self.binary_op() {
            if precedence <= min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.binary(precedence)?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> ExprResult<Node> {
        let op = if self.eat("-") {
            UnaryOp::Neg
        } else if self.eat("+") {
            UnaryOp::Plus
        } else if self.eat("!") {
            UnaryOp::Not
        } else {
            return self.postfix();
        };
        Ok(Node::Unary(op, Box::new(self.unary()?)))
    }

    fn postfix(&mut self) -> ExprResult<Node> {
        let mut node = self.primary()?;
        loop {
            if self.eat(".") {
                match self.tokens.get(self.pos).cloned() {
                    Some(Token::Ident(name)) => {
                        self.pos += 1;
                        node = Node::Member(Box::new(node), name);
                    }
                    _ => return fail("expected property name after `.`"),
                }
            } else if self.eat("[") {
                let index = self.conditional()?;
                self.expect("]")?;
                node = Node::Index(Box::new(node), Box::new(index));
            } else if self.eat("(") {
                let mut args = Vec::new();
                if !self.eat(")") {
                    loop {
                        args.push(self.conditional()?);
                        if self.eat(")") {
                            break;
                        }
                        self.expect(",")?;
                    }
                }
                node = Node::Call(Box::new(node), args);
            } else {
                return Ok(node);
            }
        }
    }

    fn primary(&mut self) -> ExprResult<Node> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return fail("unexpected end of expression");
        };
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Node::Literal(Scalar::Number(n))),
            Token::Str(s) => Ok(Node::Literal(Scalar::Str(s))),
            Token::Ident(name) => Ok(match name.as_str() {
                "true" => Node::Literal(Scalar::Bool(true)),
                "false" => Node::Literal(Scalar::Bool(false)),
                "null" => Node::Literal(Scalar::Null),
                "undefined" => Node::Literal(Scalar::Undefined),
                _ => Node::Ident(name),
            }),
            Token::Punct("(") => {
                let inner = self.conditional()?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Punct(p) => fail(format!("unexpected token `{}`", p)),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator

fn eval(node: &Node, env: &Environment) -> ExprResult<Scalar> {
    match node {
        Node::Literal(value) => Ok(value.clone()),
        Node::Ident(name) => match env.get(name) {
            Some(value) => Ok(Scalar::from_json(value)),
            None if is_builtin(name) => fail(format!("`{}` is a function", name)),
            None => Ok(Scalar::Undefined),
        },
        Node::Member(object, property) => {
            if let Node::Ident(name) = object.as_ref() {
                if name == "Math" && !env.contains_key("Math") {
                    return math_constant(property);
                }
            }
            let target = eval(object, env)?;
            property_of(&target, property)
        }
        Node::Index(object, index) => {
            let target = eval(object, env)?;
            let index = eval(index, env)?;
            match (&target, &index) {
                (Scalar::Str(s), Scalar::Number(n)) if *n >= 0.0 && n.fract() == 0.0 => Ok(s
                    .chars()
                    .nth(*n as usize)
                    .map(|c| Scalar::Str(c.to_string()))
                    .unwrap_or(Scalar::Undefined)),
                (Scalar::Undefined | Scalar::Null, _) => fail(format!(
                    "cannot read index {} of {}",
                    index.to_text(),
                    target.type_name()
                )),
                _ => property_of(&target, &index.to_text()),
            }
        }
        Node::Call(callee, args) => {
            let args = args
                .iter()
                .map(|arg| eval(arg, env))
                .collect::<ExprResult<Vec<_>>>()?;
            call(callee, &args, env)
        }
        Node::Unary(op, operand) => {
            let value = eval(operand, env)?;
            Ok(match op {
                UnaryOp::Neg => Scalar::Number(-value.to_number()),
                UnaryOp::Plus => Scalar::Number(value.to_number()),
                UnaryOp::Not => Scalar::Bool(!value.truthy()),
            })
        }
        Node::Binary(BinaryOp::And, left, right) => {
            let left = eval(left, env)?;
            if left.truthy() {
                eval(right, env)
            } else {
                Ok(left)
            }
        }
        Node::Binary(BinaryOp::Or, left, right) => {
            let left = eval(left, env)?;
            if left.truthy() {
                Ok(left)
            } else {
                eval(right, env)
            }
        }
        Node::Binary(op, left, right) => {
            let left = eval(left, env)?;
            let right = eval(right, env)?;
            Ok(binary(*op, &left, &right))
        }
        Node::Conditional(test, consequent, alternate) => {
            if eval(test, env)?.truthy() {
                eval(consequent, env)
            } else {
                eval(alternate, env)
            }
        }
    }
}

fn is_builtin(name: &str) -> bool {
    matches!(name, "String" | "Number" | "parseInt" | "parseFloat" | "Math")
}

fn binary(op: BinaryOp, left: &Scalar, right: &Scalar) -> Scalar {
    match op {
        BinaryOp::Add => match (left, right) {
            (Scalar::Str(_), _) | (_, Scalar::Str(_)) => {
                Scalar::Str(format!("{}{}", left.to_text(), right.to_text()))
            }
            _ => Scalar::Number(left.to_number() + right.to_number()),
        },
        BinaryOp::Sub => Scalar::Number(left.to_number() - right.to_number()),
        BinaryOp::Mul => Scalar::Number(left.to_number() * right.to_number()),
        BinaryOp::Div => Scalar::Number(left.to_number() / right.to_number()),
        BinaryOp::Rem => Scalar::Number(left.to_number() % right.to_number()),
        BinaryOp::StrictEq => Scalar::Bool(strict_equals(left, right)),
        BinaryOp::StrictNe => Scalar::Bool(!strict_equals(left, right)),
        BinaryOp::Eq => Scalar::Bool(loose_equals(left, right)),
        BinaryOp::Ne => Scalar::Bool(!loose_equals(left, right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = match (left, right) {
                (Scalar::Str(a), Scalar::Str(b)) => Some(a.cmp(b)),
                _ => left.to_number().partial_cmp(&right.to_number()),
            };
            Scalar::Bool(match ordering {
                None => false,
                Some(ordering) => match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::Le => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                },
            })
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval"),
    }
}

fn strict_equals(left: &Scalar, right: &Scalar) -> bool {
    match (left, right) {
        (Scalar::Number(a), Scalar::Number(b)) => a == b,
        _ => left == right,
    }
}

fn loose_equals(left: &Scalar, right: &Scalar) -> bool {
    match (left, right) {
        (Scalar::Undefined | Scalar::Null, Scalar::Undefined | Scalar::Null) => true,
        (Scalar::Undefined | Scalar::Null, _) | (_, Scalar::Undefined | Scalar::Null) => false,
        (Scalar::Str(a), Scalar::Str(b)) => a == b,
        _ => left.to_number() == right.to_number(),
    }
}

fn math_constant(name: &str) -> ExprResult<Scalar> {
    match name {
        "PI" => Ok(Scalar::Number(std::f64::consts::PI)),
        "E" => Ok(Scalar::Number(std::f64::consts::E)),
        _ => fail(format!("Math.{} is not a value", name)),
    }
}

fn property_of(target: &Scalar, property: &str) -> ExprResult<Scalar> {
    match target {
        Scalar::Undefined | Scalar::Null => fail(format!(
            "cannot read property `{}` of {}",
            property,
            target.type_name()
        )),
        Scalar::Str(s) if property == "length" => Ok(Scalar::Number(s.chars().count() as f64)),
        _ => Ok(Scalar::Undefined),
    }
}

fn call(callee: &Node, args: &[Scalar], env: &Environment) -> ExprResult<Scalar> {
    match callee {
        Node::Ident(name) if !env.contains_key(name) => call_global(name, args),
        Node::Member(object, method) => {
            if let Node::Ident(name) = object.as_ref() {
                if name == "Math" && !env.contains_key("Math") {
                    return call_math(method, args);
                }
            }
            let target = eval(object, env)?;
            call_method(&target, method, args)
        }
        _ => fail("expression is not a function"),
    }
}

fn arg(args: &[Scalar], index: usize) -> Scalar {
    args.get(index).cloned().unwrap_or(Scalar::Undefined)
}

fn call_global(name: &str, args: &[Scalar]) -> ExprResult<Scalar> {
    match name {
        "String" => Ok(Scalar::Str(arg(args, 0).to_text())),
        "Number" => Ok(Scalar::Number(match args.first() {
            None => 0.0,
            Some(value) => value.to_number(),
        })),
        "parseInt" => {
            let text = arg(args, 0).to_text();
            let trimmed = text.trim();
            let (sign, digits) = match trimmed.strip_prefix('-') {
                Some(rest) => (-1.0, rest),
                None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
            };
            let digits: String = digits.chars().take_while(|c| c.is_ascii_digit()).collect();
            Ok(Scalar::Number(
                digits.parse::<f64>().map(|n| sign * n).unwrap_or(f64::NAN),
            ))
        }
        "parseFloat" => Ok(Scalar::Number(
            arg(args, 0).to_text().trim().parse().unwrap_or(f64::NAN),
        )),
        _ => fail(format!("`{}` is not a function", name)),
    }
}

fn call_math(method: &str, args: &[Scalar]) -> ExprResult<Scalar> {
    let x = arg(args, 0).to_number();
    let value = match method {
        "floor" => x.floor(),
        "ceil" => x.ceil(),
        "round" => (x + 0.5).floor(),
        "trunc" => x.trunc(),
        "abs" => x.abs(),
        "sign" => {
            if x == 0.0 || x.is_nan() {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "pow" => x.powf(arg(args, 1).to_number()),
        "min" => fold_numbers(args, f64::INFINITY, f64::min),
        "max" => fold_numbers(args, f64::NEG_INFINITY, f64::max),
        _ => return fail(format!("Math.{} is not a function", method)),
    };
    Ok(Scalar::Number(value))
}

/// `NaN` in any argument poisons the result
fn fold_numbers(args: &[Scalar], init: f64, pick: fn(f64, f64) -> f64) -> f64 {
    args.iter().map(Scalar::to_number).fold(init, |acc, n| {
        if acc.is_nan() || n.is_nan() {
            f64::NAN
        } else {
            pick(acc, n)
        }
    })
}

/// Resolve a JS-style relative index into `0..=len`
fn relative_index(value: &Scalar, len: usize, default: usize) -> usize {
    if matches!(value, Scalar::Undefined) {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn call_method(target: &Scalar, method: &str, args: &[Scalar]) -> ExprResult<Scalar> {
    match target {
        Scalar::Str(s) => string_method(s, method, args),
        Scalar::Number(n) => match method {
            "toFixed" => {
                let digits = arg(args, 0).to_number();
                let digits = if digits.is_nan() { 0 } else { digits.clamp(0.0, 20.0) as usize };
                Ok(Scalar::Str(format!("{:.*}", digits, n)))
            }
            "toString" => Ok(Scalar::Str(number_to_text(*n))),
            _ => fail(format!("number has no method `{}`", method)),
        },
        Scalar::Bool(b) if method == "toString" => Ok(Scalar::Str(b.to_string())),
        _ => fail(format!(
            "cannot call `{}` on {}",
            method,
            target.type_name()
        )),
    }
}

fn string_method(s: &str, method: &str, args: &[Scalar]) -> ExprResult<Scalar> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let text = |range: std::ops::Range<usize>| -> String { chars[range].iter().collect() };

    let value = match method {
        "toUpperCase" => Scalar::Str(s.to_uppercase()),
        "toLowerCase" => Scalar::Str(s.to_lowercase()),
        "trim" => Scalar::Str(s.trim().to_string()),
        "toString" => Scalar::Str(s.to_string()),
        "slice" => {
            let start = relative_index(&arg(args, 0), len, 0);
            let end = relative_index(&arg(args, 1), len, len);
            Scalar::Str(if start < end { text(start..end) } else { String::new() })
        }
        "substring" => {
            let clamp = |value: Scalar, default: usize| -> usize {
                if matches!(value, Scalar::Undefined) {
                    return default;
                }
                let n = value.to_number();
                if n.is_nan() || n < 0.0 {
                    0
                } else {
                    (n as usize).min(len)
                }
            };
            let a = clamp(arg(args, 0), 0);
            let b = clamp(arg(args, 1), len);
            Scalar::Str(text(a.min(b)..a.max(b)))
        }
        "charAt" => {
            let i = arg(args, 0).to_number();
            let i = if i.is_nan() { 0.0 } else { i };
            Scalar::Str(if i >= 0.0 && (i as usize) < len {
                chars[i as usize].to_string()
            } else {
                String::new()
            })
        }
        "padStart" | "padEnd" => {
            let target_len = arg(args, 0).to_number();
            if target_len > MAX_GENERATED {
                return fail("invalid pad length");
            }
            let target_len = if target_len.is_nan() { 0 } else { target_len.max(0.0) as usize };
            let filler = match arg(args, 1) {
                Scalar::Undefined => " ".to_string(),
                other => other.to_text(),
            };
            if target_len <= len || filler.is_empty() {
                Scalar::Str(s.to_string())
            } else {
                let pad: String = filler.chars().cycle().take(target_len - len).collect();
                Scalar::Str(if method == "padStart" {
                    format!("{}{}", pad, s)
                } else {
                    format!("{}{}", s, pad)
                })
            }
        }
        "replace" => Scalar::Str(s.replacen(&arg(args, 0).to_text(), &arg(args, 1).to_text(), 1)),
        "replaceAll" => {
            let pattern = arg(args, 0).to_text();
            if pattern.is_empty() {
                return fail("replaceAll requires a non-empty pattern");
            }
            Scalar::Str(s.replace(&pattern, &arg(args, 1).to_text()))
        }
        "includes" => Scalar::Bool(s.contains(&arg(args, 0).to_text())),
        "startsWith" => Scalar::Bool(s.starts_with(&arg(args, 0).to_text())),
        "endsWith" => Scalar::Bool(s.ends_with(&arg(args, 0).to_text())),
        "indexOf" => {
            let needle = arg(args, 0).to_text();
            Scalar::Number(match s.find(&needle) {
                Some(byte) => s[..byte].chars().count() as f64,
                None => -1.0,
            })
        }
        "repeat" => {
            let count = arg(args, 0).to_number();
            if count.is_nan() || count < 0.0 || count > MAX_GENERATED {
                return fail("invalid repeat count");
            }
            Scalar::Str(s.repeat(count as usize))
        }
        _ => return fail(format!("string has no method `{}`", method)),
    };
    Ok(value)
}
