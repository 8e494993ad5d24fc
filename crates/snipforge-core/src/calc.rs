//! Restricted arithmetic evaluator for `{{calc:...}}` placeholders.
//!
//! The language is closed: numbers, identifiers bound by the caller, the
//! operators `+ - * / % ^`, unary minus, parentheses and a fixed function
//! table. There is no other way to reach code or data.

use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

/// Nesting deeper than this is rejected instead of recursing further.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot evaluate expression: {reason}")]
pub struct EvalError {
    pub reason: String,
}

impl EvalError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

type EvalResult<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Arity {
    Exactly(usize),
    AtLeast(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Round,
    Floor,
    Ceil,
    Abs,
    Min,
    Max,
    Pow,
    Sqrt,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "round" => Some(Function::Round),
            "floor" => Some(Function::Floor),
            "ceil" => Some(Function::Ceil),
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "pow" => Some(Function::Pow),
            "sqrt" => Some(Function::Sqrt),
            _ => None,
        }
    }

    fn arity(self) -> Arity {
        match self {
            Function::Min | Function::Max => Arity::AtLeast(2),
            Function::Pow => Arity::Exactly(2),
            _ => Arity::Exactly(1),
        }
    }

    fn apply(self, args: &[f64]) -> EvalResult<f64> {
        let value = match self {
            Function::Round => args[0].round(),
            Function::Floor => args[0].floor(),
            Function::Ceil => args[0].ceil(),
            Function::Abs => args[0].abs(),
            Function::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Function::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Function::Pow => args[0].powf(args[1]),
            Function::Sqrt => {
                if args[0] < 0.0 {
                    return Err(EvalError::new("square root of a negative number"));
                }
                args[0].sqrt()
            }
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    /// `field:<name>` reference.
    Field(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(expression: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match c {
            '0'..='9' | '.' => Token::Number(read_number(&mut chars)?),
            c if c.is_ascii_alphabetic() || c == '_' => {
                let name = read_ident(&mut chars);
                if name == "field" && chars.peek() == Some(&':') {
                    chars.next();
                    match chars.peek() {
                        Some(&next) if next.is_ascii_alphabetic() || next == '_' => {
                            Token::Field(read_ident(&mut chars))
                        }
                        _ => return Err(EvalError::new("expected a field name after 'field:'")),
                    }
                } else {
                    Token::Ident(name)
                }
            }
            _ => {
                chars.next();
                match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '^' => Token::Caret,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    other => {
                        return Err(EvalError::new(format!("unexpected character '{}'", other)))
                    }
                }
            }
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> EvalResult<f64> {
    let mut literal = String::new();
    let mut seen_dot = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            literal.push(c);
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            literal.push(c);
        } else {
            break;
        }
        chars.next();
    }

    literal
        .parse::<f64>()
        .map_err(|_| EvalError::new(format!("invalid number '{}'", literal)))
}

fn read_ident(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut name = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            name.push(c);
            chars.next();
        } else {
            break;
        }
    }
    name
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

impl BinaryOp {
    fn from_token(token: &Token) -> Option<Self> {
        match token {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            Token::Star => Some(BinaryOp::Mul),
            Token::Slash => Some(BinaryOp::Div),
            Token::Percent => Some(BinaryOp::Rem),
            Token::Caret => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 2,
            BinaryOp::Pow => 4,
        }
    }

    fn right_associative(self) -> bool {
        self == BinaryOp::Pow
    }

    fn apply(self, lhs: f64, rhs: f64) -> EvalResult<f64> {
        match self {
            BinaryOp::Add => Ok(lhs + rhs),
            BinaryOp::Sub => Ok(lhs - rhs),
            BinaryOp::Mul => Ok(lhs * rhs),
            BinaryOp::Div => {
                if rhs == 0.0 {
                    return Err(EvalError::new("division by zero"));
                }
                Ok(lhs / rhs)
            }
            BinaryOp::Rem => {
                if rhs == 0.0 {
                    return Err(EvalError::new("modulo by zero"));
                }
                // Floored modulo: the result takes the sign of the divisor.
                Ok(lhs - rhs * (lhs / rhs).floor())
            }
            BinaryOp::Pow => Ok(lhs.powf(rhs)),
        }
    }
}

/// Binds tighter than `*` but looser than `^`, so `-2^2` is `-4`.
const UNARY_PRECEDENCE: u8 = 3;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> EvalResult<()> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(EvalError::new(format!(
                "expected {} but found {}",
                what,
                describe(&token)
            ))),
            None => Err(EvalError::new(format!(
                "expected {} but the expression ended",
                what
            ))),
        }
    }

    fn parse(mut self) -> EvalResult<Expr> {
        if self.tokens.is_empty() {
            return Err(EvalError::new("empty expression"));
        }
        let expr = self.expression(0)?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(EvalError::new(format!(
                "unexpected {} after the expression",
                describe(token)
            ))),
        }
    }

    fn expression(&mut self, min_precedence: u8) -> EvalResult<Expr> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::new("expression is nested too deeply"));
        }

        let mut lhs = self.unary()?;
        while let Some(op) = self.peek().and_then(BinaryOp::from_token) {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let next_min = if op.right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.expression(next_min)?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }

        self.depth -= 1;
        Ok(lhs)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.advance();
            let operand = self.expression(UNARY_PRECEDENCE)?;
            return Ok(Expr::Negate(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LParen) => {
                let inner = self.expression(0)?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Field(name)) => Ok(Expr::Variable(name)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let function = Function::lookup(&name)
                        .ok_or_else(|| EvalError::new(format!("unknown function '{}'", name)))?;
                    self.advance();
                    let args = self.arguments()?;
                    check_arity(&name, function, args.len())?;
                    Ok(Expr::Call(function, args))
                } else if Function::lookup(&name).is_some() {
                    Err(EvalError::new(format!(
                        "function '{}' must be called with arguments",
                        name
                    )))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(token) => Err(EvalError::new(format!("unexpected {}", describe(&token)))),
            None => Err(EvalError::new("unexpected end of expression")),
        }
    }

    fn arguments(&mut self) -> EvalResult<Vec<Expr>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression(0)?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => {
                    return Err(EvalError::new(format!(
                        "expected ',' or ')' but found {}",
                        describe(&token)
                    )))
                }
                None => return Err(EvalError::new("unclosed function call")),
            }
        }
    }
}

fn check_arity(name: &str, function: Function, count: usize) -> EvalResult<()> {
    match function.arity() {
        Arity::Exactly(n) if count != n => Err(EvalError::new(format!(
            "{}() takes {} argument(s), got {}",
            name, n, count
        ))),
        Arity::AtLeast(n) if count < n => Err(EvalError::new(format!(
            "{}() takes at least {} arguments, got {}",
            name, n, count
        ))),
        _ => Ok(()),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(value) => format!("number {}", value),
        Token::Ident(name) => format!("'{}'", name),
        Token::Field(name) => format!("'field:{}'", name),
        Token::Plus => "'+'".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Star => "'*'".to_string(),
        Token::Slash => "'/'".to_string(),
        Token::Percent => "'%'".to_string(),
        Token::Caret => "'^'".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

fn eval(expr: &Expr, bindings: &HashMap<String, String>) -> EvalResult<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => resolve_binding(name, bindings),
        Expr::Negate(inner) => Ok(-eval(inner, bindings)?),
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, bindings)?;
            let rhs = eval(rhs, bindings)?;
            op.apply(lhs, rhs)
        }
        Expr::Call(function, args) => {
            let values = args
                .iter()
                .map(|arg| eval(arg, bindings))
                .collect::<EvalResult<Vec<_>>>()?;
            function.apply(&values)
        }
    }
}

fn resolve_binding(name: &str, bindings: &HashMap<String, String>) -> EvalResult<f64> {
    let raw = bindings
        .get(name)
        .ok_or_else(|| EvalError::new(format!("unknown identifier '{}'", name)))?;
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| EvalError::new(format!("'{}' is not a number: {:?}", name, raw)))?;
    if !value.is_finite() {
        return Err(EvalError::new(format!("'{}' is not a number: {:?}", name, raw)));
    }
    Ok(value)
}

/// Evaluate `expression`, resolving identifiers and `field:<name>`
/// references against `bindings`.
pub fn evaluate(expression: &str, bindings: &HashMap<String, String>) -> Result<f64, EvalError> {
    let tokens = tokenize(expression)?;
    let expr = Parser::new(tokens).parse()?;
    let value = eval(&expr, bindings)?;
    if !value.is_finite() {
        return Err(EvalError::new("result is not a finite number"));
    }
    Ok(value)
}

/// Field names referenced as `field:<name>` inside an expression, in order
/// of first appearance.
pub fn referenced_fields(expression: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    if let Ok(tokens) = tokenize(expression) {
        for token in tokens {
            if let Token::Field(name) = token {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Render a result rounded to two decimals without trailing zeros.
pub fn format_number(value: f64) -> String {
    let fixed = format!("{:.2}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
