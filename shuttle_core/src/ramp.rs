//! Velocity-sweep ramp expressions.
//!
//! A ramp is a small arithmetic expression over the sample position `z` (cm)
//! and the local field `Bz` (mT) that scales the base speed while the shuttle
//! is in transit. Only a fixed grammar is accepted:
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := ('-' | '+') unary | power
//! power := atom (('^' | '**') unary)?
//! atom  := number | 'z' | 'Bz' | func '(' expr ')' | '(' expr ')'
//! func  := 'exp' | 'log' | 'ln'   (optionally prefixed with 'math.')
//! ```
//!
//! The expression is parsed once and evaluated every sweep tick.

use std::fmt;
use std::str::FromStr;

use crate::error::ShuttleError;

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RampVariable {
    /// `z`, distance above the magnet centre in cm
    Position,
    /// `Bz`, field at the sample in mT
    Field,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Exp,
    Ln,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    Var(RampVariable),
    Neg(Box<Node>),
    Bin(BinOp, Box<Node>, Box<Node>),
    Call(Func, Box<Node>),
}

impl Node {
    fn eval(&self, z_cm: f64, field_mt: f64) -> f64 {
        match self {
            Self::Num(v) => *v,
            Self::Var(RampVariable::Position) => z_cm,
            Self::Var(RampVariable::Field) => field_mt,
            Self::Neg(n) => -n.eval(z_cm, field_mt),
            Self::Bin(op, l, r) => {
                let (a, b) = (l.eval(z_cm, field_mt), r.eval(z_cm, field_mt));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Self::Call(Func::Exp, n) => n.eval(z_cm, field_mt).exp(),
            Self::Call(Func::Ln, n) => n.eval(z_cm, field_mt).ln(),
        }
    }

    fn references(&self, var: RampVariable) -> bool {
        match self {
            Self::Num(_) => false,
            Self::Var(v) => *v == var,
            Self::Neg(n) | Self::Call(_, n) => n.references(var),
            Self::Bin(_, l, r) => l.references(var) || r.references(var),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ShuttleError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b'+' => {
                out.push(Token::Plus);
                i += 1;
            }
            b'-' => {
                out.push(Token::Minus);
                i += 1;
            }
            b'*' if bytes.get(i + 1) == Some(&b'*') => {
                out.push(Token::Pow);
                i += 2;
            }
            b'*' => {
                out.push(Token::Star);
                i += 1;
            }
            b'/' => {
                out.push(Token::Slash);
                i += 1;
            }
            b'^' => {
                out.push(Token::Pow);
                i += 1;
            }
            b'(' => {
                out.push(Token::LParen);
                i += 1;
            }
            b')' => {
                out.push(Token::RParen);
                i += 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = i;
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                // Exponent only when followed by digits, so `2exp(...)` is not eaten.
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        while j < bytes.len() && bytes[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text = &src[start..i];
                let v: f64 = text.parse().map_err(|_| {
                    ShuttleError::InvalidRampExpression(format!("bad number '{text}'"))
                })?;
                out.push(Token::Num(v));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'.')
                {
                    i += 1;
                }
                out.push(Token::Ident(src[start..i].to_string()));
            }
            _ => {
                let ch = src[i..].chars().next().unwrap_or('?');
                return Err(ShuttleError::InvalidRampExpression(format!(
                    "unexpected character '{ch}' at offset {i}"
                )));
            }
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn enter(&mut self) -> Result<(), ShuttleError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ShuttleError::InvalidRampExpression(
                "expression nested too deeply".into(),
            ));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Node, ShuttleError> {
        self.enter()?;
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        self.depth -= 1;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node, ShuttleError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node, ShuttleError> {
        self.enter()?;
        let node = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Node::Neg(Box::new(self.unary()?))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()?
            }
            _ => self.power()?,
        };
        self.depth -= 1;
        Ok(node)
    }

    fn power(&mut self) -> Result<Node, ShuttleError> {
        let base = self.atom()?;
        if matches!(self.peek(), Some(Token::Pow)) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(Node::Bin(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Node, ShuttleError> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Node::Num(v)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "z" => Ok(Node::Var(RampVariable::Position)),
                "Bz" => Ok(Node::Var(RampVariable::Field)),
                _ => {
                    let func = match name.strip_prefix("math.").unwrap_or(&name) {
                        "exp" => Func::Exp,
                        "log" | "ln" => Func::Ln,
                        _ => {
                            return Err(ShuttleError::InvalidRampExpression(format!(
                                "unknown identifier '{name}'"
                            )));
                        }
                    };
                    if self.next() != Some(Token::LParen) {
                        return Err(ShuttleError::InvalidRampExpression(format!(
                            "expected '(' after '{name}'"
                        )));
                    }
                    let arg = self.expr()?;
                    self.expect_rparen()?;
                    Ok(Node::Call(func, Box::new(arg)))
                }
            },
            Some(t) => Err(ShuttleError::InvalidRampExpression(format!(
                "unexpected token {t:?}"
            ))),
            None => Err(ShuttleError::InvalidRampExpression(
                "unexpected end of expression".into(),
            )),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), ShuttleError> {
        match self.next() {
            Some(Token::RParen) => Ok(()),
            _ => Err(ShuttleError::InvalidRampExpression("missing ')'".into())),
        }
    }
}

/// Parsed ramp expression.
#[derive(Debug, Clone, PartialEq)]
pub struct RampExpr {
    source: String,
    root: Node,
}

impl RampExpr {
    /// Parse a ramp. Fails when the text does not follow the grammar or when
    /// it references neither `z` nor `Bz`.
    pub fn parse(src: &str) -> Result<Self, ShuttleError> {
        let tokens = tokenize(src)?;
        if tokens.is_empty() {
            return Err(ShuttleError::InvalidRampExpression("empty expression".into()));
        }
        let mut p = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = p.expr()?;
        if let Some(t) = p.peek() {
            return Err(ShuttleError::InvalidRampExpression(format!(
                "trailing input at {t:?}"
            )));
        }
        if !root.references(RampVariable::Position) && !root.references(RampVariable::Field) {
            return Err(ShuttleError::InvalidRampExpression(
                "expression references neither z nor Bz".into(),
            ));
        }
        Ok(Self {
            source: src.trim().to_string(),
            root,
        })
    }

    #[must_use]
    pub fn references(&self, var: RampVariable) -> bool {
        self.root.references(var)
    }

    /// `Bz` when the field is referenced, otherwise `z`.
    #[must_use]
    pub fn primary_variable(&self) -> RampVariable {
        if self.references(RampVariable::Field) {
            RampVariable::Field
        } else {
            RampVariable::Position
        }
    }

    /// Speed factor at the given position and field. May be non-finite.
    #[must_use]
    pub fn eval(&self, z_cm: f64, field_mt: f64) -> f64 {
        self.root.eval(z_cm, field_mt)
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for RampExpr {
    type Err = ShuttleError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RampExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, z: f64, b: f64) -> f64 {
        RampExpr::parse(src).unwrap().eval(z, b)
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("z + 2 * 3", 1.0, 0.0), 7.0);
        assert_eq!(eval("z - 2 - 3", 10.0, 0.0), 5.0);
        assert_eq!(eval("2 ^ 3 ^ 2 * z", 1.0, 0.0), 512.0);
        assert_eq!(eval("-z ** 2", 3.0, 0.0), -9.0);
        assert_eq!(eval("z ** -1", 4.0, 0.0), 0.25);
    }

    #[test]
    fn scientific_numbers_and_functions() {
        assert!((eval("1e-3 * Bz", 0.0, 5000.0) - 5.0).abs() < 1e-12);
        assert!((eval("math.exp(0) * z", 2.0, 0.0) - 2.0).abs() < 1e-12);
        assert!((eval("ln(exp(z))", 1.5, 0.0) - 1.5).abs() < 1e-12);
        assert!((eval("log(z)", std::f64::consts::E, 0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let src = format!("{}z{}", "(".repeat(200), ")".repeat(200));
        assert!(RampExpr::parse(&src).is_err());
    }
}
