//! Arithmetic expression parser and evaluator.
//!
//! Grammar, evaluated left to right with the usual precedence:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | primary
//! primary := number | '(' expr ')'
//! ```
//!
//! Nothing else is accepted, so arbitrary input can never do more than
//! arithmetic.

use crate::error::{Error, Result};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' | '×' => Token::Star,
            '/' | '÷' => Token::Slash,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| Error::expression(format!("invalid number '{}'", literal)))?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            other => {
                return Err(Error::expression(format!(
                    "unsupported character '{}' at position {}",
                    other, i
                )))
            }
        };
        tokens.push((i, token));
        i += 1;
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).map(|(_, token)| *token)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.peek();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            value = if op == Token::Star {
                value * rhs
            } else {
                if rhs == 0.0 {
                    return Err(Error::expression("division by zero"));
                }
                value / rhs
            };
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.nested(|p| p.unary()).map(|v| -v)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(|p| p.unary())
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.nested(|p| p.expr())?;
                match self.advance() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(Error::expression("missing closing parenthesis")),
                }
            }
            Some(token) => Err(Error::expression(format!(
                "unexpected {:?} at position {}",
                token,
                self.tokens[self.pos - 1].0
            ))),
            None => Err(Error::expression("unexpected end of expression")),
        }
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Result<f64>) -> Result<f64> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::expression("expression is nested too deeply"));
        }
        let value = f(self);
        self.depth -= 1;
        value
    }
}

/// Evaluate an arithmetic expression
pub fn evaluate(expression: &str) -> Result<f64> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(Error::expression("empty expression"));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if let Some((position, token)) = parser.tokens.get(parser.pos) {
        return Err(Error::expression(format!(
            "unexpected {:?} at position {}",
            token, position
        )));
    }
    if !value.is_finite() {
        return Err(Error::expression("result is not a finite number"));
    }
    Ok(value)
}

/// Render a result the way a person would write it: `87`, `2.5`.
/// Magnitudes too small for ten decimals use scientific notation.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        // normalises -0
        format!("{}", value as i64)
    } else if value.abs() < 1e-10 {
        format!("{:e}", value)
    } else {
        let text = format!("{:.10}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Evaluate and format in one step
pub fn calculate(expression: &str) -> Result<String> {
    evaluate(expression).map(format_number)
}
