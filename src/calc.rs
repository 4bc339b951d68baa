//! The `calc` operator's arithmetic mini-expression language: a safe
//! numeric expression language supporting `+ - * / %` and the functions
//! `min, max, mod, pow, sqrt, floor, ceil`, all operating on float64.
//! Dotted identifiers are substituted with a resolved numeric value via
//! the supplied `resolve` callback.
//!
//! This is deliberately a separate, smaller grammar from the classic
//! `(( ... ))` parser: `calc`'s argument is an ordinary string literal
//! whose *contents* happen to be a formula, not a nested `(( ... ))`
//! expression.

use crate::error::{EngineError, Result};

pub fn eval(expr: &str, resolve: &dyn Fn(&str) -> Result<f64>) -> Result<f64> {
    let tokens = tokenize(expr)?;
    let mut parser = CalcParser { tokens, pos: 0, resolve };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(EngineError::ParseError(format!(
            "unexpected trailing input in calc expression `{}`",
            expr
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn tokenize(expr: &str) -> Result<Vec<Tok>> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Tok::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Tok::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Tok::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Tok::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Tok::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Tok::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Tok::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Tok::Comma);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut text = String::new();
                while matches!(chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
                    text.push(chars.next().unwrap());
                }
                let value: f64 = text.parse().map_err(|_| {
                    EngineError::ParseError(format!("invalid number `{}` in calc expression", text))
                })?;
                tokens.push(Tok::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::new();
                while matches!(chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_' || *c == '.') {
                    text.push(chars.next().unwrap());
                }
                tokens.push(Tok::Ident(text));
            }
            other => {
                return Err(EngineError::ParseError(format!(
                    "unexpected character `{}` in calc expression",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

struct CalcParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    resolve: &'a dyn Fn(&str) -> Result<f64>,
}

impl<'a> CalcParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => {
                    self.advance();
                    value += self.term()?;
                }
                Some(Tok::Minus) => {
                    self.advance();
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => {
                    self.advance();
                    value *= self.unary()?;
                }
                Some(Tok::Slash) => {
                    self.advance();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(EngineError::DivisionByZero);
                    }
                    value /= divisor;
                }
                Some(Tok::Percent) => {
                    self.advance();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(EngineError::DivisionByZero);
                    }
                    value %= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64> {
        if matches!(self.peek(), Some(Tok::Minus)) {
            self.advance();
            return Ok(-self.unary()?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64> {
        match self.advance() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::LParen) => {
                let value = self.expr()?;
                match self.advance() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(EngineError::ParseError(
                        "expected `)` in calc expression".to_string(),
                    )),
                }
            }
            Some(Tok::Ident(name)) => {
                if matches!(self.peek(), Some(Tok::LParen)) {
                    self.call(&name)
                } else {
                    (self.resolve)(&name)
                }
            }
            other => Err(EngineError::ParseError(format!(
                "unexpected token {:?} in calc expression",
                other
            ))),
        }
    }

    fn call(&mut self, name: &str) -> Result<f64> {
        self.advance(); // '('
        let mut args = Vec::new();
        if !matches!(self.peek(), Some(Tok::RParen)) {
            args.push(self.expr()?);
            while matches!(self.peek(), Some(Tok::Comma)) {
                self.advance();
                args.push(self.expr()?);
            }
        }
        match self.advance() {
            Some(Tok::RParen) => {}
            _ => {
                return Err(EngineError::ParseError(format!(
                    "expected `)` after arguments to `{}`",
                    name
                )))
            }
        }
        let arity_err = |n: usize| {
            EngineError::ParseError(format!(
                "`{}` expects {} argument(s), got {}",
                name,
                n,
                args.len()
            ))
        };
        match name {
            "min" if args.len() == 2 => Ok(args[0].min(args[1])),
            "max" if args.len() == 2 => Ok(args[0].max(args[1])),
            "mod" if args.len() == 2 => {
                if args[1] == 0.0 {
                    Err(EngineError::DivisionByZero)
                } else {
                    Ok(args[0] % args[1])
                }
            }
            "pow" if args.len() == 2 => Ok(args[0].powf(args[1])),
            "sqrt" if args.len() == 1 => Ok(args[0].sqrt()),
            "floor" if args.len() == 1 => Ok(args[0].floor()),
            "ceil" if args.len() == 1 => Ok(args[0].ceil()),
            "min" | "max" | "mod" | "pow" => Err(arity_err(2)),
            "sqrt" | "floor" | "ceil" => Err(arity_err(1)),
            other => Err(EngineError::UnknownOperator(other.to_string())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn no_refs(name: &str) -> Result<f64> {
        Err(EngineError::NotFound(crate::tree::Cursor::parse(name)))
    }

    #[test]
    fn basic_precedence() {
        assert_eq!(eval("1 + 2 * 3", &no_refs).unwrap(), 7.0);
    }

    #[test]
    fn functions() {
        assert_eq!(eval("max(1, 2)", &no_refs).unwrap(), 2.0);
        assert_eq!(eval("sqrt(9)", &no_refs).unwrap(), 3.0);
        assert_eq!(eval("floor(1.9)", &no_refs).unwrap(), 1.0);
        assert_eq!(eval("pow(2, 10)", &no_refs).unwrap(), 1024.0);
    }

    #[test]
    fn reference_substitution() {
        let resolve = |name: &str| -> Result<f64> {
            if name == "meta.base" {
                Ok(10.0)
            } else {
                Err(EngineError::NotFound(crate::tree::Cursor::parse(name)))
            }
        };
        assert_eq!(eval("meta.base * 2", &resolve).unwrap(), 20.0);
    }
}
