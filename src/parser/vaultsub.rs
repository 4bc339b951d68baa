//! The vault sub-operator grammar:
//!
//! ```text
//! expr    := choice
//! choice  := concat ( '|' concat )*
//! concat  := unary ( unary )*          -- implicit space concatenation
//! unary   := '(' expr ')' | Literal | Reference | EnvVar | OperatorCall
//! ```
//!
//! `|` binds looser than implicit concatenation but tighter than `||`
//! (which never appears inside this grammar — the caller has already split
//! any top-level `||` fallback off before invoking this parser).

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::token::{Lit, Token};
use crate::tree::Cursor;

pub fn parse(tokens: Vec<Token>) -> Result<Expr> {
    let mut parser = SubParser { tokens, pos: 0 };
    let expr = parser.choice()?;
    if !parser.at_eof() {
        return Err(EngineError::ParseError(format!(
            "unexpected trailing token {} in vault sub-expression",
            parser.peek()
        )));
    }
    Ok(expr)
}

/// Entry point for a vault-family opcall's primary argument (the part
/// before any `|| default`). If `|`/`(` appears anywhere, the sub-operator
/// grammar owns the whole thing (choice/group/concat as written). Otherwise
/// this is a flat run of space-separated expressions, and two or more of
/// them that each look like a vault path (a string literal containing `:`)
/// are independent vault-try candidates rather than one concatenated path.
pub fn parse_primary(tokens: Vec<Token>) -> Result<Expr> {
    if tokens
        .iter()
        .any(|t| matches!(t, Token::Pipe | Token::OpenParen))
    {
        return parse(tokens);
    }

    let mut parser = SubParser { tokens, pos: 0 };
    let mut parts = vec![parser.unary()?];
    while parser.starts_unary() {
        parts.push(parser.unary()?);
    }
    if !parser.at_eof() {
        return Err(EngineError::ParseError(format!(
            "unexpected trailing token {} in vault sub-expression",
            parser.peek()
        )));
    }

    let fold: fn(Expr, Expr) -> Expr = if parts.len() > 1 && parts.iter().all(looks_like_vault_path) {
        |acc, e| Expr::VaultChoice {
            left: Box::new(acc),
            right: Box::new(e),
        }
    } else {
        |acc, e| Expr::List {
            left: Box::new(acc),
            right: Box::new(e),
        }
    };
    Ok(parts.into_iter().reduce(fold).unwrap())
}

fn looks_like_vault_path(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(Lit::String(s)) if s.contains(':'))
}

struct SubParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl SubParser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        if !matches!(tok, Token::Eof) {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof | Token::CloseParen)
    }

    fn choice(&mut self) -> Result<Expr> {
        let mut left = self.concat()?;
        while matches!(self.peek(), Token::Pipe) {
            self.advance();
            let right = self.concat()?;
            left = Expr::VaultChoice {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn concat(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        while self.starts_unary() {
            let right = self.unary()?;
            left = Expr::List {
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn starts_unary(&self) -> bool {
        matches!(
            self.peek(),
            Token::OpenParen | Token::Literal(_) | Token::Reference(_) | Token::EnvVar(_) | Token::Operator(_)
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::OpenParen => {
                let inner = self.choice()?;
                match self.advance() {
                    Token::CloseParen => Ok(Expr::VaultGroup(Box::new(inner))),
                    other => Err(EngineError::ParseError(format!(
                        "expected `)` in vault sub-expression, found {}",
                        other
                    ))),
                }
            }
            Token::Literal(lit) => Ok(Expr::Literal(lit)),
            Token::Reference(path) => Ok(Expr::Reference(Cursor::parse(&path))),
            Token::EnvVar(name) => Ok(Expr::EnvVar(name)),
            Token::Operator(name) => {
                let (op, target) = crate::parser::split_target(&name);
                let mut args = Vec::new();
                while self.starts_unary() {
                    args.push(self.unary()?);
                }
                Ok(Expr::OperatorCall { op, target, args })
            }
            other => Err(EngineError::ParseError(format!(
                "unexpected token {} in vault sub-expression",
                other
            ))),
        }
    }
}
