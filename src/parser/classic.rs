//! Precedence-climbing parser for the classic (non-vault) grammar.

use crate::ast::Expr;
use crate::error::{EngineError, Result};
use crate::parser::ParsedCall;
use crate::token::{Lit, Token};
use crate::tree::Cursor;

/// Precedence tiers, high to low:
/// unary `!` > `* / %` > `+ -` > `< <= > >=` > `== !=` > `&&` > `||` >
/// ternary `? :`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Ternary,
    Or,
    And,
    Equality,
    Comparison,
    AddSub,
    MulDiv,
    Unary,
    Primary,
}

impl Prec {
    fn of(op: &str) -> Option<Prec> {
        Some(match op {
            "*" | "/" | "%" => Prec::MulDiv,
            "+" | "-" => Prec::AddSub,
            "<" | "<=" | ">" | ">=" => Prec::Comparison,
            "==" | "!=" => Prec::Equality,
            "&&" => Prec::And,
            _ => return None,
        })
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser { tokens, pos: 0 }
    }

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
        matches!(self.peek(), Token::Eof)
    }

    /// Parses the whole body: a head-operator call, or a pure expression
    /// wrapped in a synthetic `calc` opcall.
    pub fn parse_top(mut self, is_known_operator: &dyn Fn(&str) -> bool) -> Result<ParsedCall> {
        let _ = is_known_operator;
        if let Token::Operator(name) = self.peek().clone() {
            self.advance();
            let (op, target) = crate::parser::split_target(&name);
            let mut args = Vec::new();
            while !self.at_eof() {
                if matches!(self.peek(), Token::Comma) {
                    self.advance();
                    continue;
                }
                args.push(self.parse_expr(Prec::Ternary, true)?);
            }
            return Ok(ParsedCall { op, target, args });
        }

        let expr = self.parse_expr(Prec::Ternary, true)?;
        if !self.at_eof() {
            return Err(EngineError::ParseError(format!(
                "unexpected trailing token {}",
                self.peek()
            )));
        }
        Ok(ParsedCall {
            op: "calc".to_string(),
            target: None,
            args: vec![expr],
        })
    }

    /// `top` is true only for the outermost parse of one argument slot; it
    /// controls whether an encountered `||` produces `LogicalOr` (the
    /// default-fallback form) instead of a boolean `OperatorCall`.
    fn parse_expr(&mut self, min_prec: Prec, top: bool) -> Result<Expr> {
        let mut left = self.parse_unary()?;

        loop {
            match self.peek().clone() {
                Token::LogicalOr if min_prec <= Prec::Or => {
                    self.advance();
                    let right = self.parse_expr(Prec::Ternary, false)?;
                    left = if top {
                        Expr::LogicalOr {
                            left: Box::new(left),
                            right: Box::new(right),
                        }
                    } else {
                        Expr::operator_call("||", vec![left, right])
                    };
                }
                Token::Operator(ref name) if name == "&&" && min_prec <= Prec::And => {
                    self.advance();
                    let right = self.parse_expr(Prec::Or, false)?;
                    left = Expr::operator_call("&&", vec![left, right]);
                }
                Token::Operator(ref name) if Prec::of(name).map_or(false, |p| min_prec <= p) => {
                    let op = name.clone();
                    let prec = Prec::of(&op).unwrap();
                    self.advance();
                    // left-associative: parse the right side at one tier
                    // tighter than this operator's own tier.
                    let next_min = match prec {
                        Prec::MulDiv => Prec::Unary,
                        Prec::AddSub => Prec::MulDiv,
                        Prec::Comparison => Prec::AddSub,
                        Prec::Equality => Prec::Comparison,
                        _ => unreachable!(),
                    };
                    let right = self.parse_expr(next_min, false)?;
                    left = Expr::operator_call(op, vec![left, right]);
                }
                Token::Operator(ref name) if name == "?" && min_prec <= Prec::Ternary => {
                    self.advance();
                    let then_branch = self.parse_expr(Prec::Ternary, false)?;
                    self.expect_operator(":")?;
                    let else_branch = self.parse_expr(Prec::Ternary, false)?;
                    left = Expr::operator_call("ternary", vec![left, then_branch, else_branch]);
                }
                _ => break,
            }
        }

        Ok(left)
    }

    fn expect_operator(&mut self, expected: &str) -> Result<()> {
        match self.advance() {
            Token::Operator(name) if name == expected => Ok(()),
            other => Err(EngineError::ParseError(format!(
                "expected `{}`, found {}",
                expected, other
            ))),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if let Token::Operator(name) = self.peek().clone() {
            if name == "!" {
                self.advance();
                let inner = self.parse_unary()?;
                return Ok(Expr::operator_call("!", vec![inner]));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Token::Literal(lit) => Ok(Expr::Literal(lit)),
            Token::Reference(path) => Ok(Expr::Reference(Cursor::parse(&path))),
            Token::EnvVar(name) => Ok(Expr::EnvVar(name)),
            Token::OpenParen => {
                let inner = self.parse_expr(Prec::Ternary, false)?;
                match self.advance() {
                    Token::CloseParen => Ok(inner),
                    other => Err(EngineError::ParseError(format!(
                        "expected `)`, found {}",
                        other
                    ))),
                }
            }
            Token::Operator(name) => {
                let (op, target) = crate::parser::split_target(&name);
                let mut args = Vec::new();
                // a nested operator call consumes arguments greedily, up
                // to the enclosing close-paren or end of expression; we
                // stop when the next token cannot start a new primary.
                while self.starts_primary() {
                    args.push(self.parse_unary_chain()?);
                }
                Ok(Expr::OperatorCall { op, target, args })
            }
            Token::Eof => Err(EngineError::ParseError(
                "unexpected end of expression".to_string(),
            )),
            other => Err(EngineError::ParseError(format!(
                "unexpected token {}",
                other
            ))),
        }
    }

    /// Parses one argument of a bare (non-parenthesized) nested operator
    /// call: a full precedence chain, so `concat a + b` still lets `a + b`
    /// bind together as a single argument.
    fn parse_unary_chain(&mut self) -> Result<Expr> {
        self.parse_expr(Prec::MulDiv, false)
    }

    fn starts_primary(&self) -> bool {
        matches!(
            self.peek(),
            Token::Literal(_) | Token::Reference(_) | Token::EnvVar(_) | Token::OpenParen
        ) || matches!(self.peek(), Token::Operator(name) if name == "!")
    }
}

/// Parses a single classic expression out of `tokens`, requiring it to
/// consume every token. Used for the default-fallback side of a vault
/// operator's `||`, which is an ordinary expression even though the
/// primary side uses the vault sub-operator grammar.
pub fn parse_single_expr(tokens: Vec<Token>) -> Result<Expr> {
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr(Prec::Ternary, false)?;
    if !parser.at_eof() {
        return Err(EngineError::ParseError(format!(
            "unexpected trailing token {}",
            parser.peek()
        )));
    }
    Ok(expr)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::operators::OperatorRegistry;

    fn parse(body: &str) -> ParsedCall {
        let registry = OperatorRegistry::with_builtins();
        crate::parser::parse_body(body, &|name| registry.contains(name)).unwrap()
    }

    #[test]
    fn arithmetic_precedence() {
        let call = parse("(base * multiplier) + addend");
        assert_eq!(call.op, "calc");
        // (base * multiplier) + addend -> Add(Mul(base,multiplier), addend)
        match &call.args[0] {
            Expr::OperatorCall { op, args, .. } => {
                assert_eq!(op, "+");
                match &args[0] {
                    Expr::OperatorCall { op, .. } => assert_eq!(op, "*"),
                    other => panic!("expected nested mul, got {:?}", other),
                }
            }
            other => panic!("expected add, got {:?}", other),
        }
    }

    #[test]
    fn grab_takes_single_reference_argument() {
        let call = parse("grab meta.base");
        assert_eq!(call.op, "grab");
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.args[0], Expr::Reference(Cursor::parse("meta.base")));
    }

    #[test]
    fn top_level_double_pipe_is_logical_or() {
        let call = parse("grab secret.key || \"fallback\"");
        assert_eq!(call.op, "grab");
        assert_eq!(call.args.len(), 1);
        assert!(matches!(call.args[0], Expr::LogicalOr { .. }));
    }

    #[test]
    fn target_suffix_is_split_from_operator_name() {
        let call = parse("vault@staging \"secret/db:password\"");
        assert_eq!(call.op, "vault");
        assert_eq!(call.target.as_deref(), Some("staging"));
    }

    #[test]
    fn ternary_is_parsed() {
        let call = parse("a > b ? \"yes\" : \"no\"");
        assert_eq!(call.op, "calc");
        match &call.args[0] {
            Expr::OperatorCall { op, args, .. } => {
                assert_eq!(op, "ternary");
                assert_eq!(args.len(), 3);
            }
            other => panic!("expected ternary call, got {:?}", other),
        }
    }
}
