//! Tokenizes the body of a `(( ... ))` expression.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::{EngineError, Result};
use crate::token::{Lit, Token};

const OPERATOR_CHARS: &str = "!*/%+-<>=&|?:,";

/// Tokenizes `body` (the text strictly between `((` and `))`).
///
/// `is_known_operator` lets the lexer distinguish a bare identifier that
/// names a registered operator (-> `Token::Operator`) from a plain
/// dotted-path reference (-> `Token::Reference`).
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    is_known_operator: &'a dyn Fn(&str) -> bool,
}

impl<'a> Lexer<'a> {
    pub fn lex(body: &'a str, is_known_operator: &'a dyn Fn(&str) -> bool) -> Result<Vec<Token>> {
        let mut lexer = Lexer {
            chars: body.chars().peekable(),
            is_known_operator,
        };
        let mut tokens = Vec::new();
        loop {
            lexer.skip_whitespace();
            match lexer.next_token()? {
                Token::Eof => {
                    tokens.push(Token::Eof);
                    break;
                }
                token => tokens.push(token),
            }
        }
        Ok(tokens)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn next_token(&mut self) -> Result<Token> {
        let Some(&c) = self.chars.peek() else {
            return Ok(Token::Eof);
        };

        match c {
            '"' => self.lex_string(),
            '(' => {
                self.chars.next();
                Ok(Token::OpenParen)
            }
            ')' => {
                self.chars.next();
                Ok(Token::CloseParen)
            }
            '$' => self.lex_env_var(),
            '|' => self.lex_pipe(),
            c if c.is_ascii_digit() => self.lex_number(None),
            '+' | '-' => self.lex_signed_or_operator(),
            c if OPERATOR_CHARS.contains(c) => self.lex_operator(),
            c if is_ident_start(c) => self.lex_ident(),
            other => Err(EngineError::ParseError(format!(
                "unexpected character `{}`",
                other
            ))),
        }
    }

    /// `||` must lex as a single `LogicalOr` even adjacent to a lone `|`
    /// (longest-match rule) — so `|` is only ever a bare Pipe token when
    /// it is *not* immediately followed by another `|`.
    fn lex_pipe(&mut self) -> Result<Token> {
        self.chars.next();
        if self.chars.peek() == Some(&'|') {
            self.chars.next();
            Ok(Token::LogicalOr)
        } else {
            Ok(Token::Pipe)
        }
    }

    fn lex_signed_or_operator(&mut self) -> Result<Token> {
        let sign = self.chars.next().unwrap();
        if matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            self.lex_number(Some(sign))
        } else {
            Ok(Token::Operator(sign.to_string()))
        }
    }

    fn lex_number(&mut self, sign: Option<char>) -> Result<Token> {
        let mut text = String::new();
        if let Some(s) = sign {
            text.push(s);
        }
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            text.push(self.chars.next().unwrap());
        }
        let mut is_float = false;
        if self.chars.peek() == Some(&'.') {
            // only consume as a decimal point if followed by a digit —
            // otherwise `.` is a path separator the parser handles
            // elsewhere.
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some(c) if c.is_ascii_digit()) {
                is_float = true;
                text.push(self.chars.next().unwrap());
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    text.push(self.chars.next().unwrap());
                }
            }
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| EngineError::ParseError(format!("invalid float literal `{}`", text)))?;
            Ok(Token::Literal(Lit::Float(value)))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| EngineError::ParseError(format!("invalid integer literal `{}`", text)))?;
            Ok(Token::Literal(Lit::Int(value)))
        }
    }

    fn lex_string(&mut self) -> Result<Token> {
        self.chars.next(); // opening quote
        let mut string = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(Token::Literal(Lit::String(string))),
                Some('\\') => match self.chars.next() {
                    Some('"') => string.push('"'),
                    Some('\\') => string.push('\\'),
                    Some('n') => string.push('\n'),
                    Some('t') => string.push('\t'),
                    Some(o) => {
                        return Err(EngineError::ParseError(format!(
                            "unknown escape code `\\{}` in string literal",
                            o
                        )))
                    }
                    None => {
                        return Err(EngineError::ParseError(
                            "unexpected end of expression in string literal".into(),
                        ))
                    }
                },
                Some(c) => string.push(c),
                None => {
                    return Err(EngineError::ParseError(
                        "unterminated string literal".into(),
                    ))
                }
            }
        }
    }

    fn lex_env_var(&mut self) -> Result<Token> {
        self.chars.next(); // `$`
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(c) if is_ident_continue(*c)) {
            name.push(self.chars.next().unwrap());
        }
        Ok(Token::EnvVar(name))
    }

    fn lex_ident(&mut self) -> Result<Token> {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(&c) if is_ident_continue(c) || c == '.') {
            name.push(self.chars.next().unwrap());
        }
        if name == "true" {
            return Ok(Token::Literal(Lit::Bool(true)));
        }
        if name == "false" {
            return Ok(Token::Literal(Lit::Bool(false)));
        }
        if !(self.is_known_operator)(&name) {
            return Ok(Token::Reference(name));
        }
        // An operator name may carry an `@target` suffix (`vault@staging`);
        // only consume it here, once `name` alone is already known as an
        // operator, so a plain reference never swallows a stray `@`.
        if self.chars.peek() == Some(&'@') {
            name.push(self.chars.next().unwrap());
            while matches!(self.chars.peek(), Some(&c) if is_ident_continue(c)) {
                name.push(self.chars.next().unwrap());
            }
        }
        Ok(Token::Operator(name))
    }

    fn lex_operator(&mut self) -> Result<Token> {
        // Longest match among the fixed two-char operators, else a single
        // operator character. `||` is handled by `lex_pipe` before we get
        // here since it shares the `|` prefix with `Pipe`.
        let c = self.chars.next().unwrap();
        let two_char = matches!(c, '<' | '>' | '=' | '!' | '&') && self.chars.peek() == Some(&'=');
        let two_char_and = c == '&' && self.chars.peek() == Some(&'&');
        if two_char {
            self.chars.next();
            Ok(Token::Operator(format!("{}=", c)))
        } else if two_char_and {
            self.chars.next();
            Ok(Token::Operator("&&".to_string()))
        } else if c == ',' {
            Ok(Token::Comma)
        } else {
            Ok(Token::Operator(c.to_string()))
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

#[cfg(test)]
mod test {
    use super::*;

    fn no_ops(_: &str) -> bool {
        false
    }

    #[test]
    fn lexes_reference_and_operator() {
        let known = |name: &str| name == "grab";
        let tokens = Lexer::lex("grab meta.base", &known).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Operator("grab".to_string()),
                Token::Reference("meta.base".to_string()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn longest_match_for_logical_or() {
        let tokens = Lexer::lex("a || b", &no_ops).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("a".to_string()),
                Token::LogicalOr,
                Token::Reference("b".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn single_pipe_not_confused_with_double() {
        let tokens = Lexer::lex("a | b", &no_ops).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Reference("a".to_string()),
                Token::Pipe,
                Token::Reference("b".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn signed_numeric_literal() {
        let tokens = Lexer::lex("-5", &no_ops).unwrap();
        assert_eq!(tokens, vec![Token::Literal(Lit::Int(-5)), Token::Eof]);
    }

    #[test]
    fn target_suffix_lexes_as_part_of_the_operator_token() {
        let known = |name: &str| name == "vault";
        let tokens = Lexer::lex("vault@staging \"secret/db:pw\"", &known).unwrap();
        assert_eq!(tokens[0], Token::Operator("vault@staging".to_string()));
    }

    #[test]
    fn env_var_token() {
        let tokens = Lexer::lex("$HOME", &no_ops).unwrap();
        assert_eq!(
            tokens,
            vec![Token::EnvVar("HOME".to_string()), Token::Eof]
        );
    }
}
