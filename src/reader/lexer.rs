//! Tokenizer for the surface syntax: S-expressions, `#T`/`#F`, character and
//! string literals, decimal integers (with optional `#d` prefix and sign),
//! and symbols. Comments run from `;` to end of line.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::Error;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    LParen,
    RParen,
    Quote,
    Bool(bool),
    Int(i64),
    Char(i16),
    Str(String),
    Sym(String),
    Eof,
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '"' | ';' | '\'')
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            chars: src.chars().peekable(),
        }
    }

    fn skip_atmosphere(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some(';') => {
                    while let Some(&c) = self.chars.peek() {
                        self.chars.next();
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string_literal(&mut self) -> Result<String, Error> {
        let mut out = String::new();
        loop {
            match self.chars.next() {
                None => return Err(Error::Parse("unterminated string literal".to_string())),
                Some('"') => return Ok(out),
                Some('\\') => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => out.push(other),
                    None => return Err(Error::Parse("unterminated string literal".to_string())),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn read_char_literal(&mut self) -> Result<i16, Error> {
        let &c0 = self
            .chars
            .peek()
            .ok_or_else(|| Error::Parse("unexpected end of input in character literal".to_string()))?;
        if c0.is_ascii_alphabetic() {
            let mut word = String::new();
            while let Some(&c) = self.chars.peek() {
                if c.is_ascii_alphabetic() {
                    word.push(c);
                    self.chars.next();
                } else {
                    break;
                }
            }
            return match word.as_str() {
                "space" => Ok(32),
                "newline" => Ok(10),
                _ if word.chars().count() == 1 => Ok(word.chars().next().unwrap() as i16),
                _ => Err(Error::Parse(format!("unknown character name #\\{word}"))),
            };
        }
        self.chars.next();
        Ok(c0 as i16)
    }

    fn read_atom(&mut self, first: char) -> String {
        let mut word = String::new();
        word.push(first);
        while let Some(&c) = self.chars.peek() {
            if is_delimiter(c) || c == '#' {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }

    pub fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_atmosphere();
        let Some(&c) = self.chars.peek() else {
            return Ok(Token::Eof);
        };
        match c {
            '(' => {
                self.chars.next();
                Ok(Token::LParen)
            }
            ')' => {
                self.chars.next();
                Ok(Token::RParen)
            }
            '\'' => {
                self.chars.next();
                Ok(Token::Quote)
            }
            '"' => {
                self.chars.next();
                Ok(Token::Str(self.read_string_literal()?))
            }
            '#' => {
                self.chars.next();
                match self.chars.peek() {
                    Some('T' | 't') => {
                        self.chars.next();
                        Ok(Token::Bool(true))
                    }
                    Some('F' | 'f') => {
                        self.chars.next();
                        Ok(Token::Bool(false))
                    }
                    Some('\\') => {
                        self.chars.next();
                        Ok(Token::Char(self.read_char_literal()?))
                    }
                    Some('d' | 'D') => {
                        self.chars.next();
                        let word = self.read_atom_raw();
                        word.parse::<i64>()
                            .map(Token::Int)
                            .map_err(|_| Error::Parse(format!("invalid #d integer literal: {word}")))
                    }
                    _ => Err(Error::Parse("unrecognized '#' syntax".to_string())),
                }
            }
            _ => {
                self.chars.next();
                let word = self.read_atom(c);
                Ok(word
                    .parse::<i64>()
                    .map_or_else(|_| Token::Sym(word.clone()), Token::Int))
            }
        }
    }

    fn read_atom_raw(&mut self) -> String {
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if is_delimiter(c) {
                break;
            }
            word.push(c);
            self.chars.next();
        }
        word
    }

    /// After a parse error, flushes input up to and including the next
    /// blank line (`"\n\n"`), so a malformed form doesn't wedge the reader
    /// into reporting the same error forever.
    pub fn synchronize(&mut self) {
        let mut prev_newline = false;
        loop {
            match self.chars.next() {
                None => break,
                Some('\n') if prev_newline => break,
                Some('\n') => prev_newline = true,
                Some(_) => prev_newline = false,
            }
        }
    }
}

#[cfg(test)]
mod lexer_test {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lex = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let t = lex.next_token().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn tokenizes_a_simple_form() {
        assert_eq!(
            tokens("(+ 1 2)"),
            vec![
                Token::LParen,
                Token::Sym("+".to_string()),
                Token::Int(1),
                Token::Int(2),
                Token::RParen
            ]
        );
    }

    #[test]
    fn tokenizes_booleans_and_quote() {
        assert_eq!(
            tokens("'#T #F"),
            vec![Token::Quote, Token::Bool(true), Token::Bool(false)]
        );
    }

    #[test]
    fn tokenizes_char_literals() {
        assert_eq!(
            tokens("#\\space #\\newline #\\a"),
            vec![Token::Char(32), Token::Char(10), Token::Char(97)]
        );
    }

    #[test]
    fn tokenizes_decimal_prefixed_and_signed_integers() {
        assert_eq!(tokens("#d42 -7"), vec![Token::Int(42), Token::Int(-7)]);
    }

    #[test]
    fn tokenizes_string_escapes() {
        assert_eq!(
            tokens("\"a\\nb\\\\c\""),
            vec![Token::Str("a\nb\\c".to_string())]
        );
    }

    #[test]
    fn skips_comments() {
        assert_eq!(tokens("1 ; comment\n2"), vec![Token::Int(1), Token::Int(2)]);
    }

    #[test]
    fn synchronize_flushes_up_to_the_next_blank_line() {
        let mut lex = Lexer::new("garbage )) more-garbage\n\n(+ 1 2)");
        lex.synchronize();
        let mut out = Vec::new();
        loop {
            let t = lex.next_token().unwrap();
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        assert_eq!(
            out,
            vec![
                Token::LParen,
                Token::Sym("+".to_string()),
                Token::Int(1),
                Token::Int(2),
                Token::RParen
            ]
        );
    }
}
