//! Recursive-descent parser over the token stream: builds heap values
//! directly, since every list/atom constructed here has to go through the
//! heap's allocation API and obey the same value-stack parking contract as
//! any other caller.

use crate::error::Error;
use crate::interpreter::Interpreter;
use crate::reader::lexer::{Lexer, Token};
use crate::value::Value;

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            lexer: Lexer::new(src),
            peeked: None,
        }
    }

    fn peek(&mut self) -> Result<&Token, Error> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn next(&mut self) -> Result<Token, Error> {
        if let Some(t) = self.peeked.take() {
            return Ok(t);
        }
        self.lexer.next_token()
    }

    /// Reads one top-level expression. `Ok(None)` means the input is
    /// exhausted; the caller decides whether that is `STOP` (more sources
    /// remain, e.g. another file) or `TERM` (the interactive stream ended).
    pub fn read_one(&mut self, interp: &mut Interpreter) -> Result<Option<Value>, Error> {
        self.parse_value(interp)
    }

    /// Flushes input up to the next blank line, discarding any token
    /// already peeked. Called after a `ParseError` so the reader
    /// resynchronizes rather than re-reporting the same error on the next
    /// `read_one`.
    pub fn synchronize(&mut self) {
        self.peeked = None;
        self.lexer.synchronize();
    }

    fn parse_value(&mut self, interp: &mut Interpreter) -> Result<Option<Value>, Error> {
        match self.next()? {
            Token::Eof => Ok(None),
            Token::RParen => Err(Error::Parse("unexpected ')'".to_string())),
            Token::LParen => self.parse_list(interp).map(Some),
            Token::Quote => {
                let inner = self
                    .parse_value(interp)?
                    .ok_or_else(|| Error::Parse("unexpected end of input after '\''".to_string()))?;
                let quote_sym = interp
                    .reserved
                    .lookup("quote")
                    .expect("quote is always reserved");
                interp.value_stack.push(inner)?;
                let tail = interp.new_cons(interp.value_stack.pop()?, Value::Nil)?;
                interp.new_cons(quote_sym, tail).map(Some)
            }
            Token::Bool(b) => Ok(Some(Value::make_bool(b))),
            Token::Char(c) => Ok(Some(Value::make_char(c))),
            Token::Int(n) => interp.make_int(n).map(Some),
            Token::Str(s) => interp.make_string(&s).map(Some),
            Token::Sym(s) => interp.make_symbol(&s).map(Some),
        }
    }

    /// Collects elements on the value stack as they're parsed (parking
    /// each one, since a later element's own allocation could otherwise
    /// collect an earlier one that lives only in a local), then builds the
    /// list from the tail once the closing paren is seen.
    fn parse_list(&mut self, interp: &mut Interpreter) -> Result<Value, Error> {
        let mark = interp.value_stack.len();
        loop {
            match self.peek()? {
                Token::RParen => {
                    self.next()?;
                    break;
                }
                Token::Eof => return Err(Error::Parse("unexpected end of input in list".to_string())),
                _ => {
                    let v = self
                        .parse_value(interp)?
                        .ok_or_else(|| Error::Parse("unexpected end of input in list".to_string()))?;
                    interp.value_stack.push(v)?;
                }
            }
        }
        let mut list = Value::Nil;
        while interp.value_stack.len() > mark {
            let v = interp.value_stack.pop()?;
            list = interp.new_cons(v, list)?;
        }
        Ok(list)
    }
}

#[cfg(test)]
mod parser_test {
    use super::*;
    use crate::interpreter::Config;

    fn test_interp() -> Interpreter {
        Interpreter::new(Config {
            cons_capacity: 256,
            storage_words: 2048,
            value_stack_depth: 256,
            label_stack_depth: 64,
            syntaxcheck: true,
        })
        .unwrap()
    }

    #[test]
    fn parses_atoms() {
        let mut interp = test_interp();
        let mut p = Parser::new("42");
        let v = p.read_one(&mut interp).unwrap().unwrap();
        assert_eq!(interp.heap.as_int(v).unwrap(), 42);
    }

    #[test]
    fn parses_nested_list() {
        let mut interp = test_interp();
        let mut p = Parser::new("(+ 1 (- 2 3))");
        let v = p.read_one(&mut interp).unwrap().unwrap();
        assert!(v.is_cons());
        let op = interp.heap.car(v).unwrap();
        assert_eq!(interp.heap.as_str(op).unwrap(), "+");
    }

    #[test]
    fn quote_shorthand_expands() {
        let mut interp = test_interp();
        let mut p = Parser::new("'x");
        let v = p.read_one(&mut interp).unwrap().unwrap();
        let op = interp.heap.car(v).unwrap();
        assert_eq!(interp.heap.as_str(op).unwrap(), "quote");
        let arg = interp.heap.car(interp.heap.cdr(v).unwrap()).unwrap();
        assert_eq!(interp.heap.as_str(arg).unwrap(), "x");
    }

    #[test]
    fn unclosed_list_is_a_parse_error() {
        let mut interp = test_interp();
        let mut p = Parser::new("(+ 1 2");
        let err = p.read_one(&mut interp).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn exhausted_input_returns_none() {
        let mut interp = test_interp();
        let mut p = Parser::new("   ");
        assert!(p.read_one(&mut interp).unwrap().is_none());
    }
}
