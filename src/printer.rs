//! The external printer: a depth-bounded textual dump of any heap value,
//! used by the REPL and by the `write` primitive.

use std::fmt::Write as _;

use crate::heap::{Heap, Hint};
use crate::primitives::reserved::ReservedSymbols;
use crate::value::Value;

/// Guards against unbounded recursion into deeply or circularly nested
/// structures; beyond this nesting depth printing truncates with `...`.
const MAX_DEPTH: usize = 1000;

#[must_use]
pub fn write_to_string(heap: &Heap, reserved: &ReservedSymbols, v: Value) -> String {
    let mut out = String::new();
    write_value(heap, reserved, v, &mut out, 0);
    out
}

fn write_value(heap: &Heap, reserved: &ReservedSymbols, v: Value, out: &mut String, depth: usize) {
    if depth > MAX_DEPTH {
        out.push_str("...");
        return;
    }
    match v {
        Value::Nil => out.push_str("()"),
        Value::Bool(b) => out.push_str(if b { "#T" } else { "#F" }),
        Value::Char(c) => write_char(out, c),
        Value::ShortInt(n) => {
            let _ = write!(out, "{n}");
        }
        Value::ShortStr(s) => write_string_literal(out, s.as_str()),
        Value::ShortSym(s) => out.push_str(s.as_str()),
        Value::Cons(_) => write_cons(heap, reserved, v, out, depth),
        Value::Storage(_) => match heap.type_name(v) {
            "integer" => {
                let n = heap.as_int(v).unwrap_or(0);
                let _ = write!(out, "{n}");
            }
            "string" => write_string_literal(out, heap.as_str(v).unwrap_or("")),
            "symbol" => out.push_str(heap.as_str(v).unwrap_or("?")),
            _ => out.push_str("#<storage>"),
        },
    }
}

fn write_char(out: &mut String, c: i16) {
    out.push_str("#\\");
    match u8::try_from(c) {
        Ok(b' ') => out.push_str("space"),
        Ok(b'\n') => out.push_str("newline"),
        Ok(b) if b.is_ascii_graphic() => out.push(b as char),
        _ => {
            let _ = write!(out, "x{c}");
        }
    }
}

fn write_string_literal(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
}

fn write_cons(heap: &Heap, reserved: &ReservedSymbols, v: Value, out: &mut String, depth: usize) {
    match heap.hint(v) {
        Some(Hint::Procedure) => {
            out.push_str("#<procedure");
            if let Ok(op) = heap.car(v) {
                if let Some(name) = reserved.name_of(op) {
                    let _ = write!(out, " {name}");
                }
            }
            out.push('>');
        }
        Some(Hint::EnvHeader) => out.push_str("#<environment>"),
        _ => {
            out.push('(');
            let mut cur = v;
            let mut first = true;
            loop {
                if depth + 1 > MAX_DEPTH {
                    out.push_str(" ...");
                    break;
                }
                match cur {
                    Value::Cons(_) => {
                        if !first {
                            out.push(' ');
                        }
                        first = false;
                        let car = heap.car(cur).unwrap_or(Value::Nil);
                        write_value(heap, reserved, car, out, depth + 1);
                        cur = heap.cdr(cur).unwrap_or(Value::Nil);
                    }
                    Value::Nil => break,
                    other => {
                        out.push_str(" . ");
                        write_value(heap, reserved, other, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}
