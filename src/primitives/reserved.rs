//! The reserved-symbol list: pre-interned at startup, pinned as a GC root,
//! and refused as a binding target by `define`/`set!`.

use crate::error::Error;
use crate::heap::Heap;
use crate::value::Value;

/// Every special-form keyword and primitive operator name. Interning all of
/// them up front means `make_symbol` never has to allocate a fresh storage
/// block for a use of `car`, `cons`, `+`, and so on, and gives the
/// evaluator a single place to ask "is this name reserved".
const NAMES: &[&str] = &[
    // special forms
    "quote", "define", "let", "and", "or", "set!", "if", "cond", "else", "lambda",
    // pair access
    "car", "cdr", "caar", "cadr", "cdar", "cddr", "caaar", "caadr", "cadar", "caddr", "cdaar",
    "cdadr", "cddar", "cdddr", "caaaar", "caaadr", "caadar", "caaddr", "cadaar", "cadadr",
    "caddar", "cadddr", "cdaaar", "cdaadr", "cdadar", "cdaddr", "cddaar", "cddadr", "cdddar",
    "cddddr",
    // pair construction
    "cons", "list", "set-car!", "set-cdr!",
    // arithmetic
    "+", "-", "*", "/", "<", "<=", "=", ">", ">=",
    // logic
    "not",
    // predicates
    "pair?", "null?", "number?", "integer?", "string?", "symbol?", "list?", "eq?", "odd?",
    "even?", "boolean?",
    // misc
    "length", "newline", "write", "read", "error",
    // runtime
    "gcstat", "gcstatwrite", "garbagecollect", "synchecktoggle", "memdump",
];

pub struct ReservedSymbols {
    entries: Vec<(&'static str, Value)>,
}

impl ReservedSymbols {
    /// Interns every reserved name into `heap`.
    pub fn build(heap: &mut Heap) -> Result<Self, Error> {
        let mut entries = Vec::with_capacity(NAMES.len());
        for name in NAMES {
            let v = heap.try_make_uninterned_symbol(name).ok_or_else(|| {
                Error::FatalStartup(format!("out of storage interning reserved symbol {name}"))
            })?;
            entries.push((*name, v));
        }
        Ok(Self { entries })
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    #[must_use]
    pub fn name_of(&self, v: Value) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, rv)| *rv == v)
            .map(|(n, _)| *n)
    }

    #[must_use]
    pub fn is_reserved(&self, v: Value) -> bool {
        self.entries.iter().any(|(_, rv)| *rv == v)
    }

    /// GC roots: the reserved list is pinned so every interned symbol
    /// survives collection even if nothing else references it.
    pub fn roots(&self) -> impl Iterator<Item = Value> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }

    #[cfg(test)]
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}
