//! The two-arena heap: a cons-cell arena and a variable-length storage
//! arena, each with its own free list, plus the constructors and equality
//! predicate that decide whether a value is immediate or boxed.
//!
//! GC lives in [`gc`]; this module only owns allocation, field access and
//! the low-level byte layout of storage blocks.

use crate::error::Error;
use crate::primitives::reserved::ReservedSymbols;
use crate::types::{ConsIndex, StorageIndex};
use crate::value::{ShortBytes, Value};

pub mod gc;
#[cfg(test)]
mod heap_test;

/// What a cons cell is being used for, distinguishing a plain pair from an
/// environment header or a procedure value. A field on the cell record,
/// standing in for the two hint bits of the packed `cdr` word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Hint {
    None,
    EnvHeader,
    Procedure,
}

#[derive(Clone, Copy, Debug)]
struct Cell {
    car: Value,
    cdr: Value,
    hint: Hint,
    marked: bool,
}

const FREE_CELL: Cell = Cell {
    car: Value::Nil,
    cdr: Value::Nil,
    hint: Hint::None,
    marked: false,
};

const WORD_BYTES: u32 = 8;
const HEADER_BYTES: u32 = 8;
const MAX_BLOCK_WORDS: u32 = 65536;

const FREE_TYPEDESC: u16 = 0;
const STRING_TYPEDESC: u16 = 1;
const SYMBOL_TYPEDESC: u16 = 2;
const INTEGER_TYPEDESC: u16 = 3;

const NO_NEXT: u32 = u32::MAX;

/// Snapshot of heap occupancy, as surfaced by the `gcstat` primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapStats {
    pub cons_free: usize,
    pub cons_total: usize,
    pub storage_free_words: u32,
    pub storage_total_words: u32,
    pub largest_free_run_words: u32,
}

pub struct Heap {
    cons_cells: Vec<Cell>,
    cons_free_head: Option<ConsIndex>,
    storage: Vec<u8>,
    storage_free_head: Option<u32>,
}

impl Heap {
    /// Builds a heap with `cons_capacity` cells and a storage arena of
    /// `storage_words` machine words, both arenas starting out entirely
    /// free.
    #[must_use]
    pub fn new(cons_capacity: usize, storage_words: u32) -> Self {
        let mut cons_cells = vec![FREE_CELL; cons_capacity];
        let mut cons_free_head: Option<ConsIndex> = None;
        for idx in (0..cons_capacity).rev() {
            let next = cons_free_head.map_or(Value::Nil, Value::Cons);
            cons_cells[idx].cdr = next;
            cons_free_head = Some(ConsIndex::new(idx as u32));
        }

        let storage_bytes = (storage_words as usize) * WORD_BYTES as usize;
        let mut storage = vec![0_u8; storage_bytes];
        let storage_free_head = if storage_words >= 2 {
            write_header(&mut storage, 0, false, FREE_TYPEDESC, storage_words);
            write_free_next(&mut storage, 0, None);
            Some(0)
        } else {
            None
        };

        Self {
            cons_cells,
            cons_free_head,
            storage,
            storage_free_head,
        }
    }

    // ---- cons arena ----------------------------------------------------

    /// Allocates a fresh pair without running the collector. `None` means
    /// the free list is exhausted; the caller (the interpreter) is
    /// responsible for parking `car`/`cdr`, collecting, and retrying.
    #[must_use]
    pub fn try_new_cons(&mut self, car: Value, cdr: Value) -> Option<Value> {
        let idx = self.cons_free_head?;
        let next = self.cons_cells[idx.as_usize()].cdr;
        self.cons_free_head = match next {
            Value::Cons(n) => Some(n),
            _ => None,
        };
        self.cons_cells[idx.as_usize()] = Cell {
            car,
            cdr,
            hint: Hint::None,
            marked: false,
        };
        Some(Value::Cons(idx))
    }

    pub fn car(&self, v: Value) -> Result<Value, Error> {
        self.cell(v, "car").map(|c| c.car)
    }

    pub fn cdr(&self, v: Value) -> Result<Value, Error> {
        self.cell(v, "cdr").map(|c| c.cdr)
    }

    pub fn set_car(&mut self, v: Value, new: Value) -> Result<(), Error> {
        let idx = self.cons_index(v, "set-car!")?;
        self.cons_cells[idx.as_usize()].car = new;
        Ok(())
    }

    pub fn set_cdr(&mut self, v: Value, new: Value) -> Result<(), Error> {
        let idx = self.cons_index(v, "set-cdr!")?;
        self.cons_cells[idx.as_usize()].cdr = new;
        Ok(())
    }

    #[must_use]
    pub fn hint(&self, v: Value) -> Option<Hint> {
        match v {
            Value::Cons(idx) => Some(self.cons_cells[idx.as_usize()].hint),
            _ => None,
        }
    }

    pub fn set_hint(&mut self, v: Value, hint: Hint) -> Result<(), Error> {
        let idx = self.cons_index(v, "set-hint")?;
        self.cons_cells[idx.as_usize()].hint = hint;
        Ok(())
    }

    fn cons_index(&self, v: Value, who: &str) -> Result<ConsIndex, Error> {
        match v {
            Value::Cons(idx) => Ok(idx),
            other => Err(Error::ArgumentType {
                expected: "pair",
                got: self.type_name(other),
                detail: who.to_string(),
            }),
        }
    }

    fn cell(&self, v: Value, who: &str) -> Result<&Cell, Error> {
        let idx = self.cons_index(v, who)?;
        Ok(&self.cons_cells[idx.as_usize()])
    }

    // ---- value constructors ---------------------------------------------

    /// Immediate iff `s.len() <= 3`, else boxed. Returns `None` only when
    /// the boxed path runs out of storage.
    #[must_use]
    pub fn try_make_string(&mut self, s: &str) -> Option<Value> {
        if let Some(short) = ShortBytes::new(s) {
            return Some(Value::ShortStr(short));
        }
        let idx = self.try_alloc_bytes(STRING_TYPEDESC, s.as_bytes())?;
        Some(Value::Storage(idx))
    }

    /// Immediate iff `1 <= s.len() <= 3`. Otherwise consults `reserved` for
    /// an existing interned entry before allocating a fresh, un-interned
    /// storage block.
    #[must_use]
    pub fn try_make_symbol(&mut self, s: &str, reserved: &ReservedSymbols) -> Option<Value> {
        if !s.is_empty() {
            if let Some(short) = ShortBytes::new(s) {
                return Some(Value::ShortSym(short));
            }
        }
        if let Some(interned) = reserved.lookup(s) {
            return Some(interned);
        }
        let idx = self.try_alloc_bytes(SYMBOL_TYPEDESC, s.as_bytes())?;
        Some(Value::Storage(idx))
    }

    /// Immediate iff `n` fits a signed 16-bit integer, else boxed.
    #[must_use]
    pub fn try_make_int(&mut self, n: i64) -> Option<Value> {
        if Value::fits_short_int(n) {
            return Some(Value::ShortInt(n as i16));
        }
        let idx = self.try_alloc_bytes(INTEGER_TYPEDESC, &n.to_le_bytes())?;
        Some(Value::Storage(idx))
    }

    /// Used by `make_symbol` to interned the reserved-symbol list itself at
    /// startup, before a `ReservedSymbols` exists to consult.
    #[must_use]
    pub fn try_make_uninterned_symbol(&mut self, s: &str) -> Option<Value> {
        if !s.is_empty() {
            if let Some(short) = ShortBytes::new(s) {
                return Some(Value::ShortSym(short));
            }
        }
        let idx = self.try_alloc_bytes(SYMBOL_TYPEDESC, s.as_bytes())?;
        Some(Value::Storage(idx))
    }

    pub fn as_int(&self, v: Value) -> Result<i64, Error> {
        match v {
            Value::ShortInt(n) => Ok(i64::from(n)),
            Value::Storage(idx) if self.storage_typedesc(idx) == INTEGER_TYPEDESC => {
                Ok(read_integer(&self.storage, idx.as_usize()))
            }
            other => Err(Error::ArgumentType {
                expected: "integer",
                got: self.type_name(other),
                detail: "arithmetic".to_string(),
            }),
        }
    }

    pub fn as_str(&self, v: Value) -> Result<&str, Error> {
        match v {
            Value::ShortStr(s) | Value::ShortSym(s) => Ok(s.as_str()),
            Value::Storage(idx)
                if matches!(
                    self.storage_typedesc(idx),
                    STRING_TYPEDESC | SYMBOL_TYPEDESC
                ) =>
            {
                Ok(read_bytes_str(&self.storage, idx.as_usize()))
            }
            other => Err(Error::ArgumentType {
                expected: "string",
                got: self.type_name(other),
                detail: "string access".to_string(),
            }),
        }
    }

    #[must_use]
    pub fn type_name(&self, v: Value) -> &'static str {
        match v {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Char(_) => "character",
            Value::ShortInt(_) => "integer",
            Value::ShortStr(_) => "string",
            Value::ShortSym(_) => "symbol",
            Value::Cons(idx) => match self.cons_cells[idx.as_usize()].hint {
                Hint::None => "pair",
                Hint::EnvHeader => "environment",
                Hint::Procedure => "procedure",
            },
            Value::Storage(idx) => match self.storage_typedesc(idx) {
                STRING_TYPEDESC => "string",
                SYMBOL_TYPEDESC => "symbol",
                INTEGER_TYPEDESC => "integer",
                _ => "storage",
            },
        }
    }

    /// `eq?`: bit-identical, or both boxed with equal typedesc and payload.
    /// Cons cells are `eq?` only by identity (already covered by the
    /// bit-identical check since `Value::Cons` equality is index equality).
    #[must_use]
    pub fn eq(&self, a: Value, b: Value) -> bool {
        if a == b {
            return true;
        }
        match (a, b) {
            (Value::Storage(ia), Value::Storage(ib)) => {
                let ta = self.storage_typedesc(ia);
                let tb = self.storage_typedesc(ib);
                if ta != tb {
                    return false;
                }
                match ta {
                    STRING_TYPEDESC | SYMBOL_TYPEDESC => {
                        read_bytes_str(&self.storage, ia.as_usize())
                            == read_bytes_str(&self.storage, ib.as_usize())
                    }
                    INTEGER_TYPEDESC => {
                        read_integer(&self.storage, ia.as_usize())
                            == read_integer(&self.storage, ib.as_usize())
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    // ---- storage arena internals ----------------------------------------

    fn storage_typedesc(&self, idx: StorageIndex) -> u16 {
        read_header(&self.storage, idx.as_usize()).1
    }

    fn try_alloc_bytes(&mut self, typedesc: u16, payload: &[u8]) -> Option<StorageIndex> {
        let words = words_needed(typedesc, payload.len());
        if words > MAX_BLOCK_WORDS {
            return None;
        }
        let offset = self.find_and_take_free(words)?;
        write_header(&mut self.storage, offset, false, typedesc, words);
        let payload_start = offset as usize + HEADER_BYTES as usize;
        match typedesc {
            STRING_TYPEDESC | SYMBOL_TYPEDESC => {
                let len = payload.len() as u32;
                self.storage[payload_start..payload_start + 4].copy_from_slice(&len.to_le_bytes());
                self.storage[payload_start + 4..payload_start + 4 + payload.len()]
                    .copy_from_slice(payload);
            }
            INTEGER_TYPEDESC => {
                self.storage[payload_start..payload_start + 8].copy_from_slice(payload);
            }
            _ => unreachable!("unknown typedesc in try_alloc_bytes"),
        }
        Some(StorageIndex::new(offset))
    }

    /// First-fit search of the free list; splits the tail back onto the
    /// list when the found block is larger than needed so the allocated
    /// head keeps the free-list's remaining structure intact.
    fn find_and_take_free(&mut self, words_needed: u32) -> Option<u32> {
        let mut prev: Option<u32> = None;
        let mut cur = self.storage_free_head;
        while let Some(offset) = cur {
            let (_, _, size_words) = read_header(&self.storage, offset as usize);
            let next = read_free_next(&self.storage, offset as usize);
            if size_words >= words_needed {
                let follow = if size_words == words_needed {
                    next
                } else {
                    let tail_offset = offset + words_needed * WORD_BYTES;
                    let tail_size = size_words - words_needed;
                    write_header(&mut self.storage, tail_offset, false, FREE_TYPEDESC, tail_size);
                    write_free_next(&mut self.storage, tail_offset, next);
                    Some(tail_offset)
                };
                match prev {
                    Some(p) => write_free_next(&mut self.storage, p as usize, follow),
                    None => self.storage_free_head = follow,
                }
                return Some(offset);
            }
            prev = Some(offset);
            cur = next;
        }
        None
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        let cons_total = self.cons_cells.len();
        let mut cons_free = 0;
        let mut cur = self.cons_free_head;
        while let Some(idx) = cur {
            cons_free += 1;
            cur = match self.cons_cells[idx.as_usize()].cdr {
                Value::Cons(n) => Some(n),
                _ => None,
            };
        }

        let storage_total_words = (self.storage.len() / WORD_BYTES as usize) as u32;
        let mut storage_free_words = 0;
        let mut largest = 0;
        let mut cur = self.storage_free_head;
        while let Some(offset) = cur {
            let (_, _, size_words) = read_header(&self.storage, offset as usize);
            storage_free_words += size_words;
            largest = largest.max(size_words);
            cur = read_free_next(&self.storage, offset as usize);
        }

        HeapStats {
            cons_free,
            cons_total,
            storage_free_words,
            storage_total_words,
            largest_free_run_words: largest,
        }
    }

    // ---- collector hooks (see `gc`) --------------------------------------

    pub(super) fn mark_cons(&mut self, idx: ConsIndex) -> bool {
        let already = self.cons_cells[idx.as_usize()].marked;
        self.cons_cells[idx.as_usize()].marked = true;
        already
    }

    pub(super) fn cons_children(&self, idx: ConsIndex) -> (Value, Value) {
        let cell = &self.cons_cells[idx.as_usize()];
        (cell.car, cell.cdr)
    }

    pub(super) fn mark_storage(&mut self, idx: StorageIndex) {
        self.storage[idx.as_usize()] = 1;
    }

    /// Walks every cell; unmarked cells are relinked onto the free list,
    /// marked cells have their mark cleared.
    pub(super) fn sweep_cons(&mut self) {
        self.cons_free_head = None;
        for idx in (0..self.cons_cells.len()).rev() {
            if self.cons_cells[idx].marked {
                self.cons_cells[idx].marked = false;
            } else {
                let next = self.cons_free_head.map_or(Value::Nil, Value::Cons);
                self.cons_cells[idx] = Cell {
                    car: Value::Nil,
                    cdr: next,
                    hint: Hint::None,
                    marked: false,
                };
                self.cons_free_head = Some(ConsIndex::new(idx as u32));
            }
        }
    }

    /// Walks every block by its declared size; coalesces adjacent unmarked
    /// runs before rebuilding the free list from them, splitting any run
    /// that exceeds the maximum block size.
    pub(super) fn sweep_storage(&mut self) {
        self.storage_free_head = None;
        let total_words = (self.storage.len() / WORD_BYTES as usize) as u32;
        let mut offset: u32 = 0;
        let mut run_start: Option<u32> = None;
        let mut run_words: u32 = 0;
        let mut tail: Option<u32> = None;

        while offset < total_words * WORD_BYTES {
            let (marked, typedesc, size_words) = read_header(&self.storage, offset as usize);
            let garbage = typedesc == FREE_TYPEDESC || !marked;
            if garbage {
                if run_start.is_none() {
                    run_start = Some(offset);
                    run_words = 0;
                }
                run_words += size_words;
            } else {
                write_header(&mut self.storage, offset, false, typedesc, size_words);
                if let Some(start) = run_start.take() {
                    self.push_free_run(start, run_words, &mut tail);
                }
            }
            offset += size_words * WORD_BYTES;
        }
        if let Some(start) = run_start.take() {
            self.push_free_run(start, run_words, &mut tail);
        }
    }

    /// Splits a coalesced run of `words` free words starting at `start`
    /// into `<= 65536`-word chunks and appends each to the free list being
    /// rebuilt by `sweep_storage`, in arena order.
    fn push_free_run(&mut self, start: u32, mut words: u32, tail: &mut Option<u32>) {
        let mut offset = start;
        while words > 0 {
            let chunk = words.min(MAX_BLOCK_WORDS);
            write_header(&mut self.storage, offset, false, FREE_TYPEDESC, chunk);
            write_free_next(&mut self.storage, offset, None);
            match *tail {
                Some(t) => write_free_next(&mut self.storage, t, Some(offset)),
                None => self.storage_free_head = Some(offset),
            }
            *tail = Some(offset);
            offset += chunk * WORD_BYTES;
            words -= chunk;
        }
    }
}

fn words_needed(typedesc: u16, payload_bytes: usize) -> u32 {
    // String/symbol blocks carry an extra 4-byte length prefix ahead of the
    // raw content; integer blocks store the 8-byte value directly.
    let prefix = if typedesc == INTEGER_TYPEDESC { 0 } else { 4 };
    let total = HEADER_BYTES as usize + prefix + payload_bytes;
    let mut words = total.div_ceil(WORD_BYTES as usize) as u32;
    words = words.max(2);
    if words % 2 != 0 {
        words += 1;
    }
    words
}

fn read_header(mem: &[u8], offset: usize) -> (bool, u16, u32) {
    let marked = mem[offset] != 0;
    let typedesc = u16::from_le_bytes([mem[offset + 1], mem[offset + 2]]);
    let raw_size = u16::from_le_bytes([mem[offset + 3], mem[offset + 4]]);
    let size_words = if raw_size == 0 {
        MAX_BLOCK_WORDS
    } else {
        u32::from(raw_size)
    };
    (marked, typedesc, size_words)
}

fn write_header(mem: &mut [u8], offset: u32, marked: bool, typedesc: u16, size_words: u32) {
    let offset = offset as usize;
    mem[offset] = u8::from(marked);
    let td = typedesc.to_le_bytes();
    mem[offset + 1] = td[0];
    mem[offset + 2] = td[1];
    let stored_size: u16 = if size_words == MAX_BLOCK_WORDS {
        0
    } else {
        size_words as u16
    };
    let sz = stored_size.to_le_bytes();
    mem[offset + 3] = sz[0];
    mem[offset + 4] = sz[1];
    mem[offset + 5] = 0;
    mem[offset + 6] = 0;
    mem[offset + 7] = 0;
}

fn read_free_next(mem: &[u8], offset: usize) -> Option<u32> {
    let start = offset + HEADER_BYTES as usize;
    let raw = u32::from_le_bytes([
        mem[start],
        mem[start + 1],
        mem[start + 2],
        mem[start + 3],
    ]);
    if raw == NO_NEXT {
        None
    } else {
        Some(raw)
    }
}

fn write_free_next(mem: &mut [u8], offset: u32, next: Option<u32>) {
    let start = offset as usize + HEADER_BYTES as usize;
    let raw = next.unwrap_or(NO_NEXT);
    mem[start..start + 4].copy_from_slice(&raw.to_le_bytes());
}

fn read_bytes_str(mem: &[u8], offset: usize) -> &str {
    let start = offset + HEADER_BYTES as usize;
    let len = u32::from_le_bytes([mem[start], mem[start + 1], mem[start + 2], mem[start + 3]])
        as usize;
    let data_start = start + 4;
    std::str::from_utf8(&mem[data_start..data_start + len]).unwrap_or("")
}

fn read_integer(mem: &[u8], offset: usize) -> i64 {
    let start = offset + HEADER_BYTES as usize;
    i64::from_le_bytes([
        mem[start],
        mem[start + 1],
        mem[start + 2],
        mem[start + 3],
        mem[start + 4],
        mem[start + 5],
        mem[start + 6],
        mem[start + 7],
    ])
}
