//! The `Interpreter` context: the heap, registers, stacks and reserved
//! symbols that would otherwise be global mutable state, threaded through
//! every operation instead.

use tracing::debug;

use crate::env;
use crate::error::Error;
use crate::heap::{gc, Heap, HeapStats};
use crate::primitives::reserved::ReservedSymbols;
use crate::registers::{LabelStack, Registers, RootStack, ValueStack};
use crate::value::Value;

/// Construction parameters with no persisted-state or environment-variable
/// backing (there is none by design); these are just constructor
/// arguments.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub cons_capacity: usize,
    pub storage_words: u32,
    pub value_stack_depth: usize,
    pub label_stack_depth: usize,
    pub syntaxcheck: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cons_capacity: 16 * 1024,
            storage_words: 16 * 1024,
            value_stack_depth: 4096,
            label_stack_depth: 4096,
            syntaxcheck: true,
        }
    }
}

pub struct Interpreter {
    pub heap: Heap,
    pub registers: Registers,
    pub value_stack: ValueStack,
    pub label_stack: LabelStack,
    pub root_stack: RootStack,
    pub reserved: ReservedSymbols,
    pub global_env: Value,
    pub syntaxcheck: bool,
}

impl Interpreter {
    pub fn new(config: Config) -> Result<Self, Error> {
        let mut heap = Heap::new(config.cons_capacity, config.storage_words);
        let reserved = ReservedSymbols::build(&mut heap)?;
        let global_env = heap
            .try_new_cons(Value::Nil, Value::Nil)
            .ok_or_else(|| Error::FatalStartup("out of cons space building global env".into()))?;
        heap.set_hint(global_env, crate::heap::Hint::EnvHeader)
            .map_err(|e| Error::FatalStartup(e.to_string()))?;

        let mut root_stack = RootStack::new();
        root_stack.push(global_env);
        for r in reserved.roots() {
            root_stack.push(r);
        }

        let mut label_stack = LabelStack::new(config.label_stack_depth);
        label_stack.reset();

        Ok(Self {
            heap,
            registers: Registers::new(),
            value_stack: ValueStack::new(config.value_stack_depth),
            label_stack,
            root_stack,
            reserved,
            global_env,
            syntaxcheck: config.syntaxcheck,
        })
    }

    /// All live roots for the collector: registers, the value stack up to
    /// and including the root-stack watermark, and the root stack itself.
    fn roots(&self) -> Vec<Value> {
        let mut roots: Vec<Value> = self.registers.roots().to_vec();
        roots.extend(self.value_stack.iter());
        roots.extend(self.root_stack.iter());
        roots
    }

    pub fn collect_garbage(&mut self) -> HeapStats {
        let roots = self.roots();
        debug!(cons_free_before = self.heap.stats().cons_free, "running collector");
        let stats = gc::collect(&mut self.heap, roots);
        debug!(cons_free_after = stats.cons_free, "collector finished");
        stats
    }

    /// Allocates a cons cell, parking `car`/`cdr` and retrying once via the
    /// collector if the arena is exhausted.
    pub fn new_cons(&mut self, car: Value, cdr: Value) -> Result<Value, Error> {
        if let Some(v) = self.heap.try_new_cons(car, cdr) {
            return Ok(v);
        }
        self.value_stack.push(car)?;
        self.value_stack.push(cdr)?;
        self.collect_garbage();
        let cdr = self.value_stack.pop()?;
        let car = self.value_stack.pop()?;
        self.heap
            .try_new_cons(car, cdr)
            .ok_or(Error::OutOfConsSpace)
    }

    pub fn make_string(&mut self, s: &str) -> Result<Value, Error> {
        if let Some(v) = self.heap.try_make_string(s) {
            return Ok(v);
        }
        self.collect_garbage();
        self.heap.try_make_string(s).ok_or(Error::OutOfStorage)
    }

    pub fn make_symbol(&mut self, s: &str) -> Result<Value, Error> {
        if let Some(v) = self.heap.try_make_symbol(s, &self.reserved) {
            return Ok(v);
        }
        self.collect_garbage();
        self.heap
            .try_make_symbol(s, &self.reserved)
            .ok_or(Error::OutOfStorage)
    }

    pub fn make_int(&mut self, n: i64) -> Result<Value, Error> {
        if let Some(v) = self.heap.try_make_int(n) {
            return Ok(v);
        }
        self.collect_garbage();
        self.heap.try_make_int(n).ok_or(Error::OutOfStorage)
    }

    /// Allocates a new environment frame chained to `parent`.
    pub fn new_environment(&mut self, parent: Value, frame: Value) -> Result<Value, Error> {
        let env = self.new_cons(parent, frame)?;
        self.heap.set_hint(env, crate::heap::Hint::EnvHeader)?;
        Ok(env)
    }

    /// Reinitializes the value stack, label stack and registers, as the
    /// recovery point does after any recoverable error, then collects.
    pub fn reset_after_error(&mut self) {
        self.value_stack.reset();
        self.label_stack.reset();
        self.registers.reset();
        self.collect_garbage();
    }

    pub fn define_global(&mut self, sym: Value, val: Value) -> Result<(), Error> {
        let global_env = self.global_env;
        env::define_variable(self, sym, val, global_env)
    }
}
