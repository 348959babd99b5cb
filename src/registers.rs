//! The seven machine registers plus the value stack, label stack and root
//! stack that let the evaluator's trampoline avoid the host call stack.

use crate::error::Error;
use crate::value::Value;

/// A trampoline dispatch target. `cont` always holds one of these; the
/// dispatch loop in `eval` breaks back to the top and jumps here.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Label {
    Start,
    Application,
    ListOfValues,
    ListOfValuesCont,
    Collect,
    MicroApply,
    EvalSequence,
    DefinitionCont,
    AssignmentCont,
    AndCont,
    OrCont,
    ConditionalCont,
    End,
}

/// The seven registers the trampoline threads through every label.
pub struct Registers {
    pub val: Value,
    pub env: Value,
    pub fun: Value,
    pub argl: Value,
    pub exp: Value,
    pub unev: Value,
    pub cont: Label,
}

impl Registers {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            val: Value::Nil,
            env: Value::Nil,
            fun: Value::Nil,
            argl: Value::Nil,
            exp: Value::Nil,
            unev: Value::Nil,
            cont: Label::Start,
        }
    }

    /// Reinitializes every register to its startup value, as done by the
    /// recovery point after a recoverable error.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// All live values held directly in registers; a GC root set member.
    /// `cont` is a label, not a value, and is not part of this set.
    pub fn roots(&self) -> [Value; 6] {
        [self.val, self.env, self.fun, self.argl, self.exp, self.unev]
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds tagged values saved by the evaluator across trampoline "calls".
/// Overflow/underflow both fail with `StackFault`.
pub struct ValueStack {
    slots: Vec<Value>,
    capacity: usize,
}

impl ValueStack {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, v: Value) -> Result<(), Error> {
        if self.slots.len() >= self.capacity {
            return Err(Error::StackFault("value stack overflow"));
        }
        self.slots.push(v);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.slots
            .pop()
            .ok_or(Error::StackFault("value stack underflow"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().copied()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
    }
}

/// Holds one-byte labels, giving the trampoline "return addresses" without
/// recursing through the host call stack.
pub struct LabelStack {
    slots: Vec<Label>,
    capacity: usize,
}

impl LabelStack {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, label: Label) -> Result<(), Error> {
        if self.slots.len() >= self.capacity {
            return Err(Error::StackFault("label stack overflow"));
        }
        self.slots.push(label);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Label, Error> {
        self.slots
            .pop()
            .ok_or(Error::StackFault("label stack underflow"))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn reset(&mut self) {
        self.slots.clear();
        self.slots.push(Label::End);
    }
}

/// A tiny append-only stack pinning values (the global environment, the
/// reserved-symbol list) that must always be considered live GC roots.
pub struct RootStack {
    slots: Vec<Value>,
}

impl RootStack {
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn push(&mut self, v: Value) {
        self.slots.push(v);
    }

    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots.iter().copied()
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}
