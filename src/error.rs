//! Error kinds, matching the error-kind table: each recoverable kind unwinds
//! to the REPL's recovery point; `FatalStartup` terminates the process.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("PARSE ERROR: {0}")]
    Parse(String),

    #[error("SYNTAX ERROR: incorrect usage for {form} in {detail}")]
    Syntax { form: &'static str, detail: String },

    #[error("RUNTIME ERROR: unbound variable {0}")]
    UnboundVariable(String),

    #[error("RUNTIME-ERROR: binding for \"{form}\" changed during evaluation of {detail}")]
    BindingRaced { form: &'static str, detail: String },

    #[error("RUNTIME ERROR: {expected} argument(s) expected, got {got}, in {detail}")]
    ArgumentArity {
        expected: String,
        got: usize,
        detail: String,
    },

    #[error("RUNTIME ERROR: expected {expected}, got {got}, in {detail}")]
    ArgumentType {
        expected: &'static str,
        got: &'static str,
        detail: String,
    },

    #[error("RUNTIME ERROR: attempt to \"{form}\" a reserved symbol {symbol}")]
    ReservedMutation { form: &'static str, symbol: String },

    #[error("{0}")]
    User(String),

    #[error("RUNTIME ERROR: out of cons space")]
    OutOfConsSpace,

    #[error("RUNTIME ERROR: out of storage space")]
    OutOfStorage,

    #[error("RUNTIME ERROR: stack fault: {0}")]
    StackFault(&'static str),

    #[error("STARTUP-ERROR: {0}")]
    FatalStartup(String),
}

impl Error {
    /// True for every kind that unwinds to the REPL recovery point rather
    /// than terminating the process.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::FatalStartup(_))
    }
}
