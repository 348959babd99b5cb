//! The environment/binding model: frames as lists of `(symbol . value)`
//! pairs, environments as parent-linked frame chains.

use tracing::warn;

use crate::error::Error;
use crate::heap::Heap;
use crate::interpreter::Interpreter;
use crate::value::Value;

#[cfg(test)]
mod env_test;

/// The environment's topmost frame (`cdr` of the header cell).
pub fn first_frame(heap: &Heap, env: Value) -> Result<Value, Error> {
    heap.cdr(env)
}

/// The environment's parent, or `Nil` for the global environment.
pub fn parent(heap: &Heap, env: Value) -> Result<Value, Error> {
    heap.car(env)
}

/// Linear scan of `frame` for a binding matching `sym` by `eq?`.
pub fn binding_in_frame(heap: &Heap, sym: Value, frame: Value) -> Result<Option<Value>, Error> {
    let mut cur = frame;
    while let Value::Cons(_) = cur {
        let binding = heap.car(cur)?;
        let bound_sym = heap.car(binding)?;
        if heap.eq(bound_sym, sym) {
            return Ok(Some(binding));
        }
        cur = heap.cdr(cur)?;
    }
    Ok(None)
}

/// Walks frames up the parent chain looking for a binding of `sym`.
pub fn binding_in_env(heap: &Heap, sym: Value, env: Value) -> Result<Option<Value>, Error> {
    let mut cur_env = env;
    loop {
        let frame = first_frame(heap, cur_env)?;
        if let Some(binding) = binding_in_frame(heap, sym, frame)? {
            return Ok(Some(binding));
        }
        let p = parent(heap, cur_env)?;
        if p.is_nil() {
            return Ok(None);
        }
        cur_env = p;
    }
}

fn symbol_name(heap: &Heap, sym: Value) -> String {
    heap.as_str(sym).unwrap_or("?").to_string()
}

/// Prepends `(sym . val)` to the top frame of `env`. If `sym` is already
/// bound *in that same frame*, prints a warning and overwrites the existing
/// binding in place instead of shadowing it with a second one.
pub fn define_variable(
    interp: &mut Interpreter,
    sym: Value,
    val: Value,
    env: Value,
) -> Result<(), Error> {
    if interp.reserved.is_reserved(sym) {
        return Err(Error::ReservedMutation {
            form: "define",
            symbol: symbol_name(&interp.heap, sym),
        });
    }

    let frame = first_frame(&interp.heap, env)?;
    if let Some(binding) = binding_in_frame(&interp.heap, sym, frame)? {
        warn!(symbol = %symbol_name(&interp.heap, sym), "overwriting previous definition");
        interp.heap.set_cdr(binding, val)?;
        return Ok(());
    }

    // `new_cons` parks its own two arguments across a collection, so no
    // manual value-stack bookkeeping is needed for either allocation here.
    let binding = interp.new_cons(sym, val)?;
    let new_frame = interp.new_cons(binding, frame)?;
    interp.heap.set_cdr(env, new_frame)?;
    Ok(())
}

/// Locates the existing binding for `sym` anywhere up the parent chain and
/// mutates its `cdr`. Fails with `UnboundVariable` if there is none.
pub fn set_variable(interp: &mut Interpreter, sym: Value, val: Value, env: Value) -> Result<(), Error> {
    if interp.reserved.is_reserved(sym) {
        return Err(Error::ReservedMutation {
            form: "set!",
            symbol: symbol_name(&interp.heap, sym),
        });
    }
    match binding_in_env(&interp.heap, sym, env)? {
        Some(binding) => {
            interp.heap.set_cdr(binding, val)?;
            Ok(())
        }
        None => Err(Error::UnboundVariable(symbol_name(&interp.heap, sym))),
    }
}

/// Builds a new frame from parallel `params`/`args` lists and chains it to
/// `base`. A bare symbol in place of (or at the tail of) `params` captures
/// the corresponding remaining arguments as a list.
pub fn extend_environment(
    interp: &mut Interpreter,
    params: Value,
    args: Value,
    base: Value,
) -> Result<Value, Error> {
    let mut bindings: Vec<(Value, Value)> = Vec::new();
    let mut p = params;
    let mut a = args;

    loop {
        match p {
            Value::Nil => {
                if !a.is_nil() {
                    return Err(Error::ArgumentArity {
                        expected: format!("{}", bindings.len()),
                        got: bindings.len() + count_list(&interp.heap, a)?,
                        detail: "lambda application".to_string(),
                    });
                }
                break;
            }
            Value::Cons(_) => {
                let psym = interp.heap.car(p)?;
                if a.is_nil() {
                    return Err(Error::ArgumentArity {
                        expected: format!("at least {}", bindings.len() + 1),
                        got: bindings.len(),
                        detail: "lambda application".to_string(),
                    });
                }
                let aval = interp.heap.car(a)?;
                bindings.push((psym, aval));
                p = interp.heap.cdr(p)?;
                a = interp.heap.cdr(a)?;
            }
            rest_symbol => {
                bindings.push((rest_symbol, a));
                break;
            }
        }
    }

    // `frame` accumulates across two allocations per binding; it has to be
    // parked on the value stack while `new_cons(psym, aval)` runs, since
    // that allocation's own parking only covers its direct arguments.
    let mut frame = Value::Nil;
    for (psym, aval) in bindings {
        interp.value_stack.push(frame)?;
        let binding = interp.new_cons(psym, aval)?;
        frame = interp.value_stack.pop()?;
        frame = interp.new_cons(binding, frame)?;
    }

    interp.new_environment(base, frame)
}

fn count_list(heap: &Heap, mut v: Value) -> Result<usize, Error> {
    let mut n = 0;
    while let Value::Cons(_) = v {
        n += 1;
        v = heap.cdr(v)?;
    }
    Ok(n)
}
