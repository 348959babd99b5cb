//! The register-based trampoline evaluator. Every special form and every
//! application step is a function that reads/writes `interp.registers` and
//! returns control to the dispatch loop in [`eval`] via `registers.cont`;
//! none of them call back into `eval` or into each other recursively for
//! user-code evaluation. The label stack supplies "return addresses"; the
//! value stack parks whatever a step needs to survive an allocation it
//! isn't a direct argument to.

use crate::env;
use crate::error::Error;
use crate::heap::{Heap, Hint};
use crate::interpreter::Interpreter;
use crate::printer;
use crate::primitives::{self, is_proper_list, list_length};
use crate::registers::Label;
use crate::value::Value;

/// Evaluates `exp` in `env` and returns the result. Resets the label stack
/// to its `[End]` sentinel and the `exp`/`env`/`cont` registers on entry, so
/// every top-level call starts from a clean trampoline regardless of how
/// the previous one ended.
pub fn eval(interp: &mut Interpreter, exp: Value, env: Value) -> Result<Value, Error> {
    interp.label_stack.reset();
    interp.registers.exp = exp;
    interp.registers.env = env;
    interp.registers.cont = Label::Start;

    loop {
        match interp.registers.cont {
            Label::Start => step_start(interp)?,
            Label::Application => step_application(interp)?,
            Label::ListOfValues => step_list_of_values(interp)?,
            Label::ListOfValuesCont => step_list_of_values_cont(interp)?,
            Label::Collect => step_collect(interp)?,
            Label::MicroApply => step_micro_apply(interp)?,
            Label::EvalSequence => step_eval_sequence(interp)?,
            Label::DefinitionCont => step_definition_cont(interp)?,
            Label::AssignmentCont => step_assignment_cont(interp)?,
            Label::AndCont => step_and_cont(interp)?,
            Label::OrCont => step_or_cont(interp)?,
            Label::ConditionalCont => step_conditional_cont(interp)?,
            Label::End => break,
        }
    }
    Ok(interp.registers.val)
}

// ---- small accessors, grounded on HELP.C's operator/operands/first_arg ----

fn operands(heap: &Heap, exp: Value) -> Result<Value, Error> {
    heap.cdr(exp)
}

fn first_arg(heap: &Heap, exp: Value) -> Result<Value, Error> {
    heap.car(operands(heap, exp)?)
}

fn second_arg(heap: &Heap, exp: Value) -> Result<Value, Error> {
    heap.car(heap.cdr(operands(heap, exp)?)?)
}

fn third_arg(heap: &Heap, exp: Value) -> Result<Value, Error> {
    heap.car(heap.cdr(heap.cdr(operands(heap, exp)?)?)?)
}

fn is_symbol(heap: &Heap, v: Value) -> bool {
    heap.type_name(v) == "symbol"
}

fn syntax_err(interp: &Interpreter, form: &'static str, exp: Value) -> Error {
    Error::Syntax {
        form,
        detail: printer::write_to_string(&interp.heap, &interp.reserved, exp),
    }
}

/// `symbol_list_p`: every element a symbol, proper-list terminated.
fn is_symbol_list(heap: &Heap, mut v: Value) -> Result<bool, Error> {
    loop {
        match v {
            Value::Nil => return Ok(true),
            Value::Cons(_) => {
                if !is_symbol(heap, heap.car(v)?) {
                    return Ok(false);
                }
                v = heap.cdr(v)?;
            }
            _ => return Ok(false),
        }
    }
}

/// `symbol_compound_p`: a `symbol_list_p` that also accepts a bare trailing
/// symbol in place of the `Nil` terminator (a rest parameter).
fn is_symbol_compound(heap: &Heap, mut v: Value) -> Result<bool, Error> {
    loop {
        match v {
            Value::Nil => return Ok(true),
            Value::Cons(_) => {
                if !is_symbol(heap, heap.car(v)?) {
                    return Ok(false);
                }
                v = heap.cdr(v)?;
            }
            other => return Ok(is_symbol(heap, other)),
        }
    }
}

/// `unique_vars_p`: no duplicate symbols anywhere in `vars`, including
/// between the proper-list prefix and a trailing rest-parameter symbol.
fn has_unique_vars(heap: &Heap, vars: Value) -> Result<bool, Error> {
    let mut outer = vars;
    while let Value::Cons(_) = outer {
        let x = heap.car(outer)?;
        let mut cur = heap.cdr(outer)?;
        loop {
            match cur {
                Value::Cons(_) => {
                    if heap.eq(x, heap.car(cur)?) {
                        return Ok(false);
                    }
                    cur = heap.cdr(cur)?;
                }
                _ => break,
            }
        }
        if !cur.is_nil() && heap.eq(x, cur) {
            return Ok(false);
        }
        outer = heap.cdr(outer)?;
    }
    Ok(true)
}

/// `assoc_list_p`: every element of `bindings` is a two-element list.
fn is_assoc_list(heap: &Heap, mut bindings: Value) -> Result<bool, Error> {
    loop {
        match bindings {
            Value::Nil => return Ok(true),
            Value::Cons(_) => {
                let entry = heap.car(bindings)?;
                if !is_proper_list(heap, entry)? || list_length(heap, entry)? != 2 {
                    return Ok(false);
                }
                bindings = heap.cdr(bindings)?;
            }
            _ => return Ok(false),
        }
    }
}

/// `list_of_clauses_p`: every clause a non-empty proper list; an `else`
/// clause must be the last one, and have at least one consequent.
fn is_list_of_clauses(interp: &Interpreter, mut cur: Value) -> Result<bool, Error> {
    let heap = &interp.heap;
    let else_sym = interp.reserved.lookup("else");
    let mut seen_any = false;
    loop {
        match cur {
            Value::Nil => return Ok(true),
            Value::Cons(_) => {
                let clause = heap.car(cur)?;
                if clause.is_nil() || !is_proper_list(heap, clause)? {
                    return Ok(false);
                }
                let test = heap.car(clause)?;
                let is_else = else_sym.is_some_and(|e| heap.eq(e, test));
                let rest = heap.cdr(cur)?;
                if is_else && (!seen_any || !rest.is_nil() || list_length(heap, clause)? < 2) {
                    return Ok(false);
                }
                seen_any = true;
                cur = rest;
            }
            _ => return Ok(false),
        }
    }
}

/// Builds the reverse of `list`, the remaining piece after the collector
/// accumulates evaluated operands back-to-front.
fn reverse_list(interp: &mut Interpreter, list: Value) -> Result<Value, Error> {
    let mut result = Value::Nil;
    let mut cur = list;
    while let Value::Cons(_) = cur {
        interp.value_stack.push(cur)?;
        let head = interp.heap.car(cur)?;
        result = interp.new_cons(head, result)?;
        cur = interp.value_stack.pop()?;
        cur = interp.heap.cdr(cur)?;
    }
    Ok(result)
}

/// `separate_assoc`: splits a let-binding list `((v1 e1) (v2 e2) ...)` into
/// a `(var-list, val-list)` pair. Every sub-value walked here stays
/// reachable through the original binding list for as long as `exp` (a GC
/// root via `registers.exp`) still points at it; `var_list` is parked
/// across the second loop since nothing else roots it once built.
fn separate_assoc(interp: &mut Interpreter, bindings: Value) -> Result<(Value, Value), Error> {
    let mut vars = Vec::new();
    let mut vals = Vec::new();
    let mut cur = bindings;
    while let Value::Cons(_) = cur {
        let entry = interp.heap.car(cur)?;
        vars.push(interp.heap.car(entry)?);
        vals.push(interp.heap.car(interp.heap.cdr(entry)?)?);
        cur = interp.heap.cdr(cur)?;
    }

    let mut var_list = Value::Nil;
    for v in vars.into_iter().rev() {
        var_list = interp.new_cons(v, var_list)?;
    }
    interp.value_stack.push(var_list)?;
    let mut val_list = Value::Nil;
    for e in vals.into_iter().rev() {
        val_list = interp.new_cons(e, val_list)?;
    }
    let var_list = interp.value_stack.pop()?;
    Ok((var_list, val_list))
}

/// `clauses`: normalizes `if`/`cond` into a uniform list of
/// `(test . consequents)` entries. For `cond` the operand list is already
/// in this shape.
fn clauses(interp: &mut Interpreter, exp: Value) -> Result<Value, Error> {
    let oper = interp.heap.car(exp)?;
    let if_sym = interp.reserved.lookup("if").expect("if is reserved");
    if !interp.heap.eq(oper, if_sym) {
        return operands(&interp.heap, exp);
    }

    let len = list_length(&interp.heap, exp)?;
    let test = first_arg(&interp.heap, exp)?;
    let consequent = second_arg(&interp.heap, exp)?;
    let consequents = interp.new_cons(consequent, Value::Nil)?;
    let then_clause = interp.new_cons(test, consequents)?;

    if len != 4 {
        return interp.new_cons(then_clause, Value::Nil);
    }

    let alternative = third_arg(&interp.heap, exp)?;
    let else_sym = interp.reserved.lookup("else").expect("else is reserved");
    interp.value_stack.push(then_clause)?;
    let else_consequents = interp.new_cons(alternative, Value::Nil)?;
    let else_clause = interp.new_cons(else_sym, else_consequents)?;
    let then_clause = interp.value_stack.pop()?;
    let tail = interp.new_cons(else_clause, Value::Nil)?;
    interp.new_cons(then_clause, tail)
}

/// `(define (f x...) body...)` ⇒ `(define f (lambda (x...) body...))`.
fn rewrite_define_sugar(interp: &mut Interpreter, exp: Value) -> Result<Value, Error> {
    let header = first_arg(&interp.heap, exp)?;
    let fname = interp.heap.car(header)?;
    let params = interp.heap.cdr(header)?;
    let body = interp.heap.cdr(interp.heap.cdr(exp)?)?;
    let lambda_sym = interp.reserved.lookup("lambda").expect("lambda is reserved");

    let lambda_tail = interp.new_cons(params, body)?;
    let lambda_form = interp.new_cons(lambda_sym, lambda_tail)?;
    let value_tail = interp.new_cons(lambda_form, Value::Nil)?;
    let define_sym = interp.reserved.lookup("define").expect("define is reserved");
    let name_tail = interp.new_cons(fname, value_tail)?;
    interp.new_cons(define_sym, name_tail)
}

// ---- Start: dispatch on the shape of `exp` ---------------------------------

fn step_start(interp: &mut Interpreter) -> Result<(), Error> {
    let exp = interp.registers.exp;
    match exp {
        Value::Cons(_) => step_compound(interp, exp),
        Value::ShortSym(_) => step_variable(interp, exp),
        Value::Storage(idx) if interp.heap.type_name(Value::Storage(idx)) == "symbol" => {
            step_variable(interp, exp)
        }
        _ => {
            // Self-evaluating: numbers, strings, booleans, characters, nil.
            interp.registers.val = exp;
            interp.registers.cont = interp.label_stack.pop()?;
            Ok(())
        }
    }
}

fn step_variable(interp: &mut Interpreter, sym: Value) -> Result<(), Error> {
    if let Some(name) = interp.reserved.name_of(sym) {
        let _ = name;
        // A bare reference to a reserved operator name evaluates to a
        // procedure value wrapping it, freshly allocated each time, the
        // same as evaluating a compound lambda would yield a fresh
        // closure record.
        let proc = interp.new_cons(sym, Value::Nil)?;
        interp.heap.set_hint(proc, Hint::Procedure)?;
        interp.registers.val = proc;
        interp.registers.cont = interp.label_stack.pop()?;
        return Ok(());
    }
    let binding = env::binding_in_env(&interp.heap, sym, interp.registers.env)?.ok_or_else(|| {
        Error::UnboundVariable(interp.heap.as_str(sym).unwrap_or("?").to_string())
    })?;
    interp.registers.val = interp.heap.cdr(binding)?;
    interp.registers.cont = interp.label_stack.pop()?;
    Ok(())
}

fn step_compound(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    let oper = interp.heap.car(exp)?;
    if let Some(name) = interp.reserved.name_of(oper) {
        return match name {
            "quote" => step_quote(interp, exp),
            "define" => step_define(interp, exp),
            "let" => step_let(interp, exp),
            "and" => step_and(interp, exp),
            "or" => step_or(interp, exp),
            "set!" => step_set(interp, exp),
            "if" | "cond" => step_conditional(interp, exp),
            "lambda" => step_lambda(interp, exp),
            _ => step_application(interp),
        };
    }
    step_application(interp)
}

fn step_quote(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck && list_length(&interp.heap, exp)? != 2 {
        return Err(syntax_err(interp, "quote", exp));
    }
    interp.registers.val = first_arg(&interp.heap, exp)?;
    interp.registers.cont = interp.label_stack.pop()?;
    Ok(())
}

// ---- define ----------------------------------------------------------------

fn step_define(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck && !(is_proper_list(&interp.heap, exp)? && list_length(&interp.heap, exp)? >= 3) {
        return Err(syntax_err(interp, "define", exp));
    }

    let header = first_arg(&interp.heap, exp)?;
    if matches!(header, Value::Cons(_)) && is_symbol_list(&interp.heap, header)? {
        let rewritten = rewrite_define_sugar(interp, exp)?;
        interp.registers.exp = rewritten;
    }
    let exp = interp.registers.exp;

    if interp.syntaxcheck
        && (list_length(&interp.heap, exp)? != 3 || !is_symbol(&interp.heap, first_arg(&interp.heap, exp)?))
    {
        return Err(syntax_err(interp, "define", exp));
    }

    let sym = first_arg(&interp.heap, exp)?;
    if interp.reserved.is_reserved(sym) {
        return Err(Error::ReservedMutation {
            form: "define",
            symbol: interp.heap.as_str(sym).unwrap_or("?").to_string(),
        });
    }

    let env = interp.registers.env;
    let frame = env::first_frame(&interp.heap, env)?;
    let existing = env::binding_in_frame(&interp.heap, sym, frame)?.unwrap_or(Value::Nil);

    interp.value_stack.push(env)?;
    interp.value_stack.push(existing)?;
    interp.value_stack.push(sym)?;
    interp.label_stack.push(Label::DefinitionCont)?;
    interp.registers.exp = second_arg(&interp.heap, exp)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

fn step_definition_cont(interp: &mut Interpreter) -> Result<(), Error> {
    let sym = interp.value_stack.pop()?;
    let existing = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;

    let frame = env::first_frame(&interp.heap, env)?;
    let current = env::binding_in_frame(&interp.heap, sym, frame)?.unwrap_or(Value::Nil);
    if current != existing {
        return Err(Error::BindingRaced {
            form: "define",
            detail: printer::write_to_string(&interp.heap, &interp.reserved, sym),
        });
    }

    let val = interp.registers.val;
    env::define_variable(interp, sym, val, env)?;
    interp.registers.val = Value::Nil;
    interp.registers.cont = interp.label_stack.pop()?;
    Ok(())
}

// ---- let (pure syntactic sugar over lambda, no own continuation) ----------

fn step_let(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    let bindings = first_arg(&interp.heap, exp)?;
    if interp.syntaxcheck
        && !(is_proper_list(&interp.heap, exp)?
            && list_length(&interp.heap, exp)? >= 3
            && is_assoc_list(&interp.heap, bindings)?)
    {
        return Err(syntax_err(interp, "let", exp));
    }

    let (var_list, val_list) = separate_assoc(interp, bindings)?;
    let body = interp.heap.cdr(interp.heap.cdr(exp)?)?;
    let lambda_sym = interp.reserved.lookup("lambda").expect("lambda is reserved");

    interp.value_stack.push(val_list)?;
    let lambda_tail = interp.new_cons(var_list, body)?;
    let lambda_form = interp.new_cons(lambda_sym, lambda_tail)?;
    let val_list = interp.value_stack.pop()?;
    let new_exp = interp.new_cons(lambda_form, val_list)?;

    interp.registers.exp = new_exp;
    // Tail-substitutes directly into application; the label this `let`
    // would have returned to is still the one on top of the stack.
    step_application(interp)
}

// ---- and / or ---------------------------------------------------------------

fn step_and(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck && !is_proper_list(&interp.heap, exp)? {
        return Err(syntax_err(interp, "and", exp));
    }
    let operands = operands(&interp.heap, exp)?;
    if operands.is_nil() {
        interp.registers.val = Value::make_bool(true);
        interp.registers.cont = interp.label_stack.pop()?;
        return Ok(());
    }
    let rest = interp.heap.cdr(operands)?;
    let env = interp.registers.env;
    if !rest.is_nil() {
        interp.value_stack.push(env)?;
        interp.value_stack.push(rest)?;
        interp.label_stack.push(Label::AndCont)?;
    }
    interp.registers.exp = interp.heap.car(operands)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

fn step_and_cont(interp: &mut Interpreter) -> Result<(), Error> {
    conjunction_cont(interp, true)
}

fn step_or(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck && !is_proper_list(&interp.heap, exp)? {
        return Err(syntax_err(interp, "or", exp));
    }
    let operands = operands(&interp.heap, exp)?;
    if operands.is_nil() {
        interp.registers.val = Value::make_bool(false);
        interp.registers.cont = interp.label_stack.pop()?;
        return Ok(());
    }
    let rest = interp.heap.cdr(operands)?;
    let env = interp.registers.env;
    if !rest.is_nil() {
        interp.value_stack.push(env)?;
        interp.value_stack.push(rest)?;
        interp.label_stack.push(Label::OrCont)?;
    }
    interp.registers.exp = interp.heap.car(operands)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

fn step_or_cont(interp: &mut Interpreter) -> Result<(), Error> {
    conjunction_cont(interp, false)
}

/// Shared continuation body for `and`/`or`: `stop_on_and` selects which
/// truthiness short-circuits the chain (`and` stops on the first false,
/// `or` on the first true).
fn conjunction_cont(interp: &mut Interpreter, stop_on_and: bool) -> Result<(), Error> {
    let rest = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;

    let stop = if stop_on_and {
        !interp.registers.val.is_truthy()
    } else {
        interp.registers.val.is_truthy()
    };
    if stop {
        interp.registers.cont = interp.label_stack.pop()?;
        return Ok(());
    }

    let next_rest = interp.heap.cdr(rest)?;
    if !next_rest.is_nil() {
        interp.value_stack.push(env)?;
        interp.value_stack.push(next_rest)?;
        interp
            .label_stack
            .push(if stop_on_and { Label::AndCont } else { Label::OrCont })?;
    }
    interp.registers.exp = interp.heap.car(rest)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

// ---- set! -------------------------------------------------------------------

fn step_set(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck
        && !(is_proper_list(&interp.heap, exp)?
            && list_length(&interp.heap, exp)? == 3
            && is_symbol(&interp.heap, first_arg(&interp.heap, exp)?))
    {
        return Err(syntax_err(interp, "set!", exp));
    }

    let sym = first_arg(&interp.heap, exp)?;
    if interp.reserved.is_reserved(sym) {
        return Err(Error::ReservedMutation {
            form: "set!",
            symbol: interp.heap.as_str(sym).unwrap_or("?").to_string(),
        });
    }

    let env = interp.registers.env;
    let binding = env::binding_in_env(&interp.heap, sym, env)?.ok_or_else(|| {
        Error::UnboundVariable(interp.heap.as_str(sym).unwrap_or("?").to_string())
    })?;

    interp.value_stack.push(env)?;
    interp.value_stack.push(binding)?;
    interp.value_stack.push(sym)?;
    interp.label_stack.push(Label::AssignmentCont)?;
    interp.registers.exp = second_arg(&interp.heap, exp)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

fn step_assignment_cont(interp: &mut Interpreter) -> Result<(), Error> {
    let sym = interp.value_stack.pop()?;
    let binding = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;

    let current = env::binding_in_env(&interp.heap, sym, env)?;
    if current != Some(binding) {
        return Err(Error::BindingRaced {
            form: "set!",
            detail: printer::write_to_string(&interp.heap, &interp.reserved, sym),
        });
    }
    interp.heap.set_cdr(binding, interp.registers.val)?;
    interp.registers.val = Value::Nil;
    interp.registers.cont = interp.label_stack.pop()?;
    Ok(())
}

// ---- if / cond ---------------------------------------------------------------

fn is_well_formed_conditional(interp: &Interpreter, exp: Value) -> Result<bool, Error> {
    if !is_proper_list(&interp.heap, exp)? {
        return Ok(false);
    }
    let oper = interp.heap.car(exp)?;
    let if_sym = interp.reserved.lookup("if").expect("if is reserved");
    let cond_sym = interp.reserved.lookup("cond").expect("cond is reserved");
    if interp.heap.eq(oper, if_sym) {
        let len = list_length(&interp.heap, exp)?;
        Ok(len == 3 || len == 4)
    } else if interp.heap.eq(oper, cond_sym) {
        let len = list_length(&interp.heap, exp)?;
        Ok(len >= 2 && is_list_of_clauses(interp, interp.heap.cdr(exp)?)?)
    } else {
        Ok(false)
    }
}

fn step_conditional(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck && !is_well_formed_conditional(interp, exp)? {
        return Err(syntax_err(interp, "conditional", exp));
    }

    interp.value_stack.push(exp)?;
    let clause_list = clauses(interp, exp)?;
    let env = interp.registers.env;
    let rest = interp.heap.cdr(clause_list)?;
    interp.value_stack.push(env)?;
    interp.value_stack.push(rest)?;
    interp.label_stack.push(Label::ConditionalCont)?;

    let first_clause = interp.heap.car(clause_list)?;
    let consequents = interp.heap.cdr(first_clause)?;
    interp.value_stack.push(consequents)?;
    interp.registers.exp = interp.heap.car(first_clause)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

fn step_conditional_cont(interp: &mut Interpreter) -> Result<(), Error> {
    let consequents = interp.value_stack.pop()?;
    let rest = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;

    if interp.registers.val.is_truthy() {
        let _original_exp = interp.value_stack.pop()?;
        if consequents.is_nil() {
            interp.registers.cont = interp.label_stack.pop()?;
        } else {
            enter_eval_sequence(interp, env, consequents)?;
        }
        return Ok(());
    }

    if rest.is_nil() {
        let original_exp = interp.value_stack.pop()?;
        return Err(Error::Syntax {
            form: "conditional w/o else-clause",
            detail: printer::write_to_string(&interp.heap, &interp.reserved, original_exp),
        });
    }

    let next_clause = interp.heap.car(rest)?;
    let test = interp.heap.car(next_clause)?;
    let else_sym = interp.reserved.lookup("else").expect("else is reserved");
    if interp.heap.eq(test, else_sym) {
        let _original_exp = interp.value_stack.pop()?;
        let else_consequents = interp.heap.cdr(next_clause)?;
        enter_eval_sequence(interp, env, else_consequents)?;
        return Ok(());
    }

    // Try the next clause; `original_exp` stays buried at the bottom of the
    // stack for the eventual success or no-else-clause error.
    let next_rest = interp.heap.cdr(rest)?;
    interp.value_stack.push(env)?;
    interp.value_stack.push(next_rest)?;
    interp.label_stack.push(Label::ConditionalCont)?;
    let next_consequents = interp.heap.cdr(next_clause)?;
    interp.value_stack.push(next_consequents)?;
    interp.registers.exp = interp.heap.car(next_clause)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

// ---- lambda -------------------------------------------------------------------

fn step_lambda(interp: &mut Interpreter, exp: Value) -> Result<(), Error> {
    if interp.syntaxcheck {
        let params = first_arg(&interp.heap, exp)?;
        let ok = is_proper_list(&interp.heap, exp)?
            && list_length(&interp.heap, exp)? >= 3
            && is_symbol_compound(&interp.heap, params)?
            && has_unique_vars(&interp.heap, params)?;
        if !ok {
            return Err(syntax_err(interp, "lambda", exp));
        }
    }
    let env = interp.registers.env;
    let proc = interp.new_cons(exp, env)?;
    interp.heap.set_hint(proc, Hint::Procedure)?;
    interp.registers.val = proc;
    interp.registers.cont = interp.label_stack.pop()?;
    Ok(())
}

// ---- application: evaluate operator and operands, then micro-apply --------

fn step_application(interp: &mut Interpreter) -> Result<(), Error> {
    let exp = interp.registers.exp;
    let env = interp.registers.env;
    interp.value_stack.push(env)?;
    interp.value_stack.push(operands(&interp.heap, exp)?)?;
    interp.label_stack.push(Label::ListOfValues)?;
    interp.registers.exp = interp.heap.car(exp)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

/// Entered once the operator has been evaluated into `val`; kicks off
/// left-to-right operand evaluation, or goes straight to `MicroApply` for a
/// zero-argument call.
fn step_list_of_values(interp: &mut Interpreter) -> Result<(), Error> {
    let operand_list = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;
    interp.registers.fun = interp.registers.val;

    if operand_list.is_nil() {
        interp.registers.argl = Value::Nil;
        interp.registers.cont = Label::MicroApply;
        return Ok(());
    }

    interp.value_stack.push(interp.registers.fun)?;
    interp.value_stack.push(env)?;
    interp.value_stack.push(Value::Nil)?; // accumulator, built up in reverse
    interp.value_stack.push(operand_list)?;
    interp.label_stack.push(Label::ListOfValuesCont)?;
    interp.registers.exp = interp.heap.car(operand_list)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

/// Accumulates one evaluated operand per entry, then either evaluates the
/// next one or, once the list is exhausted, hands off to `Collect`.
fn step_list_of_values_cont(interp: &mut Interpreter) -> Result<(), Error> {
    let remaining = interp.value_stack.pop()?;
    let accum = interp.value_stack.pop()?;
    // `fun`/`env` stay parked on the value stack while this allocates.
    let accum = interp.new_cons(interp.registers.val, accum)?;
    let rest = interp.heap.cdr(remaining)?;
    let env = interp.value_stack.pop()?;
    let fun = interp.value_stack.pop()?;

    if rest.is_nil() {
        interp.value_stack.push(accum)?;
        interp.registers.fun = fun;
        interp.registers.env = env;
        interp.registers.cont = Label::Collect;
        return Ok(());
    }

    interp.value_stack.push(fun)?;
    interp.value_stack.push(env)?;
    interp.value_stack.push(accum)?;
    interp.value_stack.push(rest)?;
    interp.label_stack.push(Label::ListOfValuesCont)?;
    interp.registers.exp = interp.heap.car(rest)?;
    interp.registers.env = env;
    interp.registers.cont = Label::Start;
    Ok(())
}

/// Reverses the (backwards-built) accumulator into the final argument list
/// and falls through to `MicroApply`.
fn step_collect(interp: &mut Interpreter) -> Result<(), Error> {
    let accum = interp.value_stack.pop()?;
    interp.registers.argl = reverse_list(interp, accum)?;
    interp.registers.cont = Label::MicroApply;
    Ok(())
}

fn step_micro_apply(interp: &mut Interpreter) -> Result<(), Error> {
    let fun = interp.registers.fun;
    let argl = interp.registers.argl;
    let cdr_fun = interp.heap.cdr(fun)?;

    if cdr_fun.is_nil() {
        let op_sym = interp.heap.car(fun)?;
        let name = interp.heap.as_str(op_sym)?.to_string();
        let val = primitives::apply(interp, &name, argl)?;
        interp.registers.val = val;
        interp.registers.cont = interp.label_stack.pop()?;
        return Ok(());
    }

    let lambda_form = interp.heap.car(fun)?;
    let params = first_arg(&interp.heap, lambda_form)?;
    let body = interp.heap.cdr(interp.heap.cdr(lambda_form)?)?;
    let new_env = env::extend_environment(interp, params, argl, cdr_fun)?;
    enter_eval_sequence(interp, new_env, body)
}

/// All callers of sequence evaluation go through here: push `(env, list)`
/// and set `cont = EvalSequence`, which unconditionally pops that pair at
/// its start. This collapses the original's separate "first call" and
/// "continuation" sequence labels into one.
fn enter_eval_sequence(interp: &mut Interpreter, env: Value, list: Value) -> Result<(), Error> {
    interp.value_stack.push(env)?;
    interp.value_stack.push(list)?;
    interp.registers.cont = Label::EvalSequence;
    Ok(())
}

fn step_eval_sequence(interp: &mut Interpreter) -> Result<(), Error> {
    let list = interp.value_stack.pop()?;
    let env = interp.value_stack.pop()?;
    interp.registers.env = env;

    let rest = interp.heap.cdr(list)?;
    if rest.is_nil() {
        // Last form in the sequence: evaluate it in tail position, i.e.
        // return directly to whatever label is already on top of the
        // label stack rather than pushing a new continuation.
        interp.registers.exp = interp.heap.car(list)?;
        interp.registers.cont = Label::Start;
        return Ok(());
    }

    interp.value_stack.push(env)?;
    interp.value_stack.push(rest)?;
    interp.label_stack.push(Label::EvalSequence)?;
    interp.registers.exp = interp.heap.car(list)?;
    interp.registers.cont = Label::Start;
    Ok(())
}

#[cfg(test)]
mod eval_test {
    use super::*;
    use crate::interpreter::Config;
    use crate::reader::parser::Parser;

    fn test_interp() -> Interpreter {
        Interpreter::new(Config {
            cons_capacity: 4096,
            storage_words: 16384,
            value_stack_depth: 1024,
            label_stack_depth: 1024,
            syntaxcheck: true,
        })
        .unwrap()
    }

    fn run(interp: &mut Interpreter, src: &str) -> Value {
        let mut parser = Parser::new(src);
        let exp = parser.read_one(interp).unwrap().unwrap();
        let env = interp.global_env;
        eval(interp, exp, env).unwrap()
    }

    fn run_err(interp: &mut Interpreter, src: &str) -> Error {
        let mut parser = Parser::new(src);
        let exp = parser.read_one(interp).unwrap().unwrap();
        let env = interp.global_env;
        eval(interp, exp, env).unwrap_err()
    }

    #[test]
    fn self_evaluating_forms() {
        let mut interp = test_interp();
        let v = run(&mut interp, "42");
        assert_eq!(interp.heap.as_int(v).unwrap(), 42);
        let v = run(&mut interp, "#T");
        assert_eq!(v, Value::make_bool(true));
    }

    #[test]
    fn quote_returns_the_form_unevaluated() {
        let mut interp = test_interp();
        let v = run(&mut interp, "'(a b c)");
        assert!(v.is_cons());
        let head = interp.heap.car(v).unwrap();
        assert_eq!(interp.heap.as_str(head).unwrap(), "a");
    }

    #[test]
    fn arithmetic_application() {
        let mut interp = test_interp();
        let v = run(&mut interp, "(+ 1 2 3)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 6);

        let v = run(&mut interp, "(* (- 10 4) (/ 9 3))");
        assert_eq!(interp.heap.as_int(v).unwrap(), 18);
    }

    #[test]
    fn define_and_reference_a_variable() {
        let mut interp = test_interp();
        run(&mut interp, "(define x 10)");
        let v = run(&mut interp, "(+ x 5)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 15);
    }

    #[test]
    fn define_sugar_builds_a_callable_procedure() {
        let mut interp = test_interp();
        run(&mut interp, "(define (square n) (* n n))");
        let v = run(&mut interp, "(square 7)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 49);
    }

    #[test]
    fn lambda_closes_over_its_defining_environment() {
        let mut interp = test_interp();
        run(&mut interp, "(define (make-adder n) (lambda (x) (+ x n)))");
        run(&mut interp, "(define add5 (make-adder 5))");
        let v = run(&mut interp, "(add5 10)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 15);
    }

    #[test]
    fn recursive_factorial_does_not_overflow_the_trampoline() {
        let mut interp = test_interp();
        run(
            &mut interp,
            "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))",
        );
        let v = run(&mut interp, "(fact 6)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 720);
    }

    #[test]
    fn let_binds_parallel_locals() {
        let mut interp = test_interp();
        let v = run(&mut interp, "(let ((a 10) (b 20) (c 30)) (+ a b c))");
        assert_eq!(interp.heap.as_int(v).unwrap(), 60);
    }

    #[test]
    fn cond_with_else_picks_the_matching_clause() {
        let mut interp = test_interp();
        let v = run(&mut interp, "(cond (#F 'a) (#F 'b) (else 'c))");
        assert_eq!(interp.heap.as_str(v).unwrap(), "c");
    }

    #[test]
    fn cond_without_a_matching_clause_or_else_is_a_runtime_error() {
        let mut interp = test_interp();
        let err = run_err(&mut interp, "(cond (#F 'a))");
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn if_with_two_arms_evaluates_the_right_one() {
        let mut interp = test_interp();
        let v = run(&mut interp, "(if #F 1 2)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 2);
        let v = run(&mut interp, "(if #T 1 2)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 1);
    }

    #[test]
    fn and_short_circuits_on_the_first_false() {
        let mut interp = test_interp();
        run(&mut interp, "(define calls 0)");
        run(&mut interp, "(define (bump) (set! calls (+ calls 1)) #T)");
        let v = run(&mut interp, "(and #F (bump))");
        assert_eq!(v, Value::make_bool(false));
        let calls = run(&mut interp, "calls");
        assert_eq!(interp.heap.as_int(calls).unwrap(), 0);
    }

    #[test]
    fn or_returns_the_first_truthy_value() {
        let mut interp = test_interp();
        let v = run(&mut interp, "(or #F 42)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 42);
    }

    #[test]
    fn set_bang_mutates_an_existing_binding() {
        let mut interp = test_interp();
        run(&mut interp, "(define x 1)");
        run(&mut interp, "(set! x 99)");
        let v = run(&mut interp, "x");
        assert_eq!(interp.heap.as_int(v).unwrap(), 99);
    }

    #[test]
    fn set_bang_on_an_unbound_variable_is_an_error() {
        let mut interp = test_interp();
        let err = run_err(&mut interp, "(set! never-defined 1)");
        assert!(matches!(err, Error::UnboundVariable(_)));
    }

    #[test]
    fn set_bang_on_a_reserved_symbol_is_rejected() {
        let mut interp = test_interp();
        let err = run_err(&mut interp, "(set! car 1)");
        assert!(matches!(err, Error::ReservedMutation { .. }));
    }

    #[test]
    fn redefining_in_the_same_frame_overwrites_rather_than_shadows() {
        let mut interp = test_interp();
        run(&mut interp, "(define x 1)");
        run(&mut interp, "(define x 2)");
        let v = run(&mut interp, "x");
        assert_eq!(interp.heap.as_int(v).unwrap(), 2);
    }

    #[test]
    fn rest_parameter_collects_trailing_arguments() {
        let mut interp = test_interp();
        run(&mut interp, "(define (f a . rest) (length rest))");
        let v = run(&mut interp, "(f 1 2 3 4)");
        assert_eq!(interp.heap.as_int(v).unwrap(), 3);
    }

    #[test]
    fn lambda_with_duplicate_parameters_is_rejected() {
        let mut interp = test_interp();
        let err = run_err(&mut interp, "(lambda (x x) x)");
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn unbound_variable_reference_is_an_error() {
        let mut interp = test_interp();
        let err = run_err(&mut interp, "nope");
        assert!(matches!(err, Error::UnboundVariable(_)));
    }
}
