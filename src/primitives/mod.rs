//! The built-in primitive dispatcher: identifies reserved operator symbols,
//! validates arity under the toggleable `syntaxcheck`, and computes the
//! result for every group in the primitive table (pair access, pair
//! construction, arithmetic, logic, predicates, misc, runtime).

use crate::error::Error;
use crate::heap::Heap;
use crate::interpreter::Interpreter;
use crate::printer;
use crate::value::Value;

pub mod reserved;


enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

fn is_cxr(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 3
        && bytes[0] == b'c'
        && *bytes.last().unwrap() == b'r'
        && name[1..name.len() - 1].bytes().all(|b| b == b'a' || b == b'd')
}

fn expected_arity(name: &str) -> Arity {
    if is_cxr(name) {
        return Arity::Exact(1);
    }
    match name {
        "cons" | "set-car!" | "set-cdr!" | "eq?" => Arity::Exact(2),
        "not" | "pair?" | "null?" | "number?" | "integer?" | "string?" | "symbol?" | "list?"
        | "odd?" | "even?" | "boolean?" | "length" | "write" => Arity::Exact(1),
        "newline" | "read" | "gcstat" | "gcstatwrite" | "garbagecollect" | "memdump"
        | "synchecktoggle" => Arity::Exact(0),
        "-" | "/" | "error" => Arity::AtLeast(1),
        "+" | "*" | "list" | "<" | "<=" | "=" | ">" | ">=" => Arity::Any,
        _ => Arity::Any,
    }
}

fn check_arity(name: &str, got: usize) -> Result<(), Error> {
    match expected_arity(name) {
        Arity::Exact(n) if got != n => Err(Error::ArgumentArity {
            expected: n.to_string(),
            got,
            detail: name.to_string(),
        }),
        Arity::AtLeast(n) if got < n => Err(Error::ArgumentArity {
            expected: format!("at least {n}"),
            got,
            detail: name.to_string(),
        }),
        _ => Ok(()),
    }
}

fn arg(args: &[Value], i: usize, who: &str) -> Result<Value, Error> {
    args.get(i).copied().ok_or_else(|| Error::ArgumentArity {
        expected: format!("at least {}", i + 1),
        got: args.len(),
        detail: who.to_string(),
    })
}

fn list_to_vec(heap: &Heap, mut v: Value) -> Result<Vec<Value>, Error> {
    let mut out = Vec::new();
    while let Value::Cons(_) = v {
        out.push(heap.car(v)?);
        v = heap.cdr(v)?;
    }
    if !v.is_nil() {
        return Err(Error::ArgumentType {
            expected: "proper list",
            got: heap.type_name(v),
            detail: "argument list".to_string(),
        });
    }
    Ok(out)
}

pub(crate) fn list_length(heap: &Heap, v: Value) -> Result<usize, Error> {
    let mut n = 0;
    let mut cur = v;
    while let Value::Cons(_) = cur {
        n += 1;
        cur = heap.cdr(cur)?;
    }
    if !cur.is_nil() {
        return Err(Error::ArgumentType {
            expected: "proper list",
            got: heap.type_name(cur),
            detail: "length".to_string(),
        });
    }
    Ok(n)
}

pub(crate) fn is_proper_list(heap: &Heap, v: Value) -> Result<bool, Error> {
    let mut cur = v;
    loop {
        match cur {
            Value::Nil => return Ok(true),
            Value::Cons(_) => cur = heap.cdr(cur)?,
            _ => return Ok(false),
        }
    }
}

/// Applies the sequence of `car`/`cdr` steps encoded by `name` (e.g.
/// `caddr` is `car` applied last, to the result of `cdr (cdr x)`).
fn apply_cxr(heap: &Heap, name: &str, v: Value) -> Result<Value, Error> {
    let mut v = v;
    for ch in name[1..name.len() - 1].bytes().rev() {
        v = if ch == b'a' { heap.car(v)? } else { heap.cdr(v)? };
    }
    Ok(v)
}

fn build_list(interp: &mut Interpreter, args: &[Value]) -> Result<Value, Error> {
    let mut result = Value::Nil;
    for v in args.iter().rev() {
        result = interp.new_cons(*v, result)?;
    }
    Ok(result)
}

fn div_zero_error(op: &str) -> Error {
    Error::ArgumentType {
        expected: "non-zero divisor",
        got: "zero",
        detail: op.to_string(),
    }
}

fn prim_add(interp: &mut Interpreter, args: &[Value]) -> Result<Value, Error> {
    let mut acc: i64 = 0;
    for v in args {
        acc = acc.wrapping_add(interp.heap.as_int(*v)?);
    }
    interp.make_int(acc)
}

fn prim_mul(interp: &mut Interpreter, args: &[Value]) -> Result<Value, Error> {
    let mut acc: i64 = 1;
    for v in args {
        acc = acc.wrapping_mul(interp.heap.as_int(*v)?);
    }
    interp.make_int(acc)
}

fn prim_sub(interp: &mut Interpreter, args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::ArgumentArity {
            expected: "at least 1".to_string(),
            got: 0,
            detail: "-".to_string(),
        });
    }
    if args.len() == 1 {
        let n = interp.heap.as_int(args[0])?;
        return interp.make_int(n.wrapping_neg());
    }
    let mut acc = interp.heap.as_int(args[0])?;
    for v in &args[1..] {
        acc = acc.wrapping_sub(interp.heap.as_int(*v)?);
    }
    interp.make_int(acc)
}

/// Floor division: truncates toward negative infinity, not toward zero, so
/// `(/ -7 2)` is `-4`, not `-3`. See DESIGN.md for this open-question
/// resolution.
fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        q - 1
    } else {
        q
    }
}

fn prim_div(interp: &mut Interpreter, args: &[Value]) -> Result<Value, Error> {
    if args.is_empty() {
        return Err(Error::ArgumentArity {
            expected: "at least 1".to_string(),
            got: 0,
            detail: "/".to_string(),
        });
    }
    if args.len() == 1 {
        let x = interp.heap.as_int(args[0])?;
        if x == 0 {
            return Err(div_zero_error("/"));
        }
        return interp.make_int(floor_div(1, x));
    }
    let mut acc = interp.heap.as_int(args[0])?;
    for v in &args[1..] {
        let d = interp.heap.as_int(*v)?;
        if d == 0 {
            return Err(div_zero_error("/"));
        }
        acc = floor_div(acc, d);
    }
    interp.make_int(acc)
}

fn prim_compare(interp: &Interpreter, op: &str, args: &[Value]) -> Result<Value, Error> {
    let mut nums = Vec::with_capacity(args.len());
    for v in args {
        nums.push(interp.heap.as_int(*v)?);
    }
    let cmp: fn(i64, i64) -> bool = match op {
        "<" => |a, b| a < b,
        "<=" => |a, b| a <= b,
        "=" => |a, b| a == b,
        ">" => |a, b| a > b,
        ">=" => |a, b| a >= b,
        _ => unreachable!("prim_compare called with non-comparison op"),
    };
    Ok(Value::make_bool(nums.windows(2).all(|w| cmp(w[0], w[1]))))
}

fn build_user_error(heap: &Heap, args: &[Value]) -> Error {
    let parts: Vec<String> = args
        .iter()
        .map(|v| heap.as_str(*v).map_or_else(|_| format!("{v:?}"), str::to_string))
        .collect();
    Error::User(format!("RUNTIME ERROR (user): {}", parts.join(" ")))
}

fn build_gcstat(interp: &mut Interpreter) -> Result<Value, Error> {
    let stats = interp.heap.stats();
    let free = interp.make_int(stats.cons_free as i64)?;
    let storage_free = interp.make_int(i64::from(stats.storage_free_words))?;
    let largest = interp.make_int(i64::from(stats.largest_free_run_words))?;

    interp.value_stack.push(free)?;
    interp.value_stack.push(storage_free)?;
    let tail = interp.new_cons(largest, Value::Nil)?;
    let storage_free = interp.value_stack.pop()?;
    let mid = interp.new_cons(storage_free, tail)?;
    let free = interp.value_stack.pop()?;
    interp.new_cons(free, mid)
}

/// Applies the named primitive to the already-evaluated `args` list.
pub fn apply(interp: &mut Interpreter, op_name: &str, args_list: Value) -> Result<Value, Error> {
    let args = list_to_vec(&interp.heap, args_list)?;
    if interp.syntaxcheck {
        check_arity(op_name, args.len())?;
    }

    if is_cxr(op_name) {
        let v = arg(&args, 0, op_name)?;
        return apply_cxr(&interp.heap, op_name, v);
    }

    match op_name {
        "cons" => {
            let a = arg(&args, 0, op_name)?;
            let b = arg(&args, 1, op_name)?;
            interp.new_cons(a, b)
        }
        "list" => build_list(interp, &args),
        "set-car!" => {
            let p = arg(&args, 0, op_name)?;
            let v = arg(&args, 1, op_name)?;
            interp.heap.set_car(p, v)?;
            Ok(p)
        }
        "set-cdr!" => {
            let p = arg(&args, 0, op_name)?;
            let v = arg(&args, 1, op_name)?;
            interp.heap.set_cdr(p, v)?;
            Ok(p)
        }
        "+" => prim_add(interp, &args),
        "-" => prim_sub(interp, &args),
        "*" => prim_mul(interp, &args),
        "/" => prim_div(interp, &args),
        "<" | "<=" | "=" | ">" | ">=" => prim_compare(interp, op_name, &args),
        "not" => Ok(Value::make_bool(!arg(&args, 0, op_name)?.is_truthy())),
        "pair?" => Ok(Value::make_bool(
            interp.heap.type_name(arg(&args, 0, op_name)?) == "pair",
        )),
        "null?" => Ok(Value::make_bool(arg(&args, 0, op_name)?.is_nil())),
        "number?" | "integer?" => Ok(Value::make_bool(
            interp.heap.type_name(arg(&args, 0, op_name)?) == "integer",
        )),
        "string?" => Ok(Value::make_bool(
            interp.heap.type_name(arg(&args, 0, op_name)?) == "string",
        )),
        "symbol?" => Ok(Value::make_bool(
            interp.heap.type_name(arg(&args, 0, op_name)?) == "symbol",
        )),
        "list?" => Ok(Value::make_bool(is_proper_list(
            &interp.heap,
            arg(&args, 0, op_name)?,
        )?)),
        "eq?" => {
            let a = arg(&args, 0, op_name)?;
            let b = arg(&args, 1, op_name)?;
            Ok(Value::make_bool(interp.heap.eq(a, b)))
        }
        "odd?" => {
            let n = interp.heap.as_int(arg(&args, 0, op_name)?)?;
            Ok(Value::make_bool(n % 2 != 0))
        }
        "even?" => {
            let n = interp.heap.as_int(arg(&args, 0, op_name)?)?;
            Ok(Value::make_bool(n % 2 == 0))
        }
        "boolean?" => Ok(Value::make_bool(matches!(
            arg(&args, 0, op_name)?,
            Value::Bool(_)
        ))),
        "length" => {
            let n = list_length(&interp.heap, arg(&args, 0, op_name)?)?;
            interp.make_int(n as i64)
        }
        "newline" => {
            println!();
            Ok(Value::Nil)
        }
        "write" => {
            let v = arg(&args, 0, op_name)?;
            let text = printer::write_to_string(&interp.heap, &interp.reserved, v);
            print!("{text}");
            Ok(v)
        }
        "read" => Ok(Value::Nil),
        "error" => Err(build_user_error(&interp.heap, &args)),
        "gcstat" => build_gcstat(interp),
        "gcstatwrite" => {
            let stats = interp.heap.stats();
            println!(
                "gcstat: cons_free={}/{} storage_free_words={}/{} largest_free_run={}",
                stats.cons_free,
                stats.cons_total,
                stats.storage_free_words,
                stats.storage_total_words,
                stats.largest_free_run_words
            );
            Ok(Value::Nil)
        }
        "garbagecollect" => {
            let stats = interp.collect_garbage();
            interp.make_int(stats.cons_free as i64)
        }
        "synchecktoggle" => {
            interp.syntaxcheck = !interp.syntaxcheck;
            Ok(Value::make_bool(interp.syntaxcheck))
        }
        "memdump" => {
            let stats = interp.heap.stats();
            println!("memdump: {stats:?}");
            Ok(Value::Nil)
        }
        other => Err(Error::UnboundVariable(other.to_string())),
    }
}
