use super::*;
use crate::interpreter::{Config, Interpreter};

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
fn define_then_lookup_in_global_env() {
    let mut interp = test_interp();
    let sym = interp.make_symbol("answer").unwrap();
    let val = interp.make_int(42).unwrap();
    let global_env = interp.global_env;
    define_variable(&mut interp, sym, val, global_env).unwrap();

    let binding = binding_in_env(&interp.heap, sym, global_env).unwrap().unwrap();
    assert_eq!(interp.heap.cdr(binding).unwrap(), val);
}

#[test]
fn redefining_in_same_frame_overwrites_rather_than_shadows() {
    let mut interp = test_interp();
    let sym = interp.make_symbol("x").unwrap();
    let v1 = interp.make_int(1).unwrap();
    let v2 = interp.make_int(2).unwrap();
    let global_env = interp.global_env;
    define_variable(&mut interp, sym, v1, global_env).unwrap();
    define_variable(&mut interp, sym, v2, global_env).unwrap();

    let frame = first_frame(&interp.heap, global_env).unwrap();
    // Exactly one binding for `x`, now holding v2.
    let binding = binding_in_frame(&interp.heap, sym, frame).unwrap().unwrap();
    assert_eq!(interp.heap.cdr(binding).unwrap(), v2);
    let rest = interp.heap.cdr(frame).unwrap();
    assert!(binding_in_frame(&interp.heap, sym, rest).unwrap().is_none());
}

#[test]
fn set_unbound_variable_fails() {
    let mut interp = test_interp();
    let sym = interp.make_symbol("nope").unwrap();
    let val = interp.make_int(1).unwrap();
    let global_env = interp.global_env;
    let err = set_variable(&mut interp, sym, val, global_env).unwrap_err();
    assert!(matches!(err, Error::UnboundVariable(_)));
}

#[test]
fn set_locates_binding_through_parent_chain() {
    let mut interp = test_interp();
    let sym = interp.make_symbol("x").unwrap();
    let v1 = interp.make_int(1).unwrap();
    let global_env = interp.global_env;
    define_variable(&mut interp, sym, v1, global_env).unwrap();

    let child = extend_environment(&mut interp, Value::Nil, Value::Nil, global_env).unwrap();
    let v2 = interp.make_int(2).unwrap();
    set_variable(&mut interp, sym, v2, child).unwrap();

    let binding = binding_in_env(&interp.heap, sym, global_env).unwrap().unwrap();
    assert_eq!(interp.heap.cdr(binding).unwrap(), v2);
}

#[test]
fn extend_environment_binds_proper_param_list() {
    let mut interp = test_interp();
    let x = interp.make_symbol("x").unwrap();
    let y = interp.make_symbol("y").unwrap();
    let params_tail = interp.new_cons(y, Value::Nil).unwrap();
    let params = interp.new_cons(x, params_tail).unwrap();
    let a1 = interp.make_int(10).unwrap();
    let a2 = interp.make_int(20).unwrap();
    let args_tail = interp.new_cons(a2, Value::Nil).unwrap();
    let args = interp.new_cons(a1, args_tail).unwrap();
    let global_env = interp.global_env;

    let env = extend_environment(&mut interp, params, args, global_env).unwrap();
    let bx = binding_in_env(&interp.heap, x, env).unwrap().unwrap();
    let by = binding_in_env(&interp.heap, y, env).unwrap().unwrap();
    assert_eq!(interp.heap.cdr(bx).unwrap(), a1);
    assert_eq!(interp.heap.cdr(by).unwrap(), a2);
}

#[test]
fn extend_environment_rest_param_captures_all_args() {
    let mut interp = test_interp();
    let rest = interp.make_symbol("rest").unwrap();
    let a1 = interp.make_int(1).unwrap();
    let a2 = interp.make_int(2).unwrap();
    let args_tail = interp.new_cons(a2, Value::Nil).unwrap();
    let args = interp.new_cons(a1, args_tail).unwrap();
    let global_env = interp.global_env;

    let env = extend_environment(&mut interp, rest, args, global_env).unwrap();
    let binding = binding_in_env(&interp.heap, rest, env).unwrap().unwrap();
    let captured = interp.heap.cdr(binding).unwrap();
    assert_eq!(interp.heap.car(captured).unwrap(), a1);
}

#[test]
fn extend_environment_mismatched_arity_fails() {
    let mut interp = test_interp();
    let x = interp.make_symbol("x").unwrap();
    let params = interp.new_cons(x, Value::Nil).unwrap();
    let global_env = interp.global_env;
    let err = extend_environment(&mut interp, params, Value::Nil, global_env).unwrap_err();
    assert!(matches!(err, Error::ArgumentArity { .. }));
}

#[test]
fn defining_a_reserved_symbol_fails() {
    let mut interp = test_interp();
    let car_sym = interp.reserved.lookup("car").unwrap();
    let val = interp.make_int(1).unwrap();
    let global_env = interp.global_env;
    let err = define_variable(&mut interp, car_sym, val, global_env).unwrap_err();
    assert!(matches!(err, Error::ReservedMutation { .. }));
}
