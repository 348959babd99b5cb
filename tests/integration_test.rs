//! End-to-end scenarios driving the reader, evaluator and primitive
//! dispatcher together through the public `micro_eval` library crate.

use micro_eval::error::Error;
use micro_eval::eval::eval;
use micro_eval::interpreter::{Config, Interpreter};
use micro_eval::printer::write_to_string;
use micro_eval::reader::parser::Parser;

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

fn run_all(interp: &mut Interpreter, src: &str) -> String {
    let mut parser = Parser::new(src);
    let mut last = String::new();
    loop {
        let exp = match parser.read_one(interp).unwrap() {
            Some(exp) => exp,
            None => break,
        };
        let env = interp.global_env;
        let val = eval(interp, exp, env).unwrap();
        last = write_to_string(&interp.heap, &interp.reserved, val);
    }
    last
}

#[test]
fn sums_several_integers() {
    let mut interp = test_interp();
    assert_eq!(run_all(&mut interp, "(+ 1 2 3)"), "6");
}

#[test]
fn recursive_factorial_of_six() {
    let mut interp = test_interp();
    let out = run_all(
        &mut interp,
        "(define (fact n) (if (= n 0) 1 (* n (fact (- n 1))))) (fact 6)",
    );
    assert_eq!(out, "720");
}

#[test]
fn let_binding_sums_its_locals() {
    let mut interp = test_interp();
    assert_eq!(run_all(&mut interp, "(let ((x 10) (y 20)) (+ x y))"), "30");
}

#[test]
fn cond_picks_the_first_true_clause() {
    let mut interp = test_interp();
    let out = run_all(&mut interp, "(cond ((= 1 2) 'a) ((= 2 2) 'b) (else 'c))");
    assert_eq!(out, "b");
}

#[test]
fn define_and_set_bang_compose() {
    let mut interp = test_interp();
    let out = run_all(&mut interp, "(define x 1) (set! x (+ x 41)) x");
    assert_eq!(out, "42");
}

/// Allocates a 20000-element list in a loop with a heap far too small to
/// hold it all at once, exercising both successful GC-reclaim mid-loop and
/// the eventual `OutOfConsSpace` once genuinely live data exceeds capacity.
#[test]
fn exhausting_cons_space_reports_out_of_cons_space_and_gc_reclaims_the_rest() {
    let mut interp = Interpreter::new(Config {
        cons_capacity: 64,
        storage_words: 4096,
        value_stack_depth: 256,
        label_stack_depth: 256,
        syntaxcheck: true,
    })
    .unwrap();

    // One cell is already spent on the global environment's header, so the
    // free count right after construction, not the raw capacity, is the
    // budget this loop has to work with.
    let initial_free = interp.heap.stats().cons_free;

    // `list` is parked on the value stack (a GC root) around every
    // allocation that doesn't take it as a direct argument, the same
    // discipline the evaluator itself follows.
    let mut list = micro_eval::value::Value::Nil;
    let mut allocated = 0;
    let mut hit_out_of_space = false;
    for i in 0..20_000_i64 {
        interp.value_stack.push(list).unwrap();
        let n = match interp.make_int(i) {
            Ok(n) => n,
            Err(Error::OutOfStorage) => {
                interp.value_stack.pop().unwrap();
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        };
        list = interp.value_stack.pop().unwrap();
        match interp.new_cons(n, list) {
            Ok(cell) => {
                list = cell;
                allocated += 1;
            }
            Err(Error::OutOfConsSpace) => {
                hit_out_of_space = true;
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert!(hit_out_of_space, "a 64-cell arena cannot hold 20000 live cells");
    assert!(allocated > 0);

    // Root the surviving list permanently so the final collection can see
    // it: everything built so far must still be reachable.
    interp.root_stack.push(list);
    let stats = interp.collect_garbage();
    assert_eq!(stats.cons_free, initial_free - allocated);

    // Running the collector again with no new allocation must be
    // idempotent.
    let stats_again = interp.collect_garbage();
    assert_eq!(stats_again, stats);
}
