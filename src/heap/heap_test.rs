use proptest::prelude::*;

use super::*;
use crate::primitives::reserved::ReservedSymbols;

#[test]
fn heap_new_starts_fully_free() {
    let heap = Heap::new(16, 64);
    let stats = heap.stats();
    assert_eq!(stats.cons_free, 16);
    assert_eq!(stats.cons_total, 16);
    assert_eq!(stats.storage_free_words, 64);
}

#[test]
fn cons_alloc_links_car_and_cdr() {
    let mut heap = Heap::new(4, 16);
    let pair = heap
        .try_new_cons(Value::ShortInt(1), Value::ShortInt(2))
        .unwrap();
    assert_eq!(heap.car(pair).unwrap(), Value::ShortInt(1));
    assert_eq!(heap.cdr(pair).unwrap(), Value::ShortInt(2));
    assert_eq!(heap.stats().cons_free, 3);
}

#[test]
fn cons_alloc_out_of_space_returns_none() {
    let mut heap = Heap::new(1, 16);
    assert!(heap.try_new_cons(Value::Nil, Value::Nil).is_some());
    assert!(heap.try_new_cons(Value::Nil, Value::Nil).is_none());
}

#[test]
fn set_car_and_set_cdr_mutate_in_place() {
    let mut heap = Heap::new(4, 16);
    let pair = heap.try_new_cons(Value::Nil, Value::Nil).unwrap();
    heap.set_car(pair, Value::ShortInt(9)).unwrap();
    heap.set_cdr(pair, Value::ShortInt(10)).unwrap();
    assert_eq!(heap.car(pair).unwrap(), Value::ShortInt(9));
    assert_eq!(heap.cdr(pair).unwrap(), Value::ShortInt(10));
}

#[test]
fn car_of_non_pair_is_a_type_error() {
    let heap = Heap::new(4, 16);
    let err = heap.car(Value::ShortInt(1)).unwrap_err();
    assert!(matches!(err, Error::ArgumentType { expected: "pair", .. }));
}

#[test]
fn short_strings_and_symbols_are_immediate() {
    let mut heap = Heap::new(4, 16);
    assert!(matches!(heap.try_make_string("hi").unwrap(), Value::ShortStr(_)));
    let reserved = ReservedSymbols::empty();
    assert!(matches!(
        heap.try_make_symbol("xy", &reserved).unwrap(),
        Value::ShortSym(_)
    ));
}

#[test]
fn long_strings_are_boxed_and_readable() {
    let mut heap = Heap::new(4, 32);
    let v = heap.try_make_string("hello world").unwrap();
    assert!(matches!(v, Value::Storage(_)));
    assert_eq!(heap.as_str(v).unwrap(), "hello world");
}

#[test]
fn short_and_wide_integers_round_trip() {
    let mut heap = Heap::new(4, 32);
    let small = heap.try_make_int(42).unwrap();
    assert!(matches!(small, Value::ShortInt(42)));
    let wide = heap.try_make_int(1_000_000).unwrap();
    assert!(matches!(wide, Value::Storage(_)));
    assert_eq!(heap.as_int(wide).unwrap(), 1_000_000);
}

#[test]
fn eq_is_identity_for_cons_and_value_equality_for_boxed_payloads() {
    let mut heap = Heap::new(4, 64);
    let a = heap.try_new_cons(Value::Nil, Value::Nil).unwrap();
    let b = heap.try_new_cons(Value::Nil, Value::Nil).unwrap();
    assert!(heap.eq(a, a));
    assert!(!heap.eq(a, b));

    let s1 = heap.try_make_string("a long equal string").unwrap();
    let s2 = heap.try_make_string("a long equal string").unwrap();
    assert!(heap.eq(s1, s2));

    let s3 = heap.try_make_string("a different string!!").unwrap();
    assert!(!heap.eq(s1, s3));
}

#[test]
fn allocation_tail_splitting_keeps_remaining_space_usable() {
    let mut heap = Heap::new(4, 64);
    let _short = heap.try_make_string("abcdefgh").unwrap();
    let stats_after_first = heap.stats();
    assert!(stats_after_first.storage_free_words < 64);
    // A second allocation should still succeed out of the remaining tail.
    let second = heap.try_make_string("ijklmnop").unwrap();
    assert!(matches!(second, Value::Storage(_)));
}

proptest! {
    /// `eq?(x, x)` is true for every short-int value, matching spec.md's
    /// reflexivity property.
    #[test]
    fn eq_is_reflexive_for_short_ints(n in i16::MIN..=i16::MAX) {
        let heap = Heap::new(4, 16);
        let v = Value::ShortInt(n);
        prop_assert!(heap.eq(v, v));
    }

    /// Two independently constructed short symbols of the same name (length
    /// <= 3) are pointer-equal, i.e. equal as immediates.
    #[test]
    fn short_symbols_of_equal_name_are_pointer_equal(name in "[a-z]{1,3}") {
        let mut heap = Heap::new(4, 16);
        let reserved = ReservedSymbols::empty();
        let a = heap.try_make_symbol(&name, &reserved).unwrap();
        let b = heap.try_make_symbol(&name, &reserved).unwrap();
        prop_assert!(matches!(a, Value::ShortSym(_)));
        prop_assert_eq!(a, b);
    }

    /// `length(cons(a, cons(b, cons(c, NIL)))) == 3` for arbitrary short-int
    /// payloads.
    #[test]
    fn three_cons_list_has_length_three(a in i16::MIN..=i16::MAX, b in i16::MIN..=i16::MAX, c in i16::MIN..=i16::MAX) {
        let mut heap = Heap::new(8, 16);
        let tail = heap.try_new_cons(Value::ShortInt(c), Value::Nil).unwrap();
        let mid = heap.try_new_cons(Value::ShortInt(b), tail).unwrap();
        let list = heap.try_new_cons(Value::ShortInt(a), mid).unwrap();

        let mut n = 0;
        let mut cur = list;
        while let Value::Cons(_) = cur {
            n += 1;
            cur = heap.cdr(cur).unwrap();
        }
        prop_assert_eq!(n, 3);
    }

    /// `(car (cons x y))` and `(cdr (cons x y))` recover exactly `x` and `y`.
    #[test]
    fn cons_car_cdr_round_trip(x in i16::MIN..=i16::MAX, y in i16::MIN..=i16::MAX) {
        let mut heap = Heap::new(4, 16);
        let pair = heap.try_new_cons(Value::ShortInt(x), Value::ShortInt(y)).unwrap();
        prop_assert_eq!(heap.car(pair).unwrap(), Value::ShortInt(x));
        prop_assert_eq!(heap.cdr(pair).unwrap(), Value::ShortInt(y));
    }
}
