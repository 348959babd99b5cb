//! Mark-and-sweep collection.
//!
//! The root cons cells and storage blocks are marked with an explicit
//! worklist rather than Deutsch–Schorr–Waite pointer reversal: the design
//! only requires non-recursive traversal, and an explicit stack of arena
//! indices gets that without unsafe in-place link rewriting. Storage blocks
//! are terminal (marked and not traversed further).

use super::{Heap, HeapStats};
use crate::value::Value;

/// Marks everything reachable from `roots`, sweeps both arenas, and
/// returns the post-collection heap statistics.
pub fn collect(heap: &mut Heap, roots: impl IntoIterator<Item = Value>) -> HeapStats {
    let mut worklist: Vec<Value> = roots.into_iter().collect();

    while let Some(v) = worklist.pop() {
        match v {
            Value::Cons(idx) => {
                let already_marked = heap.mark_cons(idx);
                if !already_marked {
                    let (car, cdr) = heap.cons_children(idx);
                    worklist.push(car);
                    worklist.push(cdr);
                }
            }
            Value::Storage(idx) => heap.mark_storage(idx),
            Value::Nil | Value::Bool(_) | Value::Char(_) | Value::ShortInt(_) => {}
            Value::ShortStr(_) | Value::ShortSym(_) => {}
        }
    }

    heap.sweep_cons();
    heap.sweep_storage();
    heap.stats()
}
