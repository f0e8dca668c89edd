use crate::atom::AtomTable;
use crate::heap::Heap;
use crate::value::Value;

const MAX_PRINT_DEPTH: usize = 1000;

/// Print a value to a string.
pub fn print_val(val: Value, heap: &Heap, atoms: &AtomTable) -> String {
    let mut out = String::new();
    // A spine can't be longer than every cell in the heap unless it loops.
    let max_len = heap.durable_capacity() + heap.transient_capacity();
    print_inner(val, heap, atoms, &mut out, 0, max_len);
    out
}

fn print_inner(
    val: Value,
    heap: &Heap,
    atoms: &AtomTable,
    out: &mut String,
    depth: usize,
    max_len: usize,
) {
    if depth > MAX_PRINT_DEPTH {
        out.push_str("...");
        return;
    }

    match val {
        Value::Nil => out.push_str("()"),
        Value::Atom(id) => out.push_str(atoms.text(id)),
        Value::Prim(prim) => {
            out.push_str("#<procedure ");
            out.push_str(prim.name());
            out.push('>');
        }
        Value::Env(frame) => out.push_str(&format!("#<environment {}>", frame.index)),
        Value::Pair(_) if heap.is_closure(val) => out.push_str("#<lambda>"),
        Value::Pair(id) => {
            out.push('(');
            print_inner(heap.car(id), heap, atoms, out, depth + 1, max_len);

            let mut current = heap.cdr(id);
            let mut len = 1;
            loop {
                match current {
                    Value::Nil => break,
                    Value::Pair(_) if heap.is_closure(current) => {
                        // a closure in tail position is still opaque
                        out.push_str(" . #<lambda>");
                        break;
                    }
                    Value::Pair(pid) => {
                        if len >= max_len {
                            out.push_str(" ...");
                            break;
                        }
                        out.push(' ');
                        print_inner(heap.car(pid), heap, atoms, out, depth + 1, max_len);
                        current = heap.cdr(pid);
                        len += 1;
                    }
                    _ => {
                        out.push_str(" . ");
                        print_inner(current, heap, atoms, out, depth + 1, max_len);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}
