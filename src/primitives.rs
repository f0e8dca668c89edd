use crate::atom::{is_integer_literal, sym, AtomTable};
use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::value::Value;

/// The built-in procedures. The set is fixed; user code cannot add to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Primitive {
    Add,
    Subtract,
    Multiply,
    Divide,
    First,
    Rest,
    Equal,
    Cons,
    List,
    SetFirst,
    SetRest,
}

impl Primitive {
    /// Every primitive, in the order they are installed in the global frame.
    pub const ALL: [Primitive; 11] = [
        Primitive::Add,
        Primitive::Subtract,
        Primitive::Multiply,
        Primitive::Divide,
        Primitive::First,
        Primitive::Rest,
        Primitive::Equal,
        Primitive::Cons,
        Primitive::List,
        Primitive::SetFirst,
        Primitive::SetRest,
    ];

    /// Canonical name, also the global binding it is installed under.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Add => "+",
            Primitive::Subtract => "-",
            Primitive::Multiply => "*",
            Primitive::Divide => "/",
            Primitive::First => "car",
            Primitive::Rest => "cdr",
            Primitive::Equal => "=",
            Primitive::Cons => "cons",
            Primitive::List => "list",
            Primitive::SetFirst => "set-car!",
            Primitive::SetRest => "set-cdr!",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        Primitive::ALL.into_iter().find(|p| p.name() == name)
    }

    /// Fixed argument count, or None for `list`.
    pub fn arity(self) -> Option<usize> {
        match self {
            Primitive::First | Primitive::Rest => Some(1),
            Primitive::List => None,
            _ => Some(2),
        }
    }
}

/// Run a primitive on already-evaluated arguments.
///
/// The caller checks arity before evaluating anything; the count is
/// checked again here so direct callers get the same error.
pub fn call_primitive(
    prim: Primitive,
    args: &[Value],
    heap: &mut Heap,
    atoms: &mut AtomTable,
) -> LispResult<Value> {
    if let Some(n) = prim.arity() {
        if args.len() != n {
            return Err(LispError::arity(prim.name(), n, args.len()));
        }
    }

    match prim {
        Primitive::Add => arith(prim, args, atoms, i64::checked_add),
        Primitive::Subtract => arith(prim, args, atoms, i64::checked_sub),
        Primitive::Multiply => arith(prim, args, atoms, i64::checked_mul),
        Primitive::Divide => prim_divide(args, atoms),
        Primitive::First => prim_first(args[0], heap),
        Primitive::Rest => prim_rest(args[0], heap),
        Primitive::Equal => Ok(prim_equal(args[0], args[1], atoms)),
        Primitive::Cons => prim_cons(args[0], args[1], heap),
        Primitive::List => prim_list(args, heap),
        Primitive::SetFirst => prim_set_first(args[0], args[1], heap),
        Primitive::SetRest => prim_set_rest(args[0], args[1], heap),
    }
}

/// Read an evaluated argument as an integer.
fn integer(prim: Primitive, val: Value, atoms: &AtomTable) -> LispResult<i64> {
    let id = val.as_atom().ok_or_else(|| {
        LispError::TypeMismatch(format!("{}: expected an integer, got a {:?}", prim.name(), val.kind()))
    })?;
    let text = atoms.text(id);
    if !is_integer_literal(text) {
        return Err(LispError::TypeMismatch(format!(
            "{}: expected an integer, got '{}'",
            prim.name(),
            text
        )));
    }
    text.parse::<i64>()
        .map_err(|_| LispError::IntegerOverflow(format!("{}: '{}' does not fit in 64 bits", prim.name(), text)))
}

fn number(n: i64, atoms: &mut AtomTable) -> LispResult<Value> {
    Ok(Value::Atom(atoms.intern(&n.to_string())?))
}

fn arith(
    prim: Primitive,
    args: &[Value],
    atoms: &mut AtomTable,
    op: fn(i64, i64) -> Option<i64>,
) -> LispResult<Value> {
    let left = integer(prim, args[0], atoms)?;
    let right = integer(prim, args[1], atoms)?;
    let result = op(left, right)
        .ok_or_else(|| LispError::IntegerOverflow(format!("({} {} {})", prim.name(), left, right)))?;
    number(result, atoms)
}

/// (/ a b) -- truncating integer division.
fn prim_divide(args: &[Value], atoms: &mut AtomTable) -> LispResult<Value> {
    let left = integer(Primitive::Divide, args[0], atoms)?;
    let right = integer(Primitive::Divide, args[1], atoms)?;
    if right == 0 {
        return Err(LispError::DivisionByZero);
    }
    let result = left
        .checked_div(right)
        .ok_or_else(|| LispError::IntegerOverflow(format!("(/ {} {})", left, right)))?;
    number(result, atoms)
}

/// (car p)
fn prim_first(a: Value, heap: &Heap) -> LispResult<Value> {
    heap.car_val(a)
}

/// (cdr p)
fn prim_rest(a: Value, heap: &Heap) -> LispResult<Value> {
    heap.cdr_val(a)
}

/// (= a b) -- text equality for atoms, identity for everything else.
fn prim_equal(a: Value, b: Value, atoms: &AtomTable) -> Value {
    let same = match (a, b) {
        (Value::Atom(x), Value::Atom(y)) => atoms.same_text(x, y),
        _ => a == b,
    };
    Value::Atom(if same { sym::TRUE } else { sym::FALSE })
}

/// (cons a b) -- a new durable pair.
fn prim_cons(a: Value, b: Value, heap: &mut Heap) -> LispResult<Value> {
    let car = heap.deep_copy(a)?;
    let cdr = heap.deep_copy(b)?;
    Ok(Value::Pair(heap.alloc(car, cdr)?))
}

/// (list a ...) -- a fresh durable list of the arguments.
fn prim_list(args: &[Value], heap: &mut Heap) -> LispResult<Value> {
    let mut items = Vec::with_capacity(args.len());
    for &arg in args {
        items.push(heap.deep_copy(arg)?);
    }
    heap.list(&items)
}

/// (set-car! p v) -- mutate p in place, return p.
fn prim_set_first(a: Value, b: Value, heap: &mut Heap) -> LispResult<Value> {
    let id = a
        .as_pair()
        .ok_or_else(|| LispError::TypeMismatch("set-car!: not a pair".into()))?;
    let val = heap.deep_copy(b)?;
    heap.set_car(id, val);
    Ok(a)
}

/// (set-cdr! p v) -- mutate p in place, return p.
fn prim_set_rest(a: Value, b: Value, heap: &mut Heap) -> LispResult<Value> {
    let id = a
        .as_pair()
        .ok_or_else(|| LispError::TypeMismatch("set-cdr!: not a pair".into()))?;
    let val = heap.deep_copy(b)?;
    heap.set_cdr(id, val);
    Ok(a)
}
