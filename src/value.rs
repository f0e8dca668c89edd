use std::fmt;

use crate::primitives::Primitive;

/// Handle to an interned atom in the symbol buffer.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtomId(pub u32);

/// Which pair arena a cell lives in.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Region {
    /// Reader output. Reset before every read.
    Transient,
    /// Structure retained by evaluation. Never reclaimed within a run.
    Durable,
}

/// Index into one of the pair arenas.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairId {
    pub region: Region,
    pub index: u32,
}

/// Handle to an environment frame. The generation changes every time the
/// pool slot is handed out again, so a handle to a reclaimed frame is
/// detectable instead of silently aliasing the new scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    pub index: u32,
    pub generation: u32,
}

/// A Lisp value. Copy semantics: pair contents live in the heap, atom text
/// in the atom table, frames in the frame pool.
///
/// A closure is a `Pair` whose car is an `Env`; there is no closure variant.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Nil,
    Atom(AtomId),
    Pair(PairId),
    Env(FrameId),
    Prim(Primitive),
}

/// The kind of a value. Every value has exactly one.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Kind {
    Nil,
    Atom,
    Pair,
    Environment,
    Primitive,
}

impl Value {
    pub fn kind(self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Atom(_) => Kind::Atom,
            Value::Pair(_) => Kind::Pair,
            Value::Env(_) => Kind::Environment,
            Value::Prim(_) => Kind::Primitive,
        }
    }

    pub fn is_nil(self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn is_pair(self) -> bool {
        matches!(self, Value::Pair(_))
    }

    pub fn as_pair(self) -> Option<PairId> {
        match self {
            Value::Pair(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_atom(self) -> Option<AtomId> {
        match self {
            Value::Atom(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_env(self) -> Option<FrameId> {
        match self {
            Value::Env(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_prim(self) -> Option<Primitive> {
        match self {
            Value::Prim(p) => Some(p),
            _ => None,
        }
    }

    /// True if this value lives in, or points into, transient reader storage.
    pub fn is_transient(self) -> bool {
        matches!(self, Value::Pair(id) if id.region == Region::Transient)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "Nil"),
            Value::Atom(id) => write!(f, "Atom({})", id.0),
            Value::Pair(id) => write!(f, "{:?}", id),
            Value::Env(id) => write!(f, "{:?}", id),
            Value::Prim(p) => write!(f, "Prim({})", p.name()),
        }
    }
}

impl fmt::Debug for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AtomId({})", self.0)
    }
}

impl fmt::Debug for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.region {
            Region::Transient => "t",
            Region::Durable => "d",
        };
        write!(f, "Pair({}{})", tag, self.index)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame({}#{})", self.index, self.generation)
    }
}
