use tracing::debug;

use crate::error::{LispError, LispResult};
use crate::value::{PairId, Region, Value};

/// A single cons cell.
pub struct ConsCell {
    pub car: Value,
    pub cdr: Value,
}

/// A bounded, bump-allocated store of cons cells.
struct Arena {
    cells: Vec<ConsCell>,
    capacity: usize,
    region: Region,
    name: &'static str,
}

impl Arena {
    fn new(region: Region, name: &'static str, capacity: usize) -> Self {
        Arena {
            cells: Vec::with_capacity(capacity.min(1024)),
            capacity,
            region,
            name,
        }
    }

    fn alloc(&mut self, car: Value, cdr: Value) -> LispResult<PairId> {
        if self.cells.len() >= self.capacity {
            return Err(LispError::ArenaExhausted {
                arena: self.name,
                capacity: self.capacity,
            });
        }
        let id = PairId {
            region: self.region,
            index: self.cells.len() as u32,
        };
        self.cells.push(ConsCell { car, cdr });
        Ok(id)
    }
}

/// The pair heap: a transient arena for parse trees and a durable arena for
/// everything evaluation keeps.
///
/// Nothing in the durable arena ever points into the transient one; values
/// cross over through `deep_copy`.
pub struct Heap {
    transient: Arena,
    durable: Arena,
}

impl Heap {
    pub fn new(transient_capacity: usize, durable_capacity: usize) -> Self {
        Heap {
            transient: Arena::new(Region::Transient, "transient parse arena", transient_capacity),
            durable: Arena::new(Region::Durable, "durable list arena", durable_capacity),
        }
    }

    /// Allocate a durable pair.
    pub fn alloc(&mut self, car: Value, cdr: Value) -> LispResult<PairId> {
        self.durable.alloc(car, cdr)
    }

    /// Allocate a reader pair. Only valid until the next `reset_transient`.
    pub fn alloc_transient(&mut self, car: Value, cdr: Value) -> LispResult<PairId> {
        self.transient.alloc(car, cdr)
    }

    /// Drop every transient pair. Called before each read.
    pub fn reset_transient(&mut self) {
        if !self.transient.cells.is_empty() {
            debug!(cells = self.transient.cells.len(), "resetting transient arena");
        }
        self.transient.cells.clear();
    }

    #[inline]
    fn cell(&self, id: PairId) -> &ConsCell {
        match id.region {
            Region::Transient => &self.transient.cells[id.index as usize],
            Region::Durable => &self.durable.cells[id.index as usize],
        }
    }

    #[inline]
    fn cell_mut(&mut self, id: PairId) -> &mut ConsCell {
        match id.region {
            Region::Transient => &mut self.transient.cells[id.index as usize],
            Region::Durable => &mut self.durable.cells[id.index as usize],
        }
    }

    #[inline]
    pub fn car(&self, id: PairId) -> Value {
        self.cell(id).car
    }

    #[inline]
    pub fn cdr(&self, id: PairId) -> Value {
        self.cell(id).cdr
    }

    /// Overwrite the car of a pair in place.
    #[inline]
    pub fn set_car(&mut self, id: PairId, val: Value) {
        self.cell_mut(id).car = val;
    }

    /// Overwrite the cdr of a pair in place.
    #[inline]
    pub fn set_cdr(&mut self, id: PairId, val: Value) {
        self.cell_mut(id).cdr = val;
    }

    /// Car of a value that must be a pair.
    pub fn car_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Pair(id) => Ok(self.car(id)),
            _ => Err(LispError::TypeMismatch("car of a non-pair".into())),
        }
    }

    /// Cdr of a value that must be a pair.
    pub fn cdr_val(&self, val: Value) -> LispResult<Value> {
        match val {
            Value::Pair(id) => Ok(self.cdr(id)),
            _ => Err(LispError::TypeMismatch("cdr of a non-pair".into())),
        }
    }

    /// Build a proper durable list from a slice of values.
    /// The values must already be durable.
    pub fn list(&mut self, values: &[Value]) -> LispResult<Value> {
        let mut result = Value::Nil;
        for &val in values.iter().rev() {
            result = Value::Pair(self.alloc(val, result)?);
        }
        Ok(result)
    }

    /// Collect a proper list into a Vec. Returns None if not a proper list.
    pub fn list_to_vec(&self, val: Value) -> Option<Vec<Value>> {
        let mut result = Vec::new();
        let mut current = val;
        loop {
            match current {
                Value::Nil => return Some(result),
                Value::Pair(id) => {
                    result.push(self.car(id));
                    current = self.cdr(id);
                }
                _ => return None,
            }
        }
    }

    /// A closure is a pair whose car is an environment reference.
    pub fn is_closure(&self, val: Value) -> bool {
        match val {
            Value::Pair(id) => matches!(self.car(id), Value::Env(_)),
            _ => false,
        }
    }

    /// Copy `val` so that it no longer references transient storage.
    ///
    /// Transient pairs are copied cell by cell into the durable arena.
    /// Durable pairs are returned as they are: durable structure never
    /// reaches back into the transient arena, so it is already safe to
    /// retain, and sharing it keeps `set-car!`/`set-cdr!` visible through
    /// every reference. Closures are built durable, so their captured frame
    /// is never copied.
    pub fn deep_copy(&mut self, val: Value) -> LispResult<Value> {
        if !val.is_transient() {
            return Ok(val);
        }

        // Walk the transient spine iteratively; only cars recurse.
        let mut cars = Vec::new();
        let mut current = val;
        while let Value::Pair(id) = current {
            if id.region == Region::Durable {
                break;
            }
            let car = self.car(id);
            cars.push(self.deep_copy(car)?);
            current = self.cdr(id);
        }

        let mut result = current;
        for car in cars.into_iter().rev() {
            result = Value::Pair(self.alloc(car, result)?);
        }
        Ok(result)
    }

    /// Cells handed out from the durable arena.
    pub fn durable_used(&self) -> usize {
        self.durable.cells.len()
    }

    pub fn durable_capacity(&self) -> usize {
        self.durable.capacity
    }

    /// Cells handed out from the transient arena since the last reset.
    pub fn transient_used(&self) -> usize {
        self.transient.cells.len()
    }

    pub fn transient_capacity(&self) -> usize {
        self.transient.capacity
    }
}
