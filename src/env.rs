use std::collections::HashSet;

use tracing::{debug, trace};

use crate::atom::AtomTable;
use crate::error::{LispError, LispResult};
use crate::heap::Heap;
use crate::value::{AtomId, FrameId, PairId, Value};

/// One `(name, value)` entry in a frame.
#[derive(Clone, Copy, Debug)]
pub struct Binding {
    pub name: AtomId,
    pub value: Value,
}

/// One level of lexical scope.
///
/// Bindings are append-only for the life of the frame: re-defining a name
/// adds a newer binding that shadows the older one.
struct Frame {
    bindings: Vec<Binding>,
    parent: Option<FrameId>,
    refs: u32,
    generation: u32,
    capacity: usize,
}

/// A fixed pool of frames with manual reference counting.
///
/// Slot 0 is the global frame: it is always live, is never reused and does
/// not take part in reference counting. Every other slot is free while its
/// count is zero and is handed out again by `extend`.
pub struct FramePool {
    frames: Vec<Frame>,
}

const GLOBAL: u32 = 0;

impl FramePool {
    pub fn new(pool_size: usize, frame_bindings: usize, global_bindings: usize) -> Self {
        let mut frames = Vec::with_capacity(pool_size.max(1));
        frames.push(Frame {
            bindings: Vec::new(),
            parent: None,
            refs: 1,
            generation: 0,
            capacity: global_bindings,
        });
        for _ in 1..pool_size {
            frames.push(Frame {
                bindings: Vec::new(),
                parent: None,
                refs: 0,
                generation: 0,
                capacity: frame_bindings,
            });
        }
        FramePool { frames }
    }

    /// The permanent global frame.
    pub fn global(&self) -> FrameId {
        FrameId {
            index: GLOBAL,
            generation: 0,
        }
    }

    pub fn is_global(&self, id: FrameId) -> bool {
        id.index == GLOBAL
    }

    /// True while `id` names a frame that has not been reclaimed.
    pub fn is_live(&self, id: FrameId) -> bool {
        self.frame(id).is_ok()
    }

    fn frame(&self, id: FrameId) -> LispResult<&Frame> {
        match self.frames.get(id.index as usize) {
            Some(f) if f.generation == id.generation && f.refs > 0 => Ok(f),
            _ => Err(LispError::Internal(format!("stale frame handle {:?}", id))),
        }
    }

    fn frame_mut(&mut self, id: FrameId) -> LispResult<&mut Frame> {
        match self.frames.get_mut(id.index as usize) {
            Some(f) if f.generation == id.generation && f.refs > 0 => Ok(f),
            _ => Err(LispError::Internal(format!("stale frame handle {:?}", id))),
        }
    }

    /// Hand out a free frame whose parent is `parent`, with a count of one.
    /// The new frame holds a reference to its parent until it is reclaimed.
    pub fn extend(&mut self, parent: FrameId) -> LispResult<FrameId> {
        self.frame(parent)?;
        let capacity = self.frames.len();
        let slot = self
            .frames
            .iter()
            .skip(1)
            .position(|f| f.refs == 0)
            .map(|i| i + 1)
            .ok_or(LispError::EnvironmentPoolExhausted { capacity })?;

        let frame = &mut self.frames[slot];
        frame.bindings.clear();
        frame.parent = Some(parent);
        frame.refs = 1;
        frame.generation = frame.generation.wrapping_add(1);
        let id = FrameId {
            index: slot as u32,
            generation: frame.generation,
        };
        self.keep(parent)?;
        trace!(frame = ?id, parent = ?parent, "extend");
        Ok(id)
    }

    /// Drop one reference. At zero the frame may be reused by `extend`, and
    /// its reference to its parent is dropped in turn.
    pub fn retract(&mut self, id: FrameId) -> LispResult<()> {
        if self.is_global(id) {
            return Err(LispError::Internal(
                "attempt to retract the global frame".into(),
            ));
        }
        let mut current = Some(id);
        while let Some(fid) = current {
            if self.is_global(fid) {
                break;
            }
            let frame = self.frame_mut(fid)?;
            frame.refs = frame
                .refs
                .checked_sub(1)
                .ok_or_else(|| LispError::Internal(format!("retract of released frame {:?}", fid)))?;
            trace!(frame = ?fid, refs = frame.refs, "retract");
            current = if frame.refs == 0 { frame.parent } else { None };
        }
        Ok(())
    }

    /// Add one reference, keeping the frame alive for a closure that
    /// captured it.
    pub fn keep(&mut self, id: FrameId) -> LispResult<()> {
        if self.is_global(id) {
            return Ok(());
        }
        let frame = self.frame_mut(id)?;
        frame.refs += 1;
        trace!(frame = ?id, refs = frame.refs, "keep");
        Ok(())
    }

    /// Current reference count, or None if the handle is stale.
    pub fn refs(&self, id: FrameId) -> Option<u32> {
        self.frame(id).ok().map(|f| f.refs)
    }

    /// Append a binding to `id`. Structured values are copied out of
    /// transient storage first.
    pub fn bind(
        &mut self,
        id: FrameId,
        name: AtomId,
        value: Value,
        heap: &mut Heap,
        atoms: &AtomTable,
    ) -> LispResult<()> {
        {
            let frame = self.frame(id)?;
            if frame.bindings.len() >= frame.capacity {
                return Err(LispError::FrameFull {
                    name: atoms.text(name).to_string(),
                    capacity: frame.capacity,
                });
            }
        }
        let value = heap.deep_copy(value)?;
        self.frame_mut(id)?.bindings.push(Binding { name, value });
        Ok(())
    }

    /// Find the newest binding of `name`, searching outward from `id`.
    pub fn lookup(&self, name: AtomId, id: FrameId, atoms: &AtomTable) -> LispResult<Value> {
        let (frame, slot) = self.find(name, id, atoms)?;
        Ok(self.frames[frame].bindings[slot].value)
    }

    /// Replace the value of the nearest binding of `name` in place.
    pub fn mutate(
        &mut self,
        name: AtomId,
        value: Value,
        id: FrameId,
        heap: &mut Heap,
        atoms: &AtomTable,
    ) -> LispResult<()> {
        let (frame, slot) = self.find(name, id, atoms)?;
        let value = heap.deep_copy(value)?;
        self.frames[frame].bindings[slot].value = value;
        Ok(())
    }

    fn find(&self, name: AtomId, id: FrameId, atoms: &AtomTable) -> LispResult<(usize, usize)> {
        let mut current = Some(id);
        while let Some(fid) = current {
            let frame = self.frame(fid)?;
            if let Some(slot) = frame
                .bindings
                .iter()
                .rposition(|b| b.name == name)
            {
                return Ok((fid.index as usize, slot));
            }
            current = frame.parent;
        }
        Err(LispError::UnboundVariable(atoms.text(name).to_string()))
    }

    /// Reclaim every frame that is not reachable from the global frame or
    /// from `roots`, and return how many were freed.
    ///
    /// Closures hold their frame through `keep`, and nothing releases that
    /// reference when the closure itself is dropped. Tracing from the roots
    /// finds those frames again. Reachable frames keep their counts.
    pub fn collect(&mut self, roots: &[Value], heap: &Heap) -> usize {
        let mut marked = vec![false; self.frames.len()];
        let mut seen: HashSet<PairId> = HashSet::new();
        let mut pending: Vec<Value> = roots.to_vec();
        pending.push(Value::Env(self.global()));

        while let Some(val) = pending.pop() {
            match val {
                Value::Env(id) => {
                    let Ok(frame) = self.frame(id) else { continue };
                    let slot = id.index as usize;
                    if marked[slot] {
                        continue;
                    }
                    marked[slot] = true;
                    pending.extend(frame.bindings.iter().map(|b| b.value));
                    if let Some(parent) = frame.parent {
                        pending.push(Value::Env(parent));
                    }
                }
                Value::Pair(id) => {
                    if seen.insert(id) {
                        pending.push(heap.car(id));
                        pending.push(heap.cdr(id));
                    }
                }
                _ => {}
            }
        }

        let mut freed = 0;
        for (frame, &reachable) in self.frames.iter_mut().zip(&marked).skip(1) {
            if frame.refs > 0 && !reachable {
                frame.refs = 0;
                freed += 1;
            }
        }
        debug!(freed, live = self.live_count(), "collect frames");
        freed
    }

    /// Bindings of one frame in insertion order.
    pub fn bindings(&self, id: FrameId) -> LispResult<&[Binding]> {
        Ok(&self.frame(id)?.bindings)
    }

    /// Frames currently handed out, the global frame included.
    pub fn live_count(&self) -> usize {
        self.frames.iter().filter(|f| f.refs > 0).count()
    }

    /// Total frames in the pool, the global frame included.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }
}
