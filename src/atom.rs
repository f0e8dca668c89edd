use std::collections::HashMap;

use crate::error::{LispError, LispResult};
use crate::value::AtomId;

/// Interned atom storage.
///
/// Atom text is copied once into a single monotonically growing buffer and
/// never removed. Interning deduplicates, so within one table two atoms with
/// equal text always share an id and the evaluator compares ids directly.
/// `same_text` also compares content.
pub struct AtomTable {
    buffer: String,
    spans: Vec<(u32, u32)>,
    index: HashMap<String, AtomId>,
    capacity: usize,
}

/// Well-known atom ids, pre-interned at startup.
/// These must match the order of interning in AtomTable::new().
pub mod sym {
    use crate::value::AtomId;

    pub const DEFINE: AtomId = AtomId(0);
    pub const SET: AtomId = AtomId(1);
    pub const QUOTE: AtomId = AtomId(2);
    pub const IF: AtomId = AtomId(3);
    pub const LAMBDA: AtomId = AtomId(4);
    pub const TRUE: AtomId = AtomId(5);
    pub const FALSE: AtomId = AtomId(6);
}

const WELL_KNOWN: [&str; 7] = ["define", "set!", "quote", "if", "lambda", "#t", "#f"];

impl AtomTable {
    /// Create a table whose buffer holds at most `capacity` bytes of text.
    /// The well-known atoms are always installed, even past the capacity.
    pub fn new(capacity: usize) -> Self {
        let mut table = AtomTable {
            buffer: String::with_capacity(capacity.min(4096)),
            spans: Vec::new(),
            index: HashMap::new(),
            capacity,
        };
        for name in WELL_KNOWN {
            table.push(name);
        }
        table
    }

    /// Intern `text`, copying it into the buffer if not already present.
    pub fn intern(&mut self, text: &str) -> LispResult<AtomId> {
        if let Some(&id) = self.index.get(text) {
            return Ok(id);
        }
        if self.buffer.len() + text.len() > self.capacity {
            return Err(LispError::ArenaExhausted {
                arena: "symbol buffer",
                capacity: self.capacity,
            });
        }
        Ok(self.push(text))
    }

    fn push(&mut self, text: &str) -> AtomId {
        let id = AtomId(self.spans.len() as u32);
        let start = self.buffer.len() as u32;
        self.buffer.push_str(text);
        self.spans.push((start, text.len() as u32));
        self.index.insert(text.to_string(), id);
        id
    }

    /// The text of an atom.
    pub fn text(&self, id: AtomId) -> &str {
        let (start, len) = self.spans[id.0 as usize];
        &self.buffer[start as usize..(start + len) as usize]
    }

    /// Look up an atom by text without interning.
    pub fn lookup(&self, text: &str) -> Option<AtomId> {
        self.index.get(text).copied()
    }

    /// Content equality.
    pub fn same_text(&self, a: AtomId, b: AtomId) -> bool {
        a == b || self.text(a) == self.text(b)
    }

    /// Total number of interned atoms.
    pub fn count(&self) -> usize {
        self.spans.len()
    }

    /// Bytes of atom text stored so far.
    pub fn bytes_used(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// True for atoms written as a decimal integer with an optional sign.
pub fn is_integer_literal(text: &str) -> bool {
    let digits = text
        .strip_prefix('-')
        .or_else(|| text.strip_prefix('+'))
        .unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
