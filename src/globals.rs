use tracing::debug;

use crate::atom::AtomTable;
use crate::env::FramePool;
use crate::error::LispResult;
use crate::heap::Heap;
use crate::primitives::Primitive;
use crate::value::Value;

/// Populate the global frame.
/// Pre-installs every primitive under its canonical name, e.g.
///   + = #<procedure +>
///   car = #<procedure car>
pub fn install_globals(
    frames: &mut FramePool,
    heap: &mut Heap,
    atoms: &mut AtomTable,
) -> LispResult<()> {
    let global = frames.global();
    for prim in Primitive::ALL {
        let name = atoms.intern(prim.name())?;
        frames.bind(global, name, Value::Prim(prim), heap, atoms)?;
    }
    debug!(count = Primitive::ALL.len(), "installed primitives");
    Ok(())
}
