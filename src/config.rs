/// Capacities and budgets for one interpreter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Pairs the reader may allocate for a single form.
    pub transient_cells: usize,
    /// Pairs evaluation may allocate over the whole run.
    pub durable_cells: usize,
    /// Bytes of interned atom text.
    pub symbol_bytes: usize,
    /// Frames in the environment pool, the global frame included.
    pub frame_pool: usize,
    /// Bindings per call frame.
    pub frame_bindings: usize,
    /// Bindings in the global frame, primitives included.
    pub global_bindings: usize,
    /// Nested evaluations allowed before a form is aborted.
    pub max_depth: usize,
    /// Nested lists the reader accepts.
    pub max_read_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            transient_cells: 1 << 16,
            durable_cells: 1 << 20,
            symbol_bytes: 1 << 20,
            frame_pool: 128,
            frame_bindings: 32,
            global_bindings: 1024,
            max_depth: 1000,
            max_read_depth: 256,
        }
    }
}

impl Limits {
    /// Small fixed sizes: 256 parse cells, 1280 list cells, 2 KiB of atom
    /// text, 128 frames of 32 bindings, 32 global bindings.
    pub fn classic() -> Self {
        Limits {
            transient_cells: 256,
            durable_cells: 1280,
            symbol_bytes: 2048,
            frame_pool: 128,
            frame_bindings: 32,
            global_bindings: 32,
            ..Limits::default()
        }
    }
}
