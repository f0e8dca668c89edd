//! A small Lisp with arena-backed pairs and a pooled environment manager.
//!
//! Values are handles into three stores owned by a [`Machine`]: a transient
//! arena the reader builds parse trees in, a durable arena for everything
//! evaluation keeps, and an append-only symbol buffer. Scopes come from a
//! fixed pool of frames with manual reference counting.
//!
//! ```no_run
//! use lisp::{Limits, Machine};
//!
//! let mut machine = Machine::new(Limits::default())?;
//! assert_eq!(machine.eval_str("(car (list 1 2))")?, "1");
//! # Ok::<(), lisp::LispError>(())
//! ```

pub mod atom;
pub mod config;
pub mod env;
pub mod error;
pub mod eval;
pub mod globals;
pub mod heap;
pub mod primitives;
pub mod printer;
pub mod reader;
pub mod value;

pub use config::Limits;
pub use error::{LispError, LispResult, ParseErrorKind};
pub use eval::{Machine, Stats};
pub use value::Value;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
