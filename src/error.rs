use std::fmt;

use thiserror::Error;

/// What went wrong while turning text into a parse tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input ended inside a list or right after a quote.
    UnexpectedEndOfInput,
    /// A `)` with no matching `(`.
    UnmatchedParenthesis,
    /// A `.` in a position where no dotted tail can follow.
    MalformedDottedList,
    /// Nesting exceeded the reader's depth limit.
    TooDeeplyNested,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::UnexpectedEndOfInput => write!(f, "unexpected end of input"),
            ParseErrorKind::UnmatchedParenthesis => write!(f, "unmatched ')'"),
            ParseErrorKind::MalformedDottedList => write!(f, "malformed dotted list"),
            ParseErrorKind::TooDeeplyNested => write!(f, "expression nested too deeply"),
        }
    }
}

/// Errors surfaced by the reader, the stores and the evaluator.
///
/// Every failure is reported to the caller; nothing in the library aborts
/// the process. Recovery policy belongs to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LispError {
    #[error("parse error at byte {position}: {kind}")]
    Parse { kind: ParseErrorKind, position: usize },

    /// The transient arena, the durable arena or the symbol buffer is full.
    #[error("{arena} exhausted (capacity {capacity})")]
    ArenaExhausted { arena: &'static str, capacity: usize },

    #[error("environment pool exhausted (all {capacity} frames in use)")]
    EnvironmentPoolExhausted { capacity: usize },

    #[error("frame full: cannot bind '{name}' (capacity {capacity})")]
    FrameFull { name: String, capacity: usize },

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),

    #[error("{callee}: expected {}{expected} argument(s), got {got}", at_least_prefix(.at_least))]
    ArityMismatch {
        callee: String,
        expected: usize,
        at_least: bool,
        got: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow: {0}")]
    IntegerOverflow(String),

    /// An `if` test evaluated to something other than `#t` or `#f`.
    #[error("if: condition must be #t or #f, got {0}")]
    InvalidCondition(String),

    #[error("malformed special form: {0}")]
    InvalidSpecialForm(String),

    /// Evaluation nested deeper than the configured budget.
    #[error("evaluation aborted: nesting exceeded {limit}")]
    EvaluationAborted { limit: usize },

    /// Broken internal contract (stale frame handle, retracting the global frame).
    #[error("internal error: {0}")]
    Internal(String),
}

fn at_least_prefix(at_least: &bool) -> &'static str {
    if *at_least {
        "at least "
    } else {
        ""
    }
}

impl LispError {
    pub fn parse(kind: ParseErrorKind, position: usize) -> Self {
        LispError::Parse { kind, position }
    }

    pub fn arity(callee: impl Into<String>, expected: usize, got: usize) -> Self {
        LispError::ArityMismatch {
            callee: callee.into(),
            expected,
            at_least: false,
            got,
        }
    }

    pub fn arity_at_least(callee: impl Into<String>, expected: usize, got: usize) -> Self {
        LispError::ArityMismatch {
            callee: callee.into(),
            expected,
            at_least: true,
            got,
        }
    }
}

pub type LispResult<T> = Result<T, LispError>;
