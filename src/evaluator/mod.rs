//! Host evaluation capability
//!
//! The server never evaluates source text itself. Every line a client sends is
//! handed to an [`Evaluator`] together with the session's current bindings, and
//! the evaluator returns the resulting value plus the updated bindings.
//!
//! ```text
//! (Bindings, "x = 1 + 1")  ──► Evaluator ──►  Ok(Evaluation { value: 2, bindings: {x: 2} })
//!                                        └──►  Err(EvalError { kind: SyntaxError, .. })
//! ```
//!
//! Evaluators are shared between all sessions of a server, so they must be
//! `Send + Sync`. Per-session state lives only in the [`Bindings`] that are
//! threaded through each call.

pub mod value;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

pub use value::Value;

/// Named values persisted across evaluations within one session
pub type Bindings = HashMap<String, Value>;

/// Result of a successful evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Value of the evaluated source (last statement)
    pub value: Value,
    /// Bindings after evaluation, replacing the session's previous bindings
    pub bindings: Bindings,
}

/// Category of an evaluation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalErrorKind {
    SyntaxError,
    ReferenceError,
    TypeError,
    RangeError,
    Timeout,
    Internal,
}

impl EvalErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "SyntaxError",
            Self::ReferenceError => "ReferenceError",
            Self::TypeError => "TypeError",
            Self::RangeError => "RangeError",
            Self::Timeout => "Timeout",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one submitted expression
///
/// Contained to the session that submitted it: the server reports it to that
/// client as an error-tagged line and keeps the connection open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::SyntaxError, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::ReferenceError, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::TypeError, message)
    }

    pub fn range(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::RangeError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Timeout, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Internal, message)
    }
}

/// Capability that evaluates source text against a set of bindings
///
/// Implementations are called from a blocking worker thread, one call at a
/// time per session. A call that fails must not be assumed to have applied
/// any of its binding changes.
pub trait Evaluator: Send + Sync + 'static {
    fn evaluate(&self, bindings: Bindings, source: &str) -> Result<Evaluation, EvalError>;
}

impl<F> Evaluator for F
where
    F: Fn(Bindings, &str) -> Result<Evaluation, EvalError> + Send + Sync + 'static,
{
    fn evaluate(&self, bindings: Bindings, source: &str) -> Result<Evaluation, EvalError> {
        self(bindings, source)
    }
}
