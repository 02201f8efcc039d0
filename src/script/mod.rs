//! Built-in script evaluator
//!
//! A small expression language in the style of JavaScript, used when the
//! embedding application does not provide its own [`Evaluator`]. It is what
//! the `replserver` binary evaluates, and what the tests drive sessions with.
//!
//! ```text
//! REPL> x = 5
//! 5
//! REPL> 'x is ' + (x > 3 ? 'big' : 'small')
//! x is big
//! REPL> (1 + 2
//! ERROR: SyntaxError: Unexpected end of input
//! ```
//!
//! Evaluation works on a copy of the session bindings, so a statement list
//! that fails halfway leaves the session exactly as it was.

pub mod interp;
pub mod lexer;
pub mod parser;

use crate::evaluator::{Bindings, EvalError, Evaluation, Evaluator};

pub use interp::Interpreter;

/// [`Evaluator`] backed by the built-in script language
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptEvaluator;

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for ScriptEvaluator {
    fn evaluate(&self, mut bindings: Bindings, source: &str) -> Result<Evaluation, EvalError> {
        let tokens = lexer::tokenize(source)?;
        let stmts = parser::parse(&tokens)?;
        let value = Interpreter::new(&mut bindings).run(&stmts)?;
        Ok(Evaluation { value, bindings })
    }
}
