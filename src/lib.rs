//! replserver: an embeddable REPL over TCP
//!
//! A host application creates a [`ReplServer`], starts it on a port, and
//! every TCP client that connects gets its own evaluation session with
//! private variable bindings. Requests are single lines; each response is a
//! single line followed by a fresh prompt.
//!
//! Evaluation is pluggable through the [`Evaluator`] trait. The bundled
//! [`ScriptEvaluator`] understands a small JavaScript-flavoured expression
//! language.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use replserver::{ReplServer, ScriptEvaluator};
//!
//! # async fn demo() -> replserver::Result<()> {
//! let server = ReplServer::with_port(5051, Arc::new(ScriptEvaluator::new()))?;
//! server.start().await?;
//! assert!(server.running());
//! // ... `nc 127.0.0.1 5051`, type `1+1`, get `2` ...
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod repl_server;
pub mod script;

// Re-export commonly used types
pub use cli::Cli;
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ReplError, Result};
pub use evaluator::{Bindings, EvalError, EvalErrorKind, Evaluation, Evaluator, Value};
pub use repl_server::{Phase, ReplServer, ServerEvent, ServerStatus, SessionId};
pub use script::ScriptEvaluator;
