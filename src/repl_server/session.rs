//! Session evaluator
//!
//! Binds one connection to its own evaluation context. The session owns its
//! bindings outright; the only way they change is through an evaluation of a
//! line received on that session's connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::protocol::{error_line, EvalRequest, EvalResponse};
use crate::evaluator::{Bindings, EvalError, Evaluator, Value};

/// Identifier assigned to a session when its connection is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Evaluation state of one connected client
pub struct Session {
    id: SessionId,
    bindings: Bindings,
    evaluator: Arc<dyn Evaluator>,
    eval_timeout: Duration,
}

impl Session {
    pub fn new(id: SessionId, evaluator: Arc<dyn Evaluator>, eval_timeout: Duration) -> Self {
        Self {
            id,
            bindings: Bindings::new(),
            evaluator,
            eval_timeout,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Evaluate `source` against this session's bindings
    ///
    /// The evaluator runs on the blocking pool with a copy of the bindings.
    /// Bindings are replaced only when evaluation succeeds in time; on error,
    /// timeout or panic the session keeps its previous bindings.
    pub async fn evaluate(&mut self, source: &str) -> Result<Value, EvalError> {
        let evaluator = Arc::clone(&self.evaluator);
        let bindings = self.bindings.clone();
        let source = source.to_string();
        let task = tokio::task::spawn_blocking(move || evaluator.evaluate(bindings, &source));

        let evaluation = match tokio::time::timeout(self.eval_timeout, task).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => {
                tracing::error!("Evaluator failed in session {}: {}", self.id, join_err);
                return Err(EvalError::internal("evaluator panicked"));
            }
            Err(_) => {
                // The blocking call keeps running; its result is discarded
                tracing::warn!(
                    "Evaluation in session {} exceeded {:?}",
                    self.id,
                    self.eval_timeout
                );
                return Err(EvalError::timeout(format!(
                    "evaluation exceeded {} seconds",
                    self.eval_timeout.as_secs_f64()
                )));
            }
        };

        self.bindings = evaluation.bindings;
        Ok(evaluation.value)
    }

    /// Evaluate a source line and render the single response line
    pub async fn eval_line(&mut self, source: &str) -> String {
        match self.evaluate(source).await {
            Ok(value) => value.to_single_line(),
            Err(err) => {
                tracing::debug!("Session {} evaluation failed: {}", self.id, err);
                error_line(&err)
            }
        }
    }

    /// Evaluate the source of a `/message` request
    pub async fn process_message(&mut self, request: &EvalRequest) -> EvalResponse {
        let outcome = self.evaluate(&request.src).await;
        EvalResponse::from_outcome(request, outcome)
    }
}
