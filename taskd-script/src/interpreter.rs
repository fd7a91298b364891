//! The `TaskInterpreter` boundary trait.
//!
//! This is the entire surface the dispatch path uses to talk to a
//! scripting-language evaluator. Keeping it this narrow is what lets the
//! actual task language stay an external, swappable concern: everything on
//! the agent side depends only on these three operations, never on a
//! specific language's AST or runtime.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{EvalError, ParseError};
use crate::model::{TaskEvalOutput, TaskGroupDescriptor};

/// Parses and evaluates task scripts.
#[async_trait]
pub trait TaskInterpreter: Send + Sync {
    /// Enumerates groups, tasks, and per-task dependency names without
    /// executing anything.
    fn parse(&self, source: &str) -> Result<Vec<TaskGroupDescriptor>, ParseError>;

    /// Returns `source` with every delegation directive textually removed,
    /// so the remainder can be evaluated locally without re-delegating.
    fn strip_delegation(&self, source: &str) -> String;

    /// Runs exactly the named task and returns its output.
    async fn evaluate(
        &self,
        source: &str,
        group: &str,
        task: &str,
        workdir: &Path,
    ) -> Result<TaskEvalOutput, EvalError>;
}
