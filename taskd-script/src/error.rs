//! Errors surfaced at the task script boundary.

use thiserror::Error;

/// Errors that can occur while parsing a task script into descriptors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The source could not be parsed as the expected declarative format.
    #[error("malformed task script: {0}")]
    Malformed(String),

    /// Two tasks in the same group declared the same name.
    #[error("duplicate task name `{0}` in group `{1}`")]
    DuplicateTask(String, String),

    /// A `depends_on` entry named a task that does not exist in its group.
    #[error("task `{0}` in group `{1}` depends on unknown task `{2}`")]
    UnknownDependency(String, String, String),

    /// The dependency graph within a group contains a cycle.
    #[error("dependency cycle detected in group `{0}`")]
    Cycle(String),
}

/// Errors that can occur while evaluating a single parsed task.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The requested group or task name was not found among the parsed descriptors.
    #[error("task `{task}` not found in group `{group}`")]
    TaskNotFound {
        /// The group that was searched.
        group: String,
        /// The task name that was not found.
        task: String,
    },

    /// The task's underlying command failed to execute.
    #[error("task execution failed: {0}")]
    Dispatch(#[from] taskd_dispatch::DispatchError),
}
