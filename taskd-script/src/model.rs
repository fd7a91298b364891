//! Task/group descriptors produced by parsing, independent of any concrete
//! script syntax.

use std::collections::HashMap;

/// One task within a group: a named unit of work with declared dependencies.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    /// Task name, unique within its group.
    pub name: String,
    /// Shell command line this task runs when evaluated locally.
    pub run: String,
    /// Names of sibling tasks (within the same group) that must complete first.
    pub depends_on: Vec<String>,
    /// Agent name this task should be delegated to instead of running locally.
    pub delegate_to: Option<String>,
}

/// A named group of tasks, as declared in a script source.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroupDescriptor {
    /// Group name.
    pub name: String,
    /// Tasks declared within this group, in source order.
    pub tasks: Vec<TaskDescriptor>,
}

impl TaskGroupDescriptor {
    /// Looks up a task by name within this group.
    #[must_use]
    pub fn task(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

/// Output of evaluating a single task.
#[derive(Debug, Clone, Default)]
pub struct TaskEvalOutput {
    /// Free-form key/value results the task chose to report.
    pub values: HashMap<String, String>,
    /// Human-readable evaluation log (combined stdout/stderr, in order).
    pub log: String,
    /// Whether the task's underlying command exited successfully.
    pub success: bool,
}
