//! Default [`TaskInterpreter`]: a small declarative TOML document.
//!
//! This is deliberately not a general-purpose language runtime. It exists so
//! the dispatch path has something real to parse and run in tests while the
//! actual scripting language remains an external, replaceable component.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use taskd_dispatch::CommandSpec;

use crate::dag::has_cycle;
use crate::error::{EvalError, ParseError};
use crate::interpreter::TaskInterpreter;
use crate::model::{TaskDescriptor, TaskEvalOutput, TaskGroupDescriptor};

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, rename = "group")]
    groups: Vec<RawGroup>,
}

#[derive(Debug, Deserialize)]
struct RawGroup {
    name: String,
    #[serde(default, rename = "task")]
    tasks: Vec<RawTask>,
}

#[derive(Debug, Deserialize)]
struct RawTask {
    name: String,
    run: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    delegate_to: Option<String>,
}

/// The built-in TOML-document task interpreter.
#[derive(Debug, Default)]
pub struct TomlTaskInterpreter;

impl TomlTaskInterpreter {
    /// Creates a new interpreter instance. Stateless; cheap to construct per use.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn quote_for_shell(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', "'\\''"))
}

#[async_trait]
impl TaskInterpreter for TomlTaskInterpreter {
    fn parse(&self, source: &str) -> Result<Vec<TaskGroupDescriptor>, ParseError> {
        let document: RawDocument =
            toml::from_str(source).map_err(|err| ParseError::Malformed(err.to_string()))?;

        let mut groups = Vec::with_capacity(document.groups.len());
        for raw_group in document.groups {
            let mut seen = HashMap::new();
            let mut tasks = Vec::with_capacity(raw_group.tasks.len());
            for raw_task in raw_group.tasks {
                if seen.insert(raw_task.name.clone(), ()).is_some() {
                    return Err(ParseError::DuplicateTask(
                        raw_task.name,
                        raw_group.name.clone(),
                    ));
                }
                tasks.push(TaskDescriptor {
                    name: raw_task.name,
                    run: raw_task.run,
                    depends_on: raw_task.depends_on,
                    delegate_to: raw_task.delegate_to,
                });
            }

            for task in &tasks {
                for dep in &task.depends_on {
                    if !tasks.iter().any(|candidate| &candidate.name == dep) {
                        return Err(ParseError::UnknownDependency(
                            task.name.clone(),
                            raw_group.name.clone(),
                            dep.clone(),
                        ));
                    }
                }
            }

            let group = TaskGroupDescriptor {
                name: raw_group.name,
                tasks,
            };
            if has_cycle(&group) {
                return Err(ParseError::Cycle(group.name));
            }
            groups.push(group);
        }

        Ok(groups)
    }

    fn strip_delegation(&self, source: &str) -> String {
        source
            .lines()
            .filter(|line| !line.trim_start().starts_with("delegate_to"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn evaluate(
        &self,
        source: &str,
        group: &str,
        task: &str,
        workdir: &Path,
    ) -> Result<TaskEvalOutput, EvalError> {
        let groups = self
            .parse(source)
            .map_err(|err| EvalError::Dispatch(taskd_dispatch::DispatchError::InvalidRequest(
                err.to_string(),
            )))?;

        let descriptor = groups
            .iter()
            .find(|candidate| candidate.name == group)
            .and_then(|g| g.task(task))
            .ok_or_else(|| EvalError::TaskNotFound {
                group: group.to_owned(),
                task: task.to_owned(),
            })?;

        let command = format!("cd {} && {}", quote_for_shell(workdir), descriptor.run);
        let completed = taskd_dispatch::run_to_completion(CommandSpec::new(command)).await?;

        Ok(TaskEvalOutput {
            values: HashMap::new(),
            log: format!("{}{}", completed.stdout, completed.stderr),
            success: completed.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
[[group]]
name = "build"

[[group.task]]
name = "compile"
run = "echo compiling"

[[group.task]]
name = "test"
run = "echo testing"
depends_on = ["compile"]
"#;

    #[test]
    fn parses_groups_and_dependencies() {
        let interpreter = TomlTaskInterpreter::new();
        let groups = interpreter.parse(DOC).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tasks.len(), 2);
        assert_eq!(groups[0].tasks[1].depends_on, vec!["compile".to_string()]);
    }

    #[test]
    fn rejects_cycles() {
        let doc = r#"
[[group]]
name = "g"

[[group.task]]
name = "a"
run = "true"
depends_on = ["b"]

[[group.task]]
name = "b"
run = "true"
depends_on = ["a"]
"#;
        let interpreter = TomlTaskInterpreter::new();
        let err = interpreter.parse(doc).unwrap_err();
        assert!(matches!(err, ParseError::Cycle(_)));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let doc = r#"
[[group]]
name = "g"

[[group.task]]
name = "a"
run = "true"
depends_on = ["ghost"]
"#;
        let interpreter = TomlTaskInterpreter::new();
        let err = interpreter.parse(doc).unwrap_err();
        assert!(matches!(err, ParseError::UnknownDependency(..)));
    }

    #[test]
    fn strip_delegation_removes_only_delegate_lines() {
        let doc = "name = \"a\"\ndelegate_to = \"worker\"\nrun = \"true\"";
        let interpreter = TomlTaskInterpreter::new();
        let stripped = interpreter.strip_delegation(doc);
        assert!(!stripped.contains("delegate_to"));
        assert!(stripped.contains("run = \"true\""));
    }

    #[tokio::test]
    async fn evaluates_named_task_and_captures_output() {
        let interpreter = TomlTaskInterpreter::new();
        let dir = std::env::temp_dir();
        let output = interpreter
            .evaluate(DOC, "build", "compile", &dir)
            .await
            .unwrap();
        assert!(output.success);
        assert!(output.log.contains("compiling"));
    }

    #[tokio::test]
    async fn evaluate_unknown_task_is_not_found() {
        let interpreter = TomlTaskInterpreter::new();
        let dir = std::env::temp_dir();
        let err = interpreter
            .evaluate(DOC, "build", "ghost", &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::TaskNotFound { .. }));
    }
}
