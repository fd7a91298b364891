//! Dependency-DAG cycle detection over a group's declared `depends_on` edges.

use std::collections::HashMap;

use crate::model::TaskGroupDescriptor;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Returns `true` iff the group's `depends_on` edges form a cycle.
///
/// Walks a plain depth-first search over an adjacency map built from task
/// names, marking each node `Visiting` on entry and `Done` on exit; revisiting
/// a `Visiting` node means a back-edge, i.e. a cycle.
#[must_use]
pub fn has_cycle(group: &TaskGroupDescriptor) -> bool {
    let adjacency: HashMap<&str, &[String]> = group
        .tasks
        .iter()
        .map(|task| (task.name.as_str(), task.depends_on.as_slice()))
        .collect();

    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for task in &group.tasks {
        if !marks.contains_key(task.name.as_str())
            && visit(task.name.as_str(), &adjacency, &mut marks)
        {
            return true;
        }
    }
    false
}

fn visit<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, &'a [String]>,
    marks: &mut HashMap<&'a str, Mark>,
) -> bool {
    marks.insert(node, Mark::Visiting);

    if let Some(deps) = adjacency.get(node) {
        for dep in *deps {
            match marks.get(dep.as_str()) {
                Some(Mark::Visiting) => return true,
                Some(Mark::Done) => continue,
                None => {
                    if visit(dep.as_str(), adjacency, marks) {
                        return true;
                    }
                }
            }
        }
    }

    marks.insert(node, Mark::Done);
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskDescriptor;

    fn task(name: &str, depends_on: &[&str]) -> TaskDescriptor {
        TaskDescriptor {
            name: name.into(),
            run: "true".into(),
            depends_on: depends_on.iter().map(|s| (*s).to_string()).collect(),
            delegate_to: None,
        }
    }

    #[test]
    fn acyclic_chain_has_no_cycle() {
        let group = TaskGroupDescriptor {
            name: "g".into(),
            tasks: vec![task("a", &[]), task("b", &["a"]), task("c", &["b"])],
        };
        assert!(!has_cycle(&group));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let group = TaskGroupDescriptor {
            name: "g".into(),
            tasks: vec![task("a", &["a"])],
        };
        assert!(has_cycle(&group));
    }

    #[test]
    fn mutual_dependency_is_a_cycle() {
        let group = TaskGroupDescriptor {
            name: "g".into(),
            tasks: vec![task("a", &["b"]), task("b", &["a"])],
        };
        assert!(has_cycle(&group));
    }

    #[test]
    fn diamond_shape_is_not_a_cycle() {
        let group = TaskGroupDescriptor {
            name: "g".into(),
            tasks: vec![
                task("a", &[]),
                task("b", &["a"]),
                task("c", &["a"]),
                task("d", &["b", "c"]),
            ],
        };
        assert!(!has_cycle(&group));
    }
}
