//! Task Analyzer
//!
//! Turns free-text task descriptions into structured tasks and a naive
//! dependency graph. Dependencies are inferred only from explicit artifact
//! mentions; false negatives are expected.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::analysis::graph::DependencyGraph;
use crate::analysis::text;
use crate::models::{Task, TaskId};

/// Verbs recognised as the action of a task
const ACTION_VERBS: &[&str] = &[
    "add", "create", "implement", "build", "write", "introduce", "generate", "define", "scaffold",
    "extract", "fix", "update", "refactor", "remove", "delete", "rename", "move", "migrate",
    "improve", "optimize", "optimise", "document", "test", "configure", "upgrade", "replace",
    "integrate", "wire", "split", "merge", "port", "convert", "validate", "support", "enable",
    "disable", "expose", "handle", "bump", "deprecate", "rewrite", "simplify", "clean", "set",
    "hook", "polish", "change", "adjust", "drop", "cache", "secure", "harden", "log", "translate",
    "localize", "style", "redesign", "investigate", "debug", "patch", "revert", "install",
];

/// Two-word actions, matched before single verbs
const PHRASAL_VERBS: &[&str] = &[
    "set up", "clean up", "wire up", "hook up", "break up", "split up", "tear down", "roll back",
    "break out", "pull out", "factor out", "spin up",
];

/// Actions whose task is considered to produce the artifacts it names
const CREATIONAL_VERBS: &[&str] = &[
    "add", "create", "implement", "build", "write", "introduce", "generate", "define", "scaffold",
    "extract", "set up",
];

/// Summary statistics of a batch of tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskAnalysis {
    pub total_tasks: usize,
    /// Tasks with neither dependencies nor dependents
    pub parallelizable_tasks: usize,
    /// Longest dependency chain in wave-equivalents
    pub critical_path_length: usize,
    pub estimated_speedup: f64,
    /// Dependency layers in execution order
    pub levels: Vec<Vec<TaskId>>,
}

/// Graph plus statistics produced by [`TaskAnalyzer::analyze`]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub graph: DependencyGraph,
    pub analysis: TaskAnalysis,
}

/// Stateless analyzer over task descriptions
#[derive(Debug, Default, Clone)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Parse descriptions into tasks (IDs are 1-based in input order) and infer dependencies.
    /// Never rejects input: an unrecognised description yields an independent task with no action.
    pub fn parse_task_descriptions<S: AsRef<str>>(&self, descriptions: &[S]) -> Vec<Task> {
        let mut tasks: Vec<Task> = descriptions
            .iter()
            .enumerate()
            .map(|(index, description)| {
                let description = description.as_ref().trim();
                let mut task = Task::new(index + 1, description);
                task.action = extract_action(description);
                task
            })
            .collect();

        let edges = infer_dependencies(&tasks);
        for task in &mut tasks {
            if let Some(deps) = edges.get(&task.id) {
                task.depends_on = deps.clone();
            }
        }

        let with_deps = tasks.iter().filter(|t| !t.depends_on.is_empty()).count();
        log::debug!(
            "[TaskAnalyzer] Parsed {} tasks, {} with inferred dependencies",
            tasks.len(),
            with_deps
        );

        tasks
    }

    /// Build the dependency graph and compute batch statistics
    pub fn analyze(&self, tasks: &[Task]) -> AnalysisOutcome {
        let mut graph = DependencyGraph::new();
        for task in tasks {
            graph.add_node(task.id);
        }

        for task in tasks {
            for dep in &task.depends_on {
                if let Err(e) = graph.add_dependency(task.id, *dep) {
                    log::warn!("[TaskAnalyzer] Ignoring dependency: {}", e);
                }
            }
        }

        let total_tasks = tasks.len();
        let parallelizable_tasks = tasks
            .iter()
            .filter(|t| graph.is_independent(t.id))
            .count();
        let critical_path_length = graph.critical_path_length();
        let estimated_speedup = if critical_path_length == 0 {
            1.0
        } else {
            total_tasks as f64 / critical_path_length as f64
        };

        let analysis = TaskAnalysis {
            total_tasks,
            parallelizable_tasks,
            critical_path_length,
            estimated_speedup,
            levels: graph.levels(),
        };

        log::info!(
            "[TaskAnalyzer] {} tasks, {} independent, critical path {}, estimated speedup {:.2}x",
            analysis.total_tasks,
            analysis.parallelizable_tasks,
            analysis.critical_path_length,
            analysis.estimated_speedup
        );

        AnalysisOutcome { graph, analysis }
    }
}

/// Leading verb or phrasal verb, lowercased, if it is a known action
fn extract_action(description: &str) -> Option<String> {
    let mut words = description
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase());

    let first = words.next().filter(|w| !w.is_empty())?;
    if let Some(second) = words.next() {
        let phrase = format!("{} {}", first, second);
        if PHRASAL_VERBS.contains(&phrase.as_str()) {
            return Some(phrase);
        }
    }

    ACTION_VERBS.contains(&first.as_str()).then_some(first)
}

/// B depends on A when A is creational and B mentions one of the artifacts A names.
/// An artifact named by two creational tasks belongs to the earlier one, and an
/// edge that would close a cycle is dropped.
fn infer_dependencies(tasks: &[Task]) -> BTreeMap<TaskId, BTreeSet<TaskId>> {
    let produced: Vec<(TaskId, BTreeSet<String>)> = tasks
        .iter()
        .filter(|t| {
            t.action
                .as_deref()
                .is_some_and(|a| CREATIONAL_VERBS.contains(&a))
        })
        .map(|t| (t.id, text::extract_artifacts(&t.description)))
        .filter(|(_, artifacts)| !artifacts.is_empty())
        .collect();

    let mut graph = DependencyGraph::new();
    let mut edges: BTreeMap<TaskId, BTreeSet<TaskId>> = BTreeMap::new();

    for consumer in tasks {
        for (producer, artifacts) in &produced {
            if *producer == consumer.id {
                continue;
            }

            let own = produced
                .iter()
                .find(|(id, _)| *id == consumer.id)
                .map(|(_, a)| a);

            let referenced = artifacts.iter().find(|artifact| {
                let claimed_by_consumer = own.is_some_and(|own| own.contains(*artifact));
                (!claimed_by_consumer || *producer < consumer.id)
                    && text::mentions(&consumer.description, artifact)
            });

            if let Some(artifact) = referenced {
                match graph.add_dependency(consumer.id, *producer) {
                    Ok(()) => {
                        log::debug!(
                            "[TaskAnalyzer] {} depends on {} via '{}'",
                            consumer.id,
                            producer,
                            artifact
                        );
                        edges.entry(consumer.id).or_default().insert(*producer);
                    }
                    Err(e) => log::debug!("[TaskAnalyzer] Dropped edge: {}", e),
                }
            }
        }
    }

    edges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_and_actions() {
        let analyzer = TaskAnalyzer::new();
        let tasks = analyzer.parse_task_descriptions(&[
            "Add login form",
            "set up CI pipeline",
            "???",
            "The footer looks off",
        ]);

        assert_eq!(tasks.len(), 4);
        assert_eq!(tasks[0].id, TaskId(1));
        assert_eq!(tasks[3].id, TaskId(4));
        assert_eq!(tasks[0].action.as_deref(), Some("add"));
        assert_eq!(tasks[1].action.as_deref(), Some("set up"));
        assert_eq!(tasks[2].action, None);
        assert_eq!(tasks[3].action, None);
        assert!(tasks.iter().all(|t| t.depends_on.is_empty()));
    }

    #[test]
    fn test_infers_dependency_on_produced_artifact() {
        let analyzer = TaskAnalyzer::new();
        let tasks = analyzer.parse_task_descriptions(&[
            "Create the billing service",
            "Add invoice export using the billing service",
            "Fix typo in README.md",
        ]);

        assert_eq!(
            tasks[1].depends_on,
            [TaskId(1)].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(tasks[0].depends_on.is_empty());
        assert!(tasks[2].depends_on.is_empty());

        let outcome = analyzer.analyze(&tasks);
        assert_eq!(outcome.analysis.total_tasks, 3);
        assert_eq!(outcome.analysis.parallelizable_tasks, 1);
        assert_eq!(outcome.analysis.critical_path_length, 2);
        assert!((outcome.analysis.estimated_speedup - 1.5).abs() < f64::EPSILON);
        assert_eq!(
            outcome.analysis.levels,
            vec![vec![TaskId(1), TaskId(3)], vec![TaskId(2)]]
        );
    }

    #[test]
    fn test_shared_artifacts_point_to_earlier_producer() {
        let analyzer = TaskAnalyzer::new();
        let tasks = analyzer.parse_task_descriptions(&[
            "Implement `TokenCache` for `SessionStore`",
            "Implement `SessionStore` backed by `TokenCache`",
        ]);

        assert!(tasks[0].depends_on.is_empty());
        assert_eq!(
            tasks[1].depends_on,
            [TaskId(1)].into_iter().collect::<BTreeSet<_>>()
        );

        let tasks = analyzer.parse_task_descriptions(&[
            "Implement `TokenCache`",
            "Implement `SessionStore` on top of `TokenCache`",
            "Update `TokenCache` to evict via `SessionStore`",
        ]);
        assert_eq!(
            tasks[1].depends_on,
            [TaskId(1)].into_iter().collect::<BTreeSet<_>>()
        );
        let outcome = analyzer.analyze(&tasks);
        assert_eq!(outcome.graph.levels().iter().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_empty_input() {
        let analyzer = TaskAnalyzer::new();
        let tasks = analyzer.parse_task_descriptions::<&str>(&[]);
        let outcome = analyzer.analyze(&tasks);

        assert_eq!(outcome.analysis.total_tasks, 0);
        assert_eq!(outcome.analysis.critical_path_length, 0);
        assert!((outcome.analysis.estimated_speedup - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_independent() {
        let analyzer = TaskAnalyzer::new();
        let tasks = analyzer.parse_task_descriptions(&["Fix a.ts", "Fix b.ts", "Fix c.ts"]);
        let outcome = analyzer.analyze(&tasks);

        assert_eq!(outcome.analysis.parallelizable_tasks, 3);
        assert_eq!(outcome.analysis.critical_path_length, 1);
        assert!((outcome.analysis.estimated_speedup - 3.0).abs() < f64::EPSILON);
    }
}
