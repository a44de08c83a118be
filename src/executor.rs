//! Parallel execution of the task graph.
//!
//! Tasks are distributed over the rayon thread pool and results flow back to
//! the scheduler loop over a crossbeam channel. A task is spawned the moment
//! its last dependency succeeds, so independent branches of the graph run
//! concurrently while dependency edges serialize every write to a shared
//! destination path.
//!
//! Failure semantics: a failed task marks all of its transitive dependents
//! as skipped without ever starting them; tasks with no dependency relation
//! to the failure keep running to completion, and tasks already in flight
//! always finish. There is no cancellation and no retry.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crossbeam_channel::unbounded;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use petgraph::Direction;
use petgraph::graph::NodeIndex;

use crate::config::Paths;
use crate::error::{BuildError, GraphError};
use crate::graph::TaskGraph;
use crate::task::{RunReport, TaskContext, TaskResult, TaskStatus};

pub struct Executor<'a> {
    graph: &'a TaskGraph,
    paths: &'a Paths,
}

impl<'a> Executor<'a> {
    pub fn new(graph: &'a TaskGraph, paths: &'a Paths) -> Self {
        Self { graph, paths }
    }

    /// Run the named targets and their transitive dependencies.
    ///
    /// Returns `Err` only for graph-level problems (unknown target); task
    /// failures are reported through the [`RunReport`].
    pub fn run(&self, targets: &[&str]) -> Result<RunReport, GraphError> {
        let closure = self.graph.closure(targets)?;
        Ok(self.run_nodes(&closure))
    }

    fn run_nodes(&self, nodes: &HashSet<NodeIndex>) -> RunReport {
        let mut report = RunReport::default();
        let total = nodes.len();

        if total == 0 {
            return report;
        }

        // Dependents and dependency counts, both restricted to the nodes we
        // intend to run.
        let mut dependents: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        for &node in nodes {
            for dep in self
                .graph
                .graph
                .neighbors_directed(node, Direction::Incoming)
            {
                if nodes.contains(&dep) {
                    dependents.entry(dep).or_default().push(node);
                }
            }
        }

        let mut pending: HashMap<NodeIndex, usize> = nodes
            .iter()
            .map(|&node| {
                let count = self
                    .graph
                    .graph
                    .neighbors_directed(node, Direction::Incoming)
                    .filter(|dep| nodes.contains(dep))
                    .count();
                (node, count)
            })
            .collect();

        let mp = MultiProgress::new();
        let main_pb = mp.add(ProgressBar::new(total as u64));
        main_pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .expect("Error setting progress bar template")
                .progress_chars("#>-"),
        );

        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .expect("Error setting spinner template");

        let (result_sender, result_receiver) = unbounded::<(NodeIndex, TaskResult)>();

        let graph = self.graph;
        let paths = self.paths;

        rayon::scope(|s| {
            let spawn_task = |index: NodeIndex| {
                let task = graph.node(index).clone();
                let sender = result_sender.clone();
                let mp = mp.clone();
                let style = spinner_style.clone();

                s.spawn(move |_| {
                    let pb = mp.add(ProgressBar::new_spinner());
                    pb.set_style(style);
                    pb.set_message(task.name);
                    pb.enable_steady_tick(Duration::from_millis(100));

                    tracing::debug!(task = task.name, "starting");
                    let result = task.run(&TaskContext { paths });

                    pb.finish_and_clear();
                    sender
                        .send((index, result))
                        .expect("scheduler loop outlives workers");
                });
            };

            // Seed the initially-ready tasks in declaration order.
            let mut seeds: Vec<_> = nodes
                .iter()
                .copied()
                .filter(|node| pending[node] == 0)
                .collect();
            seeds.sort();
            for node in seeds {
                spawn_task(node);
            }

            let mut skipped: HashSet<NodeIndex> = HashSet::new();
            let mut settled = 0;

            while settled < total {
                let (index, result) = result_receiver
                    .recv()
                    .expect("at least one task is always in flight");
                settled += 1;
                main_pb.inc(1);

                let name = graph.node(index).name;

                match result {
                    Ok(()) => {
                        tracing::debug!(task = name, "finished");
                        report.record(name, TaskStatus::Success);

                        if let Some(down) = dependents.get(&index) {
                            for &node in down {
                                let count = pending
                                    .get_mut(&node)
                                    .expect("dependent is part of this run");
                                *count -= 1;
                                if *count == 0 && !skipped.contains(&node) {
                                    spawn_task(node);
                                }
                            }
                        }
                    }
                    Err(err) => {
                        tracing::error!(task = name, "failed: {err:#}");
                        report.record(name, TaskStatus::Failed(format!("{err:#}")));

                        // Every transitive dependent can no longer run; none
                        // of them has started, since each still waits on the
                        // task that just failed.
                        for node in graph.dependents(index) {
                            if node == index || !nodes.contains(&node) {
                                continue;
                            }
                            if skipped.insert(node) {
                                report.record(graph.node(node).name, TaskStatus::Skipped);
                                settled += 1;
                                main_pb.inc(1);
                            }
                        }
                    }
                }
            }
        });

        main_pb.finish_and_clear();
        report
    }
}

/// Collapse a report into the build result surfaced to the invoker.
pub fn into_result(report: &RunReport) -> Result<(), BuildError> {
    match report.first_failure() {
        None => Ok(()),
        Some((first, message)) => Err(BuildError::Report {
            failed: report.failed_count(),
            total: report.len(),
            first: first.to_string(),
            message: message.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::task::TaskUnit;

    fn test_paths() -> Paths {
        Paths::conventional(".")
    }

    fn tracked(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> TaskUnit {
        let log = log.clone();
        TaskUnit::new(name, move |_| {
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    fn failing(name: &'static str) -> TaskUnit {
        TaskUnit::new(name, |_| Err(anyhow::anyhow!("boom")))
    }

    #[test]
    fn runs_dependencies_before_dependents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = TaskGraph::builder()
            .add(tracked("a", &log))
            .add(tracked("b", &log).after(["a"]))
            .add(tracked("c", &log).after(["b"]))
            .build()
            .unwrap();

        let paths = test_paths();
        let report = Executor::new(&graph, &paths).run(&["c"]).unwrap();

        assert!(report.ok());
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn failure_skips_dependents_but_not_independents() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = TaskGraph::builder()
            .add(failing("broken"))
            .add(tracked("child", &log).after(["broken"]))
            .add(tracked("grandchild", &log).after(["child"]))
            .add(tracked("island", &log))
            .build()
            .unwrap();

        let paths = test_paths();
        let report = Executor::new(&graph, &paths)
            .run(&["grandchild", "island"])
            .unwrap();

        assert!(!report.ok());
        assert!(matches!(
            report.status("broken"),
            Some(TaskStatus::Failed(_))
        ));
        assert_eq!(report.status("child"), Some(&TaskStatus::Skipped));
        assert_eq!(report.status("grandchild"), Some(&TaskStatus::Skipped));
        assert_eq!(report.status("island"), Some(&TaskStatus::Success));
        assert_eq!(*log.lock().unwrap(), vec!["island"]);
    }

    #[test]
    fn run_covers_only_the_requested_subgraph() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = TaskGraph::builder()
            .add(tracked("styles", &log))
            .add(tracked("scripts", &log))
            .build()
            .unwrap();

        let paths = test_paths();
        let report = Executor::new(&graph, &paths).run(&["styles"]).unwrap();

        assert!(report.ok());
        assert_eq!(report.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["styles"]);
    }

    #[test]
    fn unknown_target_runs_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let graph = TaskGraph::builder().add(tracked("a", &log)).build().unwrap();

        let paths = test_paths();
        let result = Executor::new(&graph, &paths).run(&["ghost"]);

        assert!(matches!(result, Err(GraphError::UnknownTarget(_))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn report_collapses_into_build_error() {
        let graph = TaskGraph::builder()
            .add(failing("broken"))
            .add(TaskUnit::new("fine", |_| Ok(())))
            .build()
            .unwrap();

        let paths = test_paths();
        let report = Executor::new(&graph, &paths)
            .run(&["broken", "fine"])
            .unwrap();

        let err = into_result(&report).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("broken"), "{message}");
        assert!(message.contains("boom"), "{message}");
    }
}
