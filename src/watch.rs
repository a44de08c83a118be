//! The watch engine.
//!
//! Filesystem events are debounced, mapped through the registered
//! [`WatchBinding`]s to the minimal set of dev tasks, and handed to the
//! executor. Only the bound tasks run, never the full graph, so a styles
//! change can never trigger a script rebuild. Task failures in watch mode
//! are logged and watching continues; the only way out is the stop handle
//! or process exit.

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;
use notify::{EventKind, RecursiveMode};
use notify_debouncer_full::new_debouncer;

use crate::config::Paths;
use crate::error::WatchError;
use crate::executor::Executor;
use crate::graph::TaskGraph;
use crate::server::{BroadcastChannel, ReloadMsg};
use crate::task::RunReport;

/// Events arriving within this window for the same binding coalesce into a
/// single trigger.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(250);

/// How often the engine wakes up to check the stop flag while idle.
const STOP_POLL: Duration = Duration::from_millis(100);

/// Connects a file pattern to the tasks a matching change re-runs.
#[derive(Debug, Clone)]
pub struct WatchBinding {
    pattern: Pattern,
    /// Paths matching the main pattern that must not trigger, e.g. files
    /// the triggered tasks themselves write.
    ignore: Vec<Pattern>,
    pub triggers: Vec<&'static str>,
}

impl WatchBinding {
    pub fn new(
        pattern: &str,
        triggers: impl IntoIterator<Item = &'static str>,
    ) -> Result<Self, glob::PatternError> {
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            ignore: Vec::new(),
            triggers: triggers.into_iter().collect(),
        })
    }

    pub fn ignore(mut self, pattern: &str) -> Result<Self, glob::PatternError> {
        self.ignore.push(Pattern::new(pattern)?);
        Ok(self)
    }

    pub fn matches(&self, path: &Utf8Path) -> bool {
        self.pattern.matches_path(path.as_std_path())
            && !self
                .ignore
                .iter()
                .any(|p| p.matches_path(path.as_std_path()))
    }
}

/// Engine lifecycle. `Stopped` is terminal: no events are processed after
/// it is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Debouncing,
    Triggering,
    Stopped,
}

/// Cooperative cancellation for the watch loop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The task names triggered by a set of changed paths, deduplicated,
/// preserving binding declaration order.
pub(crate) fn matched_triggers(
    bindings: &[WatchBinding],
    changed: &[Utf8PathBuf],
) -> Vec<&'static str> {
    let mut triggers = Vec::new();

    for binding in bindings {
        if changed.iter().any(|path| binding.matches(path)) {
            for &task in &binding.triggers {
                if !triggers.contains(&task) {
                    triggers.push(task);
                }
            }
        }
    }

    triggers
}

/// Run the triggered tasks and derive the notifications to broadcast: one
/// message per succeeded task that declares a reload hint.
pub(crate) fn run_triggers(
    graph: &TaskGraph,
    paths: &Paths,
    triggers: &[&str],
) -> (RunReport, Vec<ReloadMsg>) {
    let report = match Executor::new(graph, paths).run(triggers) {
        Ok(report) => report,
        Err(e) => {
            // A binding naming an unregistered task; nothing ran.
            tracing::error!("watch trigger failed: {e}");
            return (RunReport::default(), Vec::new());
        }
    };

    let mut messages = Vec::new();
    for name in report.succeeded() {
        for node in graph.graph.node_weights() {
            if node.name == name
                && let Some(hint) = &node.reload
            {
                messages.push(ReloadMsg {
                    kind: hint.kind,
                    path: hint.path.clone(),
                });
            }
        }
    }

    (report, messages)
}

pub struct WatchEngine<'a> {
    graph: &'a TaskGraph,
    paths: &'a Paths,
    bindings: Vec<WatchBinding>,
    channel: BroadcastChannel,
    stop: StopHandle,
    state: WatchState,
}

impl<'a> WatchEngine<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        paths: &'a Paths,
        bindings: Vec<WatchBinding>,
        channel: BroadcastChannel,
        stop: StopHandle,
    ) -> Self {
        Self {
            graph,
            paths,
            bindings,
            channel,
            stop,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    /// Watch until stopped. Filesystem errors on individual paths are
    /// logged; the loop keeps serving the remaining bindings.
    pub fn run(mut self) -> Result<(), WatchError> {
        let root = env::current_dir()?;

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, tx)?;

        debouncer.watch(
            self.paths.source.root().as_std_path(),
            RecursiveMode::Recursive,
        )?;

        self.state = WatchState::Watching;
        tracing::info!(root = %self.paths.source.root(), "watching for changes");

        loop {
            if self.stop.is_stopped() {
                break;
            }

            let events = match rx.recv_timeout(STOP_POLL) {
                Ok(Ok(events)) => events,
                Ok(Err(errors)) => {
                    for e in errors {
                        tracing::warn!("watcher error: {e}");
                    }
                    continue;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            };

            self.state = WatchState::Debouncing;

            let changed: Vec<Utf8PathBuf> = events
                .iter()
                .filter(|de| {
                    matches!(
                        de.event.kind,
                        EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
                    )
                })
                .flat_map(|de| &de.event.paths)
                .flat_map(|path| {
                    // Bindings may be declared relative to the working
                    // directory or absolute; offer both forms for matching.
                    let relative = path.strip_prefix(&root).unwrap_or(path);
                    [path.as_path(), relative]
                })
                .filter_map(|path| Utf8PathBuf::try_from(path.to_path_buf()).ok())
                .collect();

            let triggers = matched_triggers(&self.bindings, &changed);
            if triggers.is_empty() {
                self.state = WatchState::Watching;
                continue;
            }

            self.state = WatchState::Triggering;
            tracing::info!(?triggers, "change detected");

            let (report, messages) = run_triggers(self.graph, self.paths, &triggers);

            if let Some((task, message)) = report.first_failure() {
                tracing::error!(task, "dev rebuild failed: {message}");
            }

            for msg in messages {
                self.channel.notify(msg)?;
            }

            self.state = WatchState::Watching;
        }

        self.state = WatchState::Stopped;
        tracing::info!("watch engine stopped");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ReloadKind;
    use crate::task::{TaskStatus, TaskUnit};

    fn dev_bindings() -> Vec<WatchBinding> {
        vec![
            WatchBinding::new("src/assets/css/**/*.scss", ["dev-styles"]).unwrap(),
            WatchBinding::new("src/assets/js/**/*.js", ["dev-scripts"])
                .unwrap()
                .ignore("src/assets/js/main.js")
                .unwrap(),
        ]
    }

    #[test]
    fn style_changes_trigger_only_style_tasks() {
        let changed = vec![Utf8PathBuf::from("src/assets/css/base/_reset.scss")];
        assert_eq!(
            matched_triggers(&dev_bindings(), &changed),
            vec!["dev-styles"]
        );
    }

    #[test]
    fn generated_bundle_does_not_retrigger() {
        let changed = vec![Utf8PathBuf::from("src/assets/js/main.js")];
        assert!(matched_triggers(&dev_bindings(), &changed).is_empty());
    }

    #[test]
    fn unrelated_paths_trigger_nothing() {
        let changed = vec![Utf8PathBuf::from("README.md")];
        assert!(matched_triggers(&dev_bindings(), &changed).is_empty());
    }

    #[test]
    fn repeated_matches_coalesce_into_one_trigger() {
        let changed = vec![
            Utf8PathBuf::from("src/assets/css/a.scss"),
            Utf8PathBuf::from("src/assets/css/b.scss"),
        ];
        assert_eq!(
            matched_triggers(&dev_bindings(), &changed),
            vec!["dev-styles"]
        );
    }

    #[test]
    fn styles_change_produces_exactly_one_css_notification() {
        let graph = TaskGraph::builder()
            .add(
                TaskUnit::new("dev-styles", |_| Ok(()))
                    .reload(ReloadKind::Css, "assets/css/main.css"),
            )
            .add(
                TaskUnit::new("dev-scripts", |_| Ok(()))
                    .reload(ReloadKind::Js, "assets/js/main.js"),
            )
            .build()
            .unwrap();
        let paths = Paths::conventional(".");

        let changed = vec![Utf8PathBuf::from("src/assets/css/main.scss")];
        let triggers = matched_triggers(&dev_bindings(), &changed);
        let (report, messages) = run_triggers(&graph, &paths, &triggers);

        assert_eq!(report.status("dev-styles"), Some(&TaskStatus::Success));
        assert_eq!(report.status("dev-scripts"), None);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind, ReloadKind::Css);
        assert!(messages.iter().all(|m| m.kind != ReloadKind::Full));
    }

    #[test]
    fn failed_dev_task_emits_no_notification() {
        let graph = TaskGraph::builder()
            .add(
                TaskUnit::new("dev-styles", |_| Err(anyhow::anyhow!("bad syntax")))
                    .reload(ReloadKind::Css, "assets/css/main.css"),
            )
            .build()
            .unwrap();
        let paths = Paths::conventional(".");

        let (report, messages) = run_triggers(&graph, &paths, &["dev-styles"]);

        assert!(!report.ok());
        assert!(messages.is_empty());
    }
}
