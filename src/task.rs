use std::fmt::Debug;
use std::sync::Arc;

use camino::Utf8PathBuf;

use crate::config::Paths;
use crate::server::ReloadKind;

/// Declares which asset a successful run of a task updates, so watch mode
/// can tell connected clients what changed and how to apply it.
#[derive(Debug, Clone)]
pub struct ReloadHint {
    pub kind: ReloadKind,
    /// Path of the updated asset, relative to the served root.
    pub path: Utf8PathBuf,
}

/// Result from a single executed task.
pub type TaskResult = anyhow::Result<()>;

/// Everything a task is allowed to see while running. Passed by reference so
/// tasks cannot hold onto state between runs.
pub struct TaskContext<'a> {
    pub paths: &'a Paths,
}

type TaskFnPtr = Arc<dyn Fn(&TaskContext) -> TaskResult + Send + Sync>;

/// A named, dependency-aware build step.
///
/// Each unit must be idempotent: running it twice against unchanged inputs
/// has to produce identical outputs, so every built-in task overwrites its
/// destination rather than appending to it.
#[derive(Clone)]
pub struct TaskUnit {
    pub name: &'static str,
    /// Names of tasks that must succeed before this one may start.
    pub deps: Vec<&'static str>,
    /// When set, a successful run in watch mode broadcasts this update to
    /// connected clients.
    pub reload: Option<ReloadHint>,
    func: TaskFnPtr,
}

impl TaskUnit {
    pub fn new<F>(name: &'static str, func: F) -> Self
    where
        F: Fn(&TaskContext) -> TaskResult + Send + Sync + 'static,
    {
        Self {
            name,
            deps: Vec::new(),
            reload: None,
            func: Arc::new(func),
        }
    }

    pub fn after(mut self, deps: impl IntoIterator<Item = &'static str>) -> Self {
        self.deps.extend(deps);
        self
    }

    pub fn reload(mut self, kind: ReloadKind, path: impl Into<Utf8PathBuf>) -> Self {
        self.reload = Some(ReloadHint {
            kind,
            path: path.into(),
        });
        self
    }

    pub fn run(&self, context: &TaskContext) -> TaskResult {
        (self.func)(context)
    }
}

impl Debug for TaskUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskUnit")
            .field("name", &self.name)
            .field("deps", &self.deps)
            .finish_non_exhaustive()
    }
}

/// Outcome of one task within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Success,
    Failed(String),
    /// A transitive dependency failed, so this task was never started.
    Skipped,
}

/// Aggregated outcome of a whole executor invocation.
#[derive(Debug, Default)]
pub struct RunReport {
    results: Vec<(&'static str, TaskStatus)>,
}

impl RunReport {
    pub(crate) fn record(&mut self, name: &'static str, status: TaskStatus) {
        self.results.push((name, status));
    }

    pub fn ok(&self) -> bool {
        self.results
            .iter()
            .all(|(_, status)| matches!(status, TaskStatus::Success))
    }

    pub fn status(&self, name: &str) -> Option<&TaskStatus> {
        self.results
            .iter()
            .find(|(task, _)| *task == name)
            .map(|(_, status)| status)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &TaskStatus)> {
        self.results.iter().map(|(name, status)| (*name, status))
    }

    /// Successfully completed tasks, in completion order.
    pub fn succeeded(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.results
            .iter()
            .filter(|(_, status)| matches!(status, TaskStatus::Success))
            .map(|(name, _)| *name)
    }

    /// The first failure, if any, as `(task name, message)`.
    pub fn first_failure(&self) -> Option<(&'static str, &str)> {
        self.results.iter().find_map(|(name, status)| match status {
            TaskStatus::Failed(message) => Some((*name, message.as_str())),
            _ => None,
        })
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, status)| matches!(status, TaskStatus::Failed(_)))
            .count()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
