use std::sync::mpsc::{RecvError, SendError};

use thiserror::Error;

use crate::server::ReloadMsg;

/// Validation failures detected while assembling the task graph. All of
/// these are fatal at startup; nothing runs until the graph is a valid DAG.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' is declared more than once")]
    Duplicate(String),

    #[error("Task '{task}' depends on unknown task '{dep}'")]
    UnknownDependency { task: String, dep: String },

    #[error("Dependency cycle involving task '{0}'")]
    Cycle(String),

    #[error("Unknown target task '{0}'")]
    UnknownTarget(String),
}

/// A wrapped tool failed while transforming an asset.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TransformError(#[from] pub anyhow::Error);

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Task '{0}':\n{1}")]
    Task(String, anyhow::Error),

    #[error("{failed} of {total} tasks failed, first failure in '{first}':\n{message}")]
    Report {
        failed: usize,
        total: usize,
        first: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Recv(#[from] RecvError),

    #[error(transparent)]
    Send(#[from] SendError<ReloadMsg>),
}

#[derive(Debug, Error)]
pub enum EsteiraError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Error while building the site.\n{0}")]
    Build(#[from] BuildError),

    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
