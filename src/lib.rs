#![forbid(unsafe_code)]
//! esteira is an asset pipeline for static sites: a task dependency graph
//! over a set of wrapped tools (Sass compilation, script bundling and
//! minification, image optimization, critical-CSS inlining) plus a watch
//! engine and a live-reload dev server for development.
//!
//! The two entry points are [`Pipeline::deploy`], which runs the production
//! graph once, and [`Pipeline::dev`], which serves the source tree and
//! incrementally rebuilds the minimal task subset on every change.

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod pipeline;
pub mod server;
pub mod task;
pub mod transform;
pub mod watch;

pub use crate::config::{Category, PathSet, Paths};
pub use crate::error::{BuildError, EsteiraError, GraphError, TransformError, WatchError};
pub use crate::executor::Executor;
pub use crate::graph::{GraphBuilder, TaskGraph};
pub use crate::pipeline::{Pipeline, PipelineOptions};
pub use crate::server::{BroadcastChannel, ReloadKind, ReloadMsg};
pub use crate::task::{RunReport, TaskContext, TaskResult, TaskStatus, TaskUnit};
pub use crate::watch::{StopHandle, WatchBinding, WatchEngine, WatchState};
