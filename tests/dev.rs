//! Watch-mode entry points exercised through the public API.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use esteira::{
    Paths, Pipeline, PipelineOptions, StopHandle, TaskGraph, TaskUnit, WatchEngine, WatchState,
    server,
};

fn scaffold(root: &Utf8Path) {
    let src = root.join("src");
    fs::create_dir_all(src.join("assets/css")).unwrap();
    fs::create_dir_all(src.join("assets/js/vendor")).unwrap();

    fs::write(src.join("assets/css/main.scss"), ".broken { color: ").unwrap();
    fs::write(src.join("assets/js/vendor/lib.js"), "lib();\n").unwrap();
}

#[test]
fn dev_enters_watch_mode_despite_failing_initial_build() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
    scaffold(&root);

    let options = PipelineOptions {
        vendor_scripts: vec![Utf8PathBuf::from("vendor/lib.js")],
        ..PipelineOptions::default()
    };
    let pipeline = Pipeline::new(Paths::conventional(&root), options);

    // Stop immediately: the session must reach the watch loop and shut
    // down cleanly even though the stylesheet does not compile.
    let stop = StopHandle::new();
    stop.stop();

    pipeline.dev(0, stop).unwrap();
}

#[test]
fn watch_engine_assembles_from_public_parts() {
    let graph = TaskGraph::builder()
        .add(TaskUnit::new("dev-styles", |_| Ok(())))
        .build()
        .unwrap();
    let paths = Paths::conventional(".");

    let (listener, port) = server::reserve_port().unwrap();
    assert_ne!(port, 0);
    let channel = server::start_broadcast(listener);

    let engine = WatchEngine::new(&graph, &paths, vec![], channel, StopHandle::new());
    assert_eq!(engine.state(), WatchState::Idle);
}
