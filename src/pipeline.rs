//! Composition of the two pipelines.
//!
//! Everything here is wiring: the transforms do the work, the graph decides
//! the order. Two ordering constraints are load-bearing and must not be
//! relaxed: `build-css` waits for `rewrite-html` so the purge pass reads the
//! *destination* HTML, and `critical-css` waits for `build-css` (and
//! `rewrite-html`) so it inlines the final CSS into the final HTML. Breaking
//! either silently feeds source-tree inputs into the production build.

use std::fs;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use crate::config::{Category, Paths};
use crate::error::{EsteiraError, GraphError, TransformError};
use crate::executor::Executor;
use crate::graph::TaskGraph;
use crate::server::{self, ReloadKind};
use crate::task::{RunReport, TaskUnit};
use crate::transform::critical::{self, Viewport};
use crate::transform::{fonts, html, images, scripts, styles};
use crate::watch::{StopHandle, WatchBinding, WatchEngine};

/// The style entry point and its compiled name.
const STYLE_ENTRY: &str = "main.scss";
const STYLE_OUT: &str = "main.css";

/// Tunable knobs; the defaults reproduce the conventional pipeline.
pub struct PipelineOptions {
    /// Vendor scripts bundled into `main.js`, relative to the source
    /// scripts directory, concatenated in this order.
    pub vendor_scripts: Vec<Utf8PathBuf>,
    /// Build-block name to final asset path.
    pub rewrite_map: Vec<(String, String)>,
    /// Selector patterns the purge pass must never drop.
    pub purge_keep: Vec<Regex>,
    /// Viewports the critical CSS should cover.
    pub viewports: Vec<Viewport>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            vendor_scripts: Vec::new(),
            rewrite_map: vec![
                ("css".to_string(), "assets/css/main.css".to_string()),
                ("globaljs".to_string(), "assets/js/main.min.js".to_string()),
            ],
            purge_keep: styles::default_purge_keep(),
            viewports: critical::DEFAULT_VIEWPORTS.to_vec(),
        }
    }
}

pub struct Pipeline {
    paths: Paths,
    options: Arc<PipelineOptions>,
}

impl Pipeline {
    pub fn new(paths: Paths, options: PipelineOptions) -> Self {
        Self {
            paths,
            options: Arc::new(options),
        }
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// The production graph, rooted at the `deploy` target.
    pub fn deploy_graph(&self) -> Result<TaskGraph, GraphError> {
        let opts = &self.options;

        TaskGraph::builder()
            .add(rewrite_html_task(opts.clone()))
            .add(build_images_task())
            .add(global_scripts_task(opts.clone()))
            .add(local_scripts_task())
            .add(copy_fonts_task())
            .add(build_css_task(opts.clone()))
            .add(critical_css_task(opts.clone()))
            .add(TaskUnit::new("deploy", |_| Ok(())).after([
                "rewrite-html",
                "build-images",
                "build-css",
                "global-scripts",
                "local-scripts",
                "copy-fonts",
                "critical-css",
            ]))
            .build()
    }

    /// The development graph: fast style and script rebuilds into the
    /// source tree, each labeled with the update kind it broadcasts.
    pub fn dev_graph(&self) -> Result<TaskGraph, GraphError> {
        let opts = &self.options;

        TaskGraph::builder()
            .add(dev_styles_task().reload(ReloadKind::Css, "assets/css/main.css"))
            .add(dev_scripts_task(opts.clone()).reload(ReloadKind::Js, "assets/js/main.js"))
            .build()
    }

    /// Filesystem bindings for watch mode: a change in a category re-runs
    /// only that category's dev task. The generated `main.js` bundle is
    /// excluded from its own trigger pattern.
    pub fn watch_bindings(&self) -> Result<Vec<WatchBinding>, glob::PatternError> {
        // A leading `./` would become a literal part of the glob pattern and
        // never match the event paths.
        let strip_dot = |dir: &'_ Utf8Path| dir.strip_prefix(".").unwrap_or(dir).to_owned();
        let styles_dir = strip_dot(self.paths.source.dir(Category::Styles));
        let scripts_dir = strip_dot(self.paths.source.dir(Category::Scripts));

        Ok(vec![
            WatchBinding::new(&format!("{styles_dir}/**/*.scss"), ["dev-styles"])?,
            WatchBinding::new(&format!("{scripts_dir}/**/*.js"), ["dev-scripts"])?
                .ignore(&format!("{scripts_dir}/main.js"))?,
        ])
    }

    /// Run the production build once.
    pub fn deploy(&self) -> Result<RunReport, EsteiraError> {
        let graph = self.deploy_graph()?;
        let report = Executor::new(&graph, &self.paths).run(&["deploy"])?;
        Ok(report)
    }

    /// Run the dev pipeline once, then serve the source tree and keep
    /// rebuilding on changes until `stop` fires. Task failures, including
    /// in the initial build, are logged and watching continues; the next
    /// save recovers.
    pub fn dev(&self, http_port: u16, stop: StopHandle) -> Result<(), EsteiraError> {
        let graph = self.dev_graph()?;

        let report = Executor::new(&graph, &self.paths).run(&["dev-styles", "dev-scripts"])?;
        if let Some((task, message)) = report.first_failure() {
            tracing::error!(task, "initial dev build failed: {message}");
        }

        let (listener, ws_port) = server::reserve_port().map_err(EsteiraError::Watch)?;
        let channel = server::start_broadcast(listener);
        tracing::info!(port = ws_port, "live-reload channel ready");

        let _http = server::http::start(self.paths.source.root().to_owned(), http_port);

        let bindings = self.watch_bindings()?;
        let engine = WatchEngine::new(&graph, &self.paths, bindings, channel, stop);
        engine.run()?;

        Ok(())
    }
}

fn list_html(dir: &Utf8Path) -> anyhow::Result<Vec<Utf8PathBuf>> {
    let pattern = dir.join("*.html");
    let mut pages = Vec::new();

    for entry in glob::glob(pattern.as_str())? {
        pages.push(Utf8PathBuf::try_from(entry?)?);
    }

    pages.sort();
    Ok(pages)
}

fn write_file(path: &Utf8Path, contents: impl AsRef<[u8]>) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

/// Copy each source page into dist with its build blocks resolved to final
/// asset paths. Must complete before any pass that reads the dist HTML.
fn rewrite_html_task(opts: Arc<PipelineOptions>) -> TaskUnit {
    TaskUnit::new("rewrite-html", move |ctx| {
        let src = ctx.paths.source.dir(Category::Pages);
        let dst = ctx.paths.dist.dir(Category::Pages);

        let mapping: Vec<(&str, &str)> = opts
            .rewrite_map
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_str()))
            .collect();

        for page in list_html(src)? {
            let contents = fs::read_to_string(&page)?;
            let rewritten = html::rewrite_blocks(&contents, &mapping);
            let name = page.file_name().expect("glob yields files");
            write_file(&dst.join(name), rewritten)?;
        }

        Ok(())
    })
}

fn build_images_task() -> TaskUnit {
    TaskUnit::new("build-images", |ctx| {
        let src = ctx.paths.source.dir(Category::Images);
        let dst = ctx.paths.dist.dir(Category::Images);

        for entry in glob::glob(src.join("**/*").as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(src).unwrap_or(&path);
            images::optimize_into(&path, &dst.join(relative))?;
        }

        Ok(())
    })
}

fn global_scripts_task(opts: Arc<PipelineOptions>) -> TaskUnit {
    TaskUnit::new("global-scripts", move |ctx| {
        let src = ctx.paths.source.dir(Category::Scripts);
        let dst = ctx.paths.dist.dir(Category::Scripts);

        let sources: Vec<Utf8PathBuf> =
            opts.vendor_scripts.iter().map(|s| src.join(s)).collect();

        let bundle = scripts::concat(&sources)?;
        write_file(&dst.join("main.min.js"), scripts::minify(&bundle))?;

        Ok(())
    })
}

/// Page-local scripts are minified one by one, keeping their layout, since
/// each page references only its own.
fn local_scripts_task() -> TaskUnit {
    TaskUnit::new("local-scripts", |ctx| {
        let src = ctx.paths.source.dir(Category::Scripts).join("pages");
        let dst = ctx.paths.dist.dir(Category::Scripts).join("pages");

        for entry in glob::glob(src.join("*.js").as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            let source = fs::read_to_string(&path)?;
            let name = path.file_name().expect("glob yields files");
            write_file(&dst.join(name), scripts::minify(&source))?;
        }

        Ok(())
    })
}

fn copy_fonts_task() -> TaskUnit {
    TaskUnit::new("copy-fonts", |ctx| {
        let src = ctx.paths.source.dir(Category::Fonts);
        let dst = ctx.paths.dist.dir(Category::Fonts);
        fonts::copy_fonts(src, dst)?;
        Ok(())
    })
}

/// The production stylesheet: compile, prefix, convert units, purge against
/// the dist HTML, minify. Depends on `rewrite-html` having produced that
/// HTML already.
fn build_css_task(opts: Arc<PipelineOptions>) -> TaskUnit {
    TaskUnit::new("build-css", move |ctx| {
        let entry = ctx.paths.source.dir(Category::Styles).join(STYLE_ENTRY);
        let dst = ctx.paths.dist.dir(Category::Styles).join(STYLE_OUT);

        let documents = list_html(ctx.paths.dist.dir(Category::Pages))?
            .iter()
            .map(fs::read_to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let compiled = styles::compile(&entry).map_err(TransformError)?;
        let passes = vec![
            styles::pass_prefix(),
            styles::pass_px_to_rem(16.0),
            styles::pass_purge(documents, opts.purge_keep.clone()),
            styles::pass_minify(),
        ];

        write_file(&dst, styles::apply(&compiled, &passes)?)?;
        Ok(())
    })
    .after(["rewrite-html", "global-scripts", "local-scripts"])
}

/// Runs last: reads the already-final dist HTML and CSS and inlines the
/// critical subset in place.
fn critical_css_task(opts: Arc<PipelineOptions>) -> TaskUnit {
    TaskUnit::new("critical-css", move |ctx| {
        let css_path = ctx.paths.dist.dir(Category::Styles).join(STYLE_OUT);
        let css = fs::read_to_string(&css_path)?;

        for page in list_html(ctx.paths.dist.dir(Category::Pages))? {
            let contents = fs::read_to_string(&page)?;
            let subset = critical::extract(&contents, &css, &opts.viewports);
            write_file(&page, html::inline_critical(&contents, &subset))?;
        }

        Ok(())
    })
    .after(["rewrite-html", "build-css"])
}

/// Dev styles skip the purge and minify passes for fast feedback and land
/// in the source tree, where the dev server picks them up.
fn dev_styles_task() -> TaskUnit {
    TaskUnit::new("dev-styles", |ctx| {
        let entry = ctx.paths.source.dir(Category::Styles).join(STYLE_ENTRY);
        let dst = ctx.paths.source.dir(Category::Styles).join(STYLE_OUT);

        let compiled = styles::compile(&entry).map_err(TransformError)?;
        let passes = vec![styles::pass_prefix(), styles::pass_px_to_rem(16.0)];

        write_file(&dst, styles::apply(&compiled, &passes)?)?;
        Ok(())
    })
}

fn dev_scripts_task(opts: Arc<PipelineOptions>) -> TaskUnit {
    TaskUnit::new("dev-scripts", move |ctx| {
        let src = ctx.paths.source.dir(Category::Scripts);

        let sources: Vec<Utf8PathBuf> =
            opts.vendor_scripts.iter().map(|s| src.join(s)).collect();

        let bundle = scripts::concat(&sources)?;
        write_file(&src.join("main.js"), bundle)?;
        Ok(())
    })
}
