use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

use esteira::{Paths, Pipeline, PipelineOptions, StopHandle, executor};

#[derive(Debug, Parser)]
#[command(
    name = "esteira",
    version,
    about = "Static-site asset pipeline with incremental watch and live reload"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Watch the source tree, rebuild on change and serve with live reload.
    Dev {
        /// Project root containing the `src` tree.
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: Utf8PathBuf,

        /// HTTP port for the dev server.
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run the production build once into `dist`.
    Deploy {
        /// Project root containing the `src` tree.
        #[arg(long, value_name = "DIR", default_value = ".")]
        root: Utf8PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("ESTEIRA_LOG").unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Dev { root, port } => dev(root, port),
        Command::Deploy { root } => deploy(root),
    }
}

fn dev(root: Utf8PathBuf, port: u16) -> ExitCode {
    eprintln!(
        "Running {} in {} mode.",
        style("esteira").red(),
        style("dev").blue()
    );

    let pipeline = Pipeline::new(Paths::conventional(root), PipelineOptions::default());
    let stop = StopHandle::new();

    match pipeline.dev(port, stop) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn deploy(root: Utf8PathBuf) -> ExitCode {
    eprintln!(
        "Running {} in {} mode.",
        style("esteira").red(),
        style("deploy").blue()
    );

    let pipeline = Pipeline::new(Paths::conventional(root), PipelineOptions::default());

    let report = match pipeline.deploy() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match executor::into_result(&report) {
        Ok(()) => {
            eprintln!("{}", style("Deploy finished.").green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}
