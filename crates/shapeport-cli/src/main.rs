mod cli;
mod report;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use shapeport_core::{ShapeEngine, ShapeError};
use shapeport_onnx::OnnxShapeEngine;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("shape-infer: {err:#}");
            let code = err
                .downcast_ref::<ShapeError>()
                .map(ShapeError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    init_tracing(&cli.log)?;

    let paths = cli.paths()?;
    let options = cli.options();
    let engine: &dyn ShapeEngine = &OnnxShapeEngine::new();
    tracing::debug!(engine = engine.name(), ?options, "starting");

    let report = engine
        .infer_path(&paths, &options)
        .with_context(|| format!("shape inference of {} failed", paths.input().display()))?;

    if cli.report {
        print!("{}", report::render(&report));
    }
    Ok(())
}

/// Filter comes from `--log` only; `RUST_LOG` is not consulted.
fn init_tracing(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| ShapeError::Argument(format!("invalid --log filter '{directives}': {e}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
