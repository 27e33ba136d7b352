mod config;
mod db;
mod error;
mod migrate;
mod store;
mod student;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use std::io;
use std::path::PathBuf;

/// Copies legacy Student records into the CourseStudent table.
#[derive(Debug, Parser)]
#[command(name = "course-student-migrate", version)]
struct Cli {
    /// JSON file selecting the workspace, target and preview flag.
    #[arg(short, long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    let mut session = store::WorkspaceSession::new(&config.workspace);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let report = migrate::run(&mut session, &config, &mut out).context("migration aborted")?;

    for failure in &report.failures {
        warn!("not copied: {} ({})", failure.identification, failure.reason);
    }
    info!(
        "run {} finished ({}): {} selected, {} previewed, {} written, {} replaced differing rows, {} failed",
        report.run_id,
        if report.preview { "preview" } else { "apply" },
        report.selected,
        report.previewed,
        report.written,
        report.replaced,
        report.failures.len()
    );
    Ok(())
}
