//! Probemon Presence - Main Entry Point

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use probemon_presence::cli::Cli;
use probemon_presence::constants::APP_VERSION;
use probemon_presence::logic::PresenceFile;
use probemon_presence::{Dataset, PresenceError};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::debug!("Starting probemon-presence v{}", APP_VERSION);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(PresenceError::EmptyResult) = e.downcast_ref::<PresenceError>() {
                eprintln!("Error: nothing to plot");
            } else {
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let output = cli.output.clone();

    let lists = PresenceFile::load(cli.config.as_deref())
        .context("loading config file")?
        .resolve()?;
    let config = cli.into_run_config(lists)?;

    let dataset = probemon_presence::run(&config)?;
    for entry in dataset.iter() {
        log::debug!("{}: {} observations", entry.label, entry.timestamps.len());
    }

    match output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            write_dataset(&dataset, BufWriter::new(file))?;
            log::info!("Dataset written to {}", path.display());
        }
        None => write_dataset(&dataset, io::stdout().lock())?,
    }
    Ok(())
}

fn write_dataset<W: Write>(dataset: &Dataset, mut out: W) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut out, dataset)?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
