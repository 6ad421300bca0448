use aes_cpa::{
    config::Config,
    distinguishers::cpa::KeyByteSolver,
    report::{ConsoleReporter, KeyGuess},
    scheduler::WorkScheduler,
    trace::{BLOCK_SIZE, Dataset},
};
use anyhow::{Context, Result};
use std::{env, path::PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let traces_path =
        PathBuf::from(env::var("TRACES_PATH").context("Missing TRACES_PATH environment variable")?);
    let config = Config::from_env().context("Invalid configuration")?;

    // Shape errors abort before any correlation work
    let dataset = Dataset::load(&traces_path)
        .with_context(|| format!("Failed to load traces from {}", traces_path.display()))?;

    let solver = KeyByteSolver::new(&dataset);
    let scheduler = WorkScheduler::new(config)?;
    let positions: Vec<usize> = (0..BLOCK_SIZE).collect();

    let mut reporter = ConsoleReporter::new(positions.len());
    let summary = scheduler.run(&solver, &positions, &mut reporter)?;
    reporter.finish();

    let guess = KeyGuess::from_results(&summary.results)?;
    println!("Key guess: {}", guess.to_hex());
    info!(
        min_confidence = guess.min_confidence(),
        starvations = summary.starvations,
        "attack complete"
    );

    if let Ok(output) = env::var("CPA_OUTPUT") {
        guess
            .save(&output)
            .with_context(|| format!("Failed to save key guess to {output}"))?;
    }

    Ok(())
}
