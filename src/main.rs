//! dispatch-stress: exercise the dispatch-async primitives under load
//!
//! Runs the ping-pong, group, semaphore and serial-ordering scenarios on a
//! compio runtime and logs how long each took.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use dispatch_async::cli::Args;
use dispatch_async::stress;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    if args.quiet {
        // In quiet mode, only log errors
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match args.verbose {
                0 => Level::INFO,
                1 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_target(false)
            .with_thread_names(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    }

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    info!("Starting dispatch-stress v{}", env!("CARGO_PKG_VERSION"));
    info!("Iterations: {}", args.iterations);
    info!("Tasks: {}", args.tasks);

    let runtime = compio::runtime::Runtime::new().context("Failed to start compio runtime")?;
    runtime.block_on(async {
        for scenario in args.scenarios() {
            stress::run_scenario(scenario, args.iterations, args.tasks)
                .await
                .with_context(|| format!("Scenario {scenario:?} failed"))?;
        }
        info!("All scenarios passed");
        Ok::<_, anyhow::Error>(())
    })
}
