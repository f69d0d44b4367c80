//! Command-line interface definitions

use anyhow::Result;
use clap::Parser;

/// Stress driver for the dispatch-async queues, groups and semaphores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Scenario to run
    #[arg(long, value_enum, default_value = "all")]
    pub scenario: Scenario,

    /// Hand-offs for ping-pong, work items for the group scenario
    ///
    /// libdispatch's dispatch_pingpong.c uses 10,000,000 ping-pong hand-offs; the
    /// default keeps a full run to a few seconds.
    #[arg(long, default_value = "100000")]
    pub iterations: usize,

    /// Racing tasks for the semaphore and serial-ordering scenarios
    #[arg(long, default_value = "64")]
    pub tasks: usize,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

/// Stress scenario selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Two serial queues scheduling onto each other
    PingPong,
    /// Group enter/leave across a concurrent queue, then notify-once
    Group,
    /// Read-yield-write increments under a binary semaphore
    Semaphore,
    /// Racing submitters on one serial queue
    Serial,
    /// Every scenario above, in order
    All,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - Iterations or tasks is zero
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            anyhow::bail!("Iterations must be at least 1");
        }

        if self.tasks == 0 {
            anyhow::bail!("Tasks must be at least 1");
        }

        // Validate conflicting options
        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// The individual scenarios selected by `--scenario`
    #[must_use]
    pub fn scenarios(&self) -> Vec<Scenario> {
        match self.scenario {
            Scenario::All => vec![
                Scenario::PingPong,
                Scenario::Group,
                Scenario::Semaphore,
                Scenario::Serial,
            ],
            single => vec![single],
        }
    }

    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            scenario: Scenario::All,
            iterations: 100,
            tasks: 8,
            verbose: 0,
            quiet: false,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_parse() {
        let args = Args::try_parse_from(["dispatch-stress"]).unwrap();
        assert_eq!(args.scenario, Scenario::All);
        assert_eq!(args.iterations, 100_000);
        assert_eq!(args.tasks, 64);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_scenario_flag() {
        let args =
            Args::try_parse_from(["dispatch-stress", "--scenario", "ping-pong", "-vv"]).unwrap();
        assert_eq!(args.scenarios(), vec![Scenario::PingPong]);
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_all_expands_to_every_scenario() {
        let args = Args::test_default();
        assert_eq!(args.scenarios().len(), 4);
        assert!(!args.scenarios().contains(&Scenario::All));
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let args = Args {
            iterations: 0,
            ..Args::test_default()
        };
        assert!(args.validate().is_err());

        let args = Args {
            tasks: 0,
            ..Args::test_default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_quiet_and_verbose() {
        let args = Args {
            quiet: true,
            verbose: 1,
            ..Args::test_default()
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_unknown_scenario_rejected() {
        assert!(Args::try_parse_from(["dispatch-stress", "--scenario", "bogus"]).is_err());
    }
}
