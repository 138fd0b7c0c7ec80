//! Command-line interface.
//!
//! Every option falls back to an environment variable, so the harness can be
//! driven from a container definition without arguments:
//!
//! | Option | Env | Default |
//! |--------|-----|---------|
//! | `--primary-host` | `PGHOST` | `patroni1` |
//! | `--secondary1-host` | `PGSEC2` | `patroni2` |
//! | `--secondary2-host` | `PGSEC3` | `patroni3` |
//! | `--synchronous-commit` | `SYNCOMMIT` | server default |
//! | `--routed-reads` | `USE_RLB` | off |
//! | `num_connections` | `MAXCONNS` | 30 |
//! | `num_loops` | `MAXLOOPS` | 5 |

use std::time::Duration;

use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};

use crate::config::{
    ClusterConfig, DurabilityMode, Endpoint, HarnessConfig, ReadErrorPolicy, VerifyMode,
    DEFAULT_ROUNDS, DEFAULT_WORKERS,
};

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "synchtest")]
#[command(
    about = "Verify that a replication durability mode prevents stale replica reads",
    long_about = None
)]
pub struct Cli {
    /// Cluster endpoints and credentials.
    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drop and recreate the synchtest table on the primary
    Create,
    /// Run the concurrent write/verify workload
    Run(RunArgs),
}

/// Cluster endpoint options, shared by every subcommand.
#[derive(Args, Debug)]
pub struct ClusterArgs {
    /// Primary (leader) host
    #[arg(long, env = "PGHOST", default_value = "patroni1", global = true)]
    pub primary_host: String,

    /// First replica host
    #[arg(long, env = "PGSEC2", default_value = "patroni2", global = true)]
    pub secondary1_host: String,

    /// Second replica host
    #[arg(long, env = "PGSEC3", default_value = "patroni3", global = true)]
    pub secondary2_host: String,

    /// Port used on every host
    #[arg(long, env = "PGPORT", default_value_t = 5432, global = true)]
    pub port: u16,

    /// Login role
    #[arg(long, env = "PGUSER", default_value = "postgres", global = true)]
    pub user: String,

    /// Login password
    #[arg(
        long,
        env = "PGPASSWORD",
        default_value = "postgres",
        hide_env_values = true,
        global = true
    )]
    pub password: String,

    /// Database name
    #[arg(long, env = "PGDATABASE", default_value = "postgres", global = true)]
    pub database: String,
}

impl ClusterArgs {
    fn endpoint(&self, host: &str) -> Endpoint {
        Endpoint {
            host: host.to_string(),
            port: self.port,
            user: self.user.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
        }
    }

    /// Endpoints for the three cluster members.
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            primary: self.endpoint(&self.primary_host),
            secondary1: self.endpoint(&self.secondary1_host),
            secondary2: self.endpoint(&self.secondary2_host),
        }
    }
}

/// Options of the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Number of concurrent connections (one worker each)
    #[arg(env = "MAXCONNS", default_value_t = DEFAULT_WORKERS)]
    pub num_connections: u32,

    /// Number of rounds
    #[arg(env = "MAXLOOPS", default_value_t = DEFAULT_ROUNDS)]
    pub num_loops: u32,

    /// synchronous_commit value for sessions and transactions (e.g. remote_apply)
    #[arg(long, env = "SYNCOMMIT")]
    pub synchronous_commit: Option<String>,

    /// Verify through the primary endpoint only, leaving routing to a load balancer
    #[arg(long, env = "USE_RLB", value_parser = FalseyValueParser::new())]
    pub routed_reads: bool,

    /// Pause between rounds in milliseconds
    #[arg(long, env = "ROUND_PAUSE_MS", default_value_t = 1)]
    pub round_pause_ms: u64,

    /// What to do when a verification read fails
    #[arg(long, value_enum, env = "READ_ERRORS", default_value_t = ReadErrorPolicy::Fatal)]
    pub read_errors: ReadErrorPolicy,
}

impl RunArgs {
    /// Build the run configuration for `cluster`.
    pub fn harness_config(&self, cluster: ClusterConfig) -> HarnessConfig {
        HarnessConfig {
            cluster,
            durability: self.synchronous_commit.clone().map(DurabilityMode::new),
            verify_mode: VerifyMode::from_routed_reads(self.routed_reads),
            workers: self.num_connections,
            rounds: self.num_loops,
            round_pause: Duration::from_millis(self.round_pause_ms),
            read_errors: self.read_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Target;

    fn run_args(cli: Cli) -> (ClusterArgs, RunArgs) {
        match cli.command {
            Command::Run(args) => (cli.cluster, args),
            Command::Create => panic!("expected run subcommand"),
        }
    }

    #[test]
    fn test_run_positional_arguments() {
        let cli = Cli::try_parse_from(["synchtest", "run", "12", "3"]).unwrap();
        let (_, args) = run_args(cli);
        assert_eq!(args.num_connections, 12);
        assert_eq!(args.num_loops, 3);
    }

    #[test]
    fn test_run_options_build_config() {
        let cli = Cli::try_parse_from([
            "synchtest",
            "run",
            "4",
            "2",
            "--synchronous-commit",
            "remote_apply",
            "--routed-reads",
            "--round-pause-ms",
            "0",
            "--read-errors",
            "count",
            "--primary-host",
            "pg-a",
            "--secondary2-host",
            "pg-c",
        ])
        .unwrap();
        let (cluster, args) = run_args(cli);
        let config = args.harness_config(cluster.cluster_config());

        assert_eq!(config.workers, 4);
        assert_eq!(config.rounds, 2);
        assert_eq!(config.durability, Some(DurabilityMode::new("remote_apply")));
        assert_eq!(config.verify_mode, VerifyMode::Direct);
        assert_eq!(config.round_pause, Duration::ZERO);
        assert_eq!(config.read_errors, ReadErrorPolicy::Count);
        assert_eq!(config.cluster.endpoint(Target::Primary).host, "pg-a");
        assert_eq!(config.cluster.endpoint(Target::Secondary2).host, "pg-c");
    }

    #[test]
    fn test_create_subcommand() {
        let cli = Cli::try_parse_from(["synchtest", "create", "--port", "6432"]).unwrap();
        assert!(matches!(cli.command, Command::Create));
        assert_eq!(cli.cluster.cluster_config().secondary1.port, 6432);
    }

    #[test]
    fn test_missing_subcommand_is_usage_error() {
        assert!(Cli::try_parse_from(["synchtest"]).is_err());
        assert!(Cli::try_parse_from(["synchtest", "destroy"]).is_err());
    }

    #[test]
    fn test_invalid_read_error_policy() {
        assert!(Cli::try_parse_from(["synchtest", "run", "--read-errors", "retry"]).is_err());
    }
}
