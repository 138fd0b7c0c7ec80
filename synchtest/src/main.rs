//! `synchtest` binary.
//!
//! ```bash
//! # Create the table on the primary
//! synchtest create
//!
//! # 30 workers, 5 rounds, remote_apply on every write
//! SYNCOMMIT=remote_apply synchtest run 30 5
//! ```

use std::process::ExitCode;

use clap::Parser;
use synchtest::cli::{Cli, Command};
use synchtest::{create_table, HarnessError, PostgresConnector, WorkloadDriver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    // Connection drivers are spawned with spawn_local.
    let local = tokio::task::LocalSet::new();
    let result = local.run_until(execute(cli)).await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, worker = ?e.worker(), "run failed");
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> Result<(), HarnessError> {
    let cluster = cli.cluster.cluster_config();

    match cli.command {
        Command::Create => create_table(&PostgresConnector::new(), &cluster).await,
        Command::Run(args) => {
            let config = args.harness_config(cluster);
            let mut driver = WorkloadDriver::new(PostgresConnector::new(), config)?;
            let report = driver.run().await?;
            println!("{report}");
            Ok(())
        }
    }
}
