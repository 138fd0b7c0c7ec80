//! Round orchestration.
//!
//! A run is a sequence of rounds. Each round:
//!
//! 1. deletes every row through worker 1's primary session and waits for it
//!    (the barrier: no stale marker from the previous round can match)
//! 2. launches one [`WorkerTask`] per worker, all at once
//! 3. waits for every task; the first fatal error ends the run
//! 4. pauses briefly to give asynchronous replication a chance
//!
//! After the last round every session is closed and the oracle's counters
//! become the [`ConsistencyReport`].

use std::time::Instant;

use futures::future::try_join_all;

use crate::config::{HarnessConfig, Target, WorkerId};
use crate::driver::builder::DriverBuilder;
use crate::driver::harness::Harness;
use crate::error::{HarnessError, WorkerStep};
use crate::oracle::{ConsistencyReport, Marker};
use crate::sql;
use crate::store::{Connector, Session};
use crate::worker::WorkerTask;

/// Drives rounds of concurrent write/verify work.
pub struct WorkloadDriver<C: Connector> {
    harness: Harness<C>,
}

impl<C: Connector> WorkloadDriver<C> {
    /// Create a driver after validating `config`.
    pub fn new(connector: C, config: HarnessConfig) -> Result<Self, HarnessError> {
        config.validate()?;
        Ok(Self {
            harness: Harness::new(connector, config),
        })
    }

    /// Start a [`DriverBuilder`].
    pub fn builder() -> DriverBuilder<C> {
        DriverBuilder::new()
    }

    /// The run context.
    pub fn harness(&self) -> &Harness<C> {
        &self.harness
    }

    /// Open every session the run needs.
    ///
    /// Replica sessions are only opened for fan-out verification.
    pub async fn connect(&mut self) -> Result<(), HarnessError> {
        let workers = self.harness.config().workers;
        let include_secondaries = self.harness.config().verify_mode.needs_secondaries();
        tracing::info!(workers, include_secondaries, "creating new conns");
        self.harness
            .pool_mut()
            .connect_all(workers, include_secondaries)
            .await
    }

    /// Run one round: barrier delete, then every worker concurrently.
    ///
    /// Returns the markers written, in worker order.
    pub async fn run_round(&self, round: u32) -> Result<Vec<Marker>, HarnessError> {
        let workers = self.harness.config().workers;

        tracing::info!(round, "deleting all data");
        let barrier = self
            .harness
            .pool()
            .session(Target::Primary, WorkerId::FIRST)?;
        let deleted = barrier
            .execute(sql::DELETE_ALL)
            .await
            .map_err(|source| HarnessError::Transaction {
                worker: WorkerId::FIRST,
                round,
                step: WorkerStep::Barrier,
                source,
            })?;
        tracing::debug!(round, deleted, "barrier complete");

        let tasks = WorkerId::range(workers)
            .map(|worker| WorkerTask::new(&self.harness, worker, round).run());
        let markers = try_join_all(tasks).await?;

        tracing::info!(
            round,
            workers = markers.len(),
            "completed waiting for all updates"
        );
        Ok(markers)
    }

    /// Close every session in the pool.
    pub async fn close(&mut self) {
        tracing::info!("closing all conns");
        for target in Target::ALL {
            self.harness.pool_mut().close_all(target).await;
        }
    }

    /// Connect, run every round, tear down and report.
    ///
    /// # Errors
    ///
    /// Any [`HarnessError`] aborts the run immediately; rounds after the
    /// failing one never start.
    pub async fn run(&mut self) -> Result<ConsistencyReport, HarnessError> {
        let start = Instant::now();
        let config = self.harness.config().clone();

        tracing::info!(
            workers = config.workers,
            rounds = config.rounds,
            verify_mode = %config.verify_mode,
            durability = ?config.durability.as_ref().map(|m| m.as_str()),
            "starting run"
        );

        self.harness.reset_oracle();
        self.connect().await?;

        for round in 0..config.rounds {
            self.run_round(round).await?;
            tokio::time::sleep(config.round_pause).await;
        }

        self.close().await;

        let report = self.harness.oracle().report(
            config.workers,
            config.rounds,
            config.verify_mode,
            start.elapsed(),
        );
        tracing::info!(
            success = report.success,
            failures = report.total_failures(),
            "run complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerifyMode;
    use crate::store::MemoryCluster;

    fn driver(cluster: &MemoryCluster, workers: u32, rounds: u32) -> WorkloadDriver<MemoryCluster> {
        WorkloadDriver::<MemoryCluster>::builder()
            .connector(cluster.clone())
            .workers(workers)
            .rounds(rounds)
            .round_pause(std::time::Duration::ZERO)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_round_without_connect_is_missing_connection() {
        let cluster = MemoryCluster::new();
        let driver = driver(&cluster, 2, 1);

        let err = driver.run_round(0).await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::MissingConnection {
                target: Target::Primary,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_barrier_failure_aborts_round() {
        let cluster = MemoryCluster::without_table();
        let mut driver = driver(&cluster, 2, 1);

        let err = driver.run().await.unwrap_err();
        match err {
            HarnessError::Transaction { step, worker, .. } => {
                assert_eq!(step, WorkerStep::Barrier);
                assert_eq!(worker, WorkerId::FIRST);
            }
            other => panic!("expected barrier failure, got {other:?}"),
        }
        assert!(cluster.journal().iter().all(|op| !op.is_insert()));
    }

    #[tokio::test]
    async fn test_run_round_returns_markers_in_worker_order() {
        let cluster = MemoryCluster::new();
        let mut driver = driver(&cluster, 3, 1);
        driver.connect().await.unwrap();

        let markers = driver.run_round(0).await.unwrap();
        let workers: Vec<u32> = markers.iter().map(|m| m.worker.get()).collect();
        assert_eq!(workers, vec![1, 2, 3]);
        assert_eq!(driver.harness().oracle().success_count(), 9);
    }

    #[tokio::test]
    async fn test_direct_mode_opens_primary_only() {
        let cluster = MemoryCluster::new();
        let mut driver = WorkloadDriver::<MemoryCluster>::builder()
            .connector(cluster.clone())
            .workers(4)
            .rounds(1)
            .verify_mode(VerifyMode::Direct)
            .build()
            .unwrap();

        driver.connect().await.unwrap();
        assert_eq!(cluster.connects(), 4);
        assert_eq!(driver.harness().pool().count(Target::Secondary1), 0);
    }

    #[tokio::test]
    async fn test_rerun_reports_only_its_own_reads() {
        let cluster = MemoryCluster::new();
        let mut driver = driver(&cluster, 1, 1);

        let first = driver.run().await.unwrap();
        let second = driver.run().await.unwrap();

        assert_eq!(first.success, 3);
        assert_eq!(second.success, 3);
        assert_eq!(second.workers, 1);
        assert_eq!(second.rounds, 1);
        assert_eq!(cluster.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_everything() {
        let cluster = MemoryCluster::new();
        let mut driver = driver(&cluster, 2, 1);
        driver.connect().await.unwrap();
        assert_eq!(cluster.open_sessions(), 6);

        driver.close().await;
        assert_eq!(cluster.open_sessions(), 0);
        assert!(driver.harness().pool().is_empty());
    }
}
