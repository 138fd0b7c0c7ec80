//! Per-worker write-then-verify task.
//!
//! One task per `(worker, round)`:
//!
//! ```text
//! BEGIN → INSERT → COMMIT → VERIFY → DONE
//!    \        \        \        \
//!     └────────┴────────┴────────┴──→ FAILED (fatal HarnessError)
//! ```
//!
//! The write goes through the worker's own primary session. Verification
//! either reads the primary once (direct mode) or reads both replicas and the
//! primary concurrently (fan-out mode). Each read is judged on its own and
//! any mismatch is pinned on the target that served it.

use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::join_all;

use crate::config::{ReadErrorPolicy, Target, WorkerId};
use crate::driver::Harness;
use crate::error::{HarnessError, WorkerStep};
use crate::oracle::{Marker, ReadResult, Verdict};
use crate::sql;
use crate::store::{Connector, Row, Session, StoreError};

/// Current wall-clock time truncated to whole seconds.
pub fn unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// Decode the observed marker from a read's rows. No rows means absent.
fn observed_value(rows: &[Row]) -> Result<Option<i64>, StoreError> {
    match rows.first() {
        Some(row) => row.get_i64(sql::VALUE_COLUMN),
        None => Ok(None),
    }
}

/// Write/verify cycle for one worker in one round.
pub struct WorkerTask<'a, C: Connector> {
    harness: &'a Harness<C>,
    worker: WorkerId,
    round: u32,
}

impl<'a, C: Connector> WorkerTask<'a, C> {
    /// Create the task. Nothing runs until [`WorkerTask::run`].
    pub fn new(harness: &'a Harness<C>, worker: WorkerId, round: u32) -> Self {
        Self {
            harness,
            worker,
            round,
        }
    }

    /// Run every step in order and return the marker that was written.
    pub async fn run(self) -> Result<Marker, HarnessError> {
        let marker = self.write().await?;
        self.verify(&marker).await?;
        tracing::debug!(worker = %self.worker, round = self.round, "done");
        Ok(marker)
    }

    fn step_failed(&self, step: WorkerStep) -> impl FnOnce(StoreError) -> HarnessError {
        let (worker, round) = (self.worker, self.round);
        move |source| HarnessError::Transaction {
            worker,
            round,
            step,
            source,
        }
    }

    /// BEGIN, INSERT and COMMIT on the worker's primary session.
    ///
    /// The marker value is captured before the transaction opens and is the
    /// value every verification read must return.
    pub async fn write(&self) -> Result<Marker, HarnessError> {
        let primary = self.harness.pool().session(Target::Primary, self.worker)?;
        let marker = Marker {
            worker: self.worker,
            round: self.round,
            value: unix_seconds(),
        };

        primary
            .execute(sql::BEGIN)
            .await
            .map_err(self.step_failed(WorkerStep::Begin))?;
        if let Some(mode) = &self.harness.config().durability {
            primary
                .execute(&sql::set_local_durability(mode))
                .await
                .map_err(self.step_failed(WorkerStep::Begin))?;
        }

        primary
            .execute(&sql::insert_marker(self.worker, marker.value))
            .await
            .map_err(self.step_failed(WorkerStep::Insert))?;

        primary
            .execute(sql::COMMIT)
            .await
            .map_err(self.step_failed(WorkerStep::Commit))?;

        tracing::debug!(
            worker = %self.worker,
            round = self.round,
            marker = marker.value,
            "committed"
        );
        Ok(marker)
    }

    /// Read the marker back from every target of the verify mode.
    ///
    /// All reads are issued together and awaited as a group, so every read is
    /// in flight before the first one resolves. Returns one verdict per
    /// target, in issue order.
    pub async fn verify(&self, marker: &Marker) -> Result<Vec<Verdict>, HarnessError> {
        let config = self.harness.config();
        let targets = config.verify_mode.targets();

        let sessions = targets
            .iter()
            .map(|target| self.harness.pool().session(*target, self.worker))
            .collect::<Result<Vec<_>, _>>()?;

        let statement = sql::select_marker(self.worker);
        let statement = statement.as_str();
        let reads = join_all(sessions.iter().map(|session| async move {
            session
                .query(statement)
                .await
                .and_then(|rows| observed_value(&rows))
        }))
        .await;

        let mut outcomes = Vec::with_capacity(targets.len());
        for (target, result) in targets.iter().copied().zip(reads) {
            match result {
                Err(source) if config.read_errors == ReadErrorPolicy::Fatal => {
                    return Err(HarnessError::VerificationRead {
                        worker: self.worker,
                        round: self.round,
                        target,
                        source,
                    });
                }
                result => outcomes.push((target, result)),
            }
        }

        let oracle = self.harness.oracle();
        let verdicts = outcomes
            .into_iter()
            .map(|(target, result)| match result {
                Ok(observed) => oracle.record(
                    marker,
                    &ReadResult {
                        worker: self.worker,
                        round: self.round,
                        target,
                        observed,
                    },
                ),
                Err(error) => oracle.record_read_error(marker, target, &error),
            })
            .collect();

        Ok(verdicts)
    }
}
