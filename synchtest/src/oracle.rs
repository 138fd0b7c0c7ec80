//! Consistency oracle: match/mismatch accounting.
//!
//! Every verification read is folded into exactly one counter: the global
//! success counter when the observed value equals the marker, or the failure
//! tally of the target that served it otherwise. Nothing is deduplicated or
//! retried. Counters only grow.

use std::cell::Cell;
use std::fmt;
use std::time::Duration;

use crate::config::{Target, VerifyMode, WorkerId};
use crate::store::StoreError;

/// Value a worker wrote in one round and expects to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Writing worker.
    pub worker: WorkerId,
    /// Round index, starting at 0.
    pub round: u32,
    /// Written value: Unix seconds at write time.
    pub value: i64,
}

/// What one target returned for a worker's marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadResult {
    /// Reading worker.
    pub worker: WorkerId,
    /// Round index, starting at 0.
    pub round: u32,
    /// Target that served the read.
    pub target: Target,
    /// Observed value; `None` when no row was visible.
    pub observed: Option<i64>,
}

/// Outcome of comparing a read against its marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The target returned the marker.
    Match,
    /// The target returned something else, or nothing.
    Mismatch,
}

impl Verdict {
    /// Compare an observation with the expected marker value.
    pub fn judge(expected: i64, observed: Option<i64>) -> Self {
        match observed {
            Some(value) if value == expected => Verdict::Match,
            _ => Verdict::Mismatch,
        }
    }
}

/// Per-target counters.
#[derive(Debug, Default)]
struct TargetTally {
    successes: Cell<u64>,
    failures: Cell<u64>,
}

fn bump(counter: &Cell<u64>) {
    counter.set(counter.get() + 1);
}

/// Aggregates read outcomes for a whole run.
///
/// Interior mutability through `Cell`: all workers run on one thread and
/// only touch the oracle between suspension points.
#[derive(Debug, Default)]
pub struct ConsistencyOracle {
    success: Cell<u64>,
    tallies: [TargetTally; 3],
}

impl ConsistencyOracle {
    /// Fresh oracle with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one read into the counters.
    ///
    /// A mismatch is logged straight away with worker, expected and observed
    /// values and the target.
    pub fn record(&self, marker: &Marker, read: &ReadResult) -> Verdict {
        let tally = &self.tallies[read.target.index()];
        let verdict = Verdict::judge(marker.value, read.observed);

        match verdict {
            Verdict::Match => {
                bump(&self.success);
                bump(&tally.successes);
            }
            Verdict::Mismatch => {
                bump(&tally.failures);
                tracing::warn!(
                    worker = %read.worker,
                    round = read.round,
                    expected = marker.value,
                    observed = ?read.observed,
                    target = %read.target,
                    "select mismatch"
                );
            }
        }
        verdict
    }

    /// Count a read that failed outright as a mismatch on its target.
    pub fn record_read_error(
        &self,
        marker: &Marker,
        target: Target,
        error: &StoreError,
    ) -> Verdict {
        bump(&self.tallies[target.index()].failures);
        tracing::warn!(
            worker = %marker.worker,
            round = marker.round,
            expected = marker.value,
            %target,
            %error,
            "select failed, counted as mismatch"
        );
        Verdict::Mismatch
    }

    /// Global number of matching reads.
    pub fn success_count(&self) -> u64 {
        self.success.get()
    }

    /// Matching reads served by one target.
    pub fn success_count_for(&self, target: Target) -> u64 {
        self.tallies[target.index()].successes.get()
    }

    /// Mismatching reads attributed to one target.
    pub fn failure_count(&self, target: Target) -> u64 {
        self.tallies[target.index()].failures.get()
    }

    /// Mismatches across all targets.
    pub fn total_failures(&self) -> u64 {
        Target::ALL.iter().map(|t| self.failure_count(*t)).sum()
    }

    /// Snapshot the counters into a report.
    pub fn report(
        &self,
        workers: u32,
        rounds: u32,
        verify_mode: VerifyMode,
        elapsed: Duration,
    ) -> ConsistencyReport {
        let per_target = Target::ALL.map(|target| TargetCounts {
            target,
            successes: self.success_count_for(target),
            failures: self.failure_count(target),
        });
        ConsistencyReport {
            workers,
            rounds,
            verify_mode,
            elapsed,
            success: self.success_count(),
            per_target,
        }
    }
}

/// Counters for one target in a [`ConsistencyReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCounts {
    /// Target.
    pub target: Target,
    /// Matching reads.
    pub successes: u64,
    /// Mismatching reads.
    pub failures: u64,
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyReport {
    /// Workers per round.
    pub workers: u32,
    /// Rounds executed.
    pub rounds: u32,
    /// Verification mode used.
    pub verify_mode: VerifyMode,
    /// Wall time of the whole run.
    pub elapsed: Duration,
    /// Global success counter.
    pub success: u64,
    /// Counters per target, primary first.
    pub per_target: [TargetCounts; 3],
}

impl ConsistencyReport {
    /// Counters for one target.
    pub fn target(&self, target: Target) -> &TargetCounts {
        &self.per_target[target.index()]
    }

    /// Mismatches across all targets.
    pub fn total_failures(&self) -> u64 {
        self.per_target.iter().map(|c| c.failures).sum()
    }

    /// Whether every verified read matched.
    pub fn is_consistent(&self) -> bool {
        self.total_failures() == 0
    }

    /// One-line summary: `success: N failures sec1: a sec2: b leader: c`.
    pub fn summary_line(&self) -> String {
        let failures = Target::FAN_OUT
            .iter()
            .map(|target| format!("{}: {}", target.short_label(), self.target(*target).failures))
            .collect::<Vec<_>>()
            .join(" ");
        format!("success: {} failures {}", self.success, failures)
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Consistency Report ===")?;
        writeln!(f, "Workers: {}", self.workers)?;
        writeln!(f, "Rounds: {}", self.rounds)?;
        writeln!(f, "Verify mode: {}", self.verify_mode)?;
        writeln!(f, "Wall time: {:?}", self.elapsed)?;
        writeln!(f)?;
        for counts in self
            .verify_mode
            .targets()
            .iter()
            .map(|target| self.target(*target))
        {
            writeln!(
                f,
                "{:<11} success: {:>6} failed: {:>6}",
                counts.target.name(),
                counts.successes,
                counts.failures
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{}", self.summary_line())
    }
}
