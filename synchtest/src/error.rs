//! Error types for the verification harness.
//!
//! Every variant of [`HarnessError`] is fatal to the run. A replica that
//! serves a stale or missing marker is not an error: it is the signal the
//! harness exists to produce and goes to the [`crate::oracle`] instead.

use std::fmt;

use thiserror::Error;

use crate::config::{Target, WorkerId};
use crate::store::StoreError;

/// Step of the per-worker write/verify protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStep {
    /// Full-table delete issued by the driver before a round starts.
    Barrier,
    /// Transaction start, including the optional local durability override.
    Begin,
    /// Marker insert.
    Insert,
    /// Transaction commit.
    Commit,
}

impl fmt::Display for WorkerStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerStep::Barrier => "BARRIER",
            WorkerStep::Begin => "BEGIN",
            WorkerStep::Insert => "INSERT",
            WorkerStep::Commit => "COMMIT",
        };
        f.write_str(name)
    }
}

/// Errors that abort a harness run.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Opening a session, or applying its session directive, failed.
    #[error("connection to {target} for worker {worker} failed: {source}")]
    Connection {
        /// Target the session belongs to.
        target: Target,
        /// Worker owning the session.
        worker: WorkerId,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A transactional step on the primary failed.
    #[error("{step} failed for worker {worker} in round {round}: {source}")]
    Transaction {
        /// Worker owning the session.
        worker: WorkerId,
        /// Round index, starting at 0.
        round: u32,
        /// Step that failed.
        step: WorkerStep,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A verification read failed and the read-error policy is fatal.
    #[error("verification read on {target} failed for worker {worker} in round {round}: {source}")]
    VerificationRead {
        /// Worker owning the session.
        worker: WorkerId,
        /// Round index, starting at 0.
        round: u32,
        /// Target the session belongs to.
        target: Target,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },

    /// A worker asked for a session that was never opened.
    #[error("no {target} connection for worker {worker}")]
    MissingConnection {
        /// Target that was requested.
        target: Target,
        /// Worker that requested it.
        worker: WorkerId,
    },

    /// Invalid run configuration, detected before any worker starts.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Creating the test table failed.
    #[error("bootstrap failed: {0}")]
    Bootstrap(#[source] StoreError),
}

impl HarnessError {
    /// The worker this error belongs to, if any.
    pub fn worker(&self) -> Option<WorkerId> {
        match self {
            HarnessError::Connection { worker, .. }
            | HarnessError::Transaction { worker, .. }
            | HarnessError::VerificationRead { worker, .. }
            | HarnessError::MissingConnection { worker, .. } => Some(*worker),
            HarnessError::Configuration(_) | HarnessError::Bootstrap(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_display_matches_protocol_names() {
        assert_eq!(WorkerStep::Begin.to_string(), "BEGIN");
        assert_eq!(WorkerStep::Commit.to_string(), "COMMIT");
        assert_eq!(WorkerStep::Barrier.to_string(), "BARRIER");
    }

    #[test]
    fn test_transaction_error_message() {
        let err = HarnessError::Transaction {
            worker: WorkerId::new(4),
            round: 2,
            step: WorkerStep::Insert,
            source: StoreError::Query("relation \"synchtest\" does not exist".into()),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("INSERT failed for worker 4 in round 2"));
        assert_eq!(err.worker(), Some(WorkerId::new(4)));
    }

    #[test]
    fn test_configuration_error_has_no_worker() {
        let err = HarnessError::Configuration("workers must be at least 1".into());
        assert_eq!(err.worker(), None);
        assert_eq!(
            err.to_string(),
            "invalid configuration: workers must be at least 1"
        );
    }
}
