//! # synchtest
//!
//! Replication durability verification for primary/replica SQL clusters.
//!
//! The harness writes a marker row per worker on the primary inside a
//! transaction, then reads it back from every target straight after the
//! commit. With a durability mode such as `synchronous_commit = remote_apply`
//! every read must observe the marker. Anything else is a mismatch and is
//! attributed to the target that served the stale read.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    WorkloadDriver                           │
//! │   round barrier (DELETE) → worker fan-out → pacing → report │
//! ├──────────────────────────┬──────────────────────────────────┤
//! │  WorkerTask              │       ConsistencyOracle          │
//! │  BEGIN → INSERT → COMMIT │       success / per-target       │
//! │  → VERIFY (direct|fanout)│       failure tallies            │
//! ├──────────────────────────┴──────────────────────────────────┤
//! │                    ConnectionPool                           │
//! │  one session per (target, worker), lazy, torn down at end   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  store: Connector / Session traits                          │
//! │  PostgresConnector (tokio-postgres) | MemoryCluster (tests)  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on a single thread. Worker tasks are plain futures joined
//! together, so "parallel" means overlapping I/O, never shared-memory races.
//!
//! ## Quick Start
//!
//! ```ignore
//! use synchtest::{DriverBuilder, HarnessConfig, PostgresConnector};
//!
//! let report = DriverBuilder::new()
//!     .connector(PostgresConnector::new())
//!     .config(HarnessConfig::default())
//!     .build()?
//!     .run()
//!     .await?;
//! println!("{report}");
//! ```

#![deny(missing_docs)]

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod oracle;
pub mod pool;
pub mod sql;
pub mod store;
pub mod worker;

pub use bootstrap::create_table;
pub use config::{
    ClusterConfig, DurabilityMode, Endpoint, HarnessConfig, ReadErrorPolicy, Target, VerifyMode,
    WorkerId,
};
pub use driver::{DriverBuilder, Harness, WorkloadDriver};
pub use error::{HarnessError, WorkerStep};
pub use oracle::{ConsistencyOracle, ConsistencyReport, Marker, ReadResult, Verdict};
pub use pool::ConnectionPool;
pub use store::{Connector, MemoryCluster, PostgresConnector, Row, Session, StoreError};
pub use worker::WorkerTask;
