//! Store driver abstraction.
//!
//! The harness never speaks a wire protocol itself. It needs four things from
//! a driver:
//!
//! - **Connector**: open a session to a target endpoint
//! - **Session**: run literal SQL, return rows, close gracefully
//! - **Row**: ordered column/value pairs
//! - **StoreError**: whatever went wrong underneath
//!
//! [`PostgresConnector`] is the production driver. [`MemoryCluster`] is an
//! in-process primary with two replicas used by the test suite.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod row;
pub mod traits;

// Re-exports
pub use error::StoreError;
pub use memory::{MemoryCluster, MemorySession, Operation};
pub use postgres::{PostgresConnector, PostgresSession};
pub use row::Row;
pub use traits::{Connector, Session};
