//! SQL text issued by the harness.
//!
//! Statements are literal text sent over the simple query protocol, so all
//! values are integers formatted in place.

use crate::config::{DurabilityMode, WorkerId};

/// Name of the marker table.
pub const TABLE: &str = "synchtest";

/// Drop the marker table.
pub const DROP_TABLE: &str = "drop table if exists synchtest";

/// Create the marker table.
pub const CREATE_TABLE: &str = "create table if not exists synchtest (id int, value int)";

/// Round barrier: remove every marker from the previous round.
pub const DELETE_ALL: &str = "delete from synchtest";

/// Open a transaction.
pub const BEGIN: &str = "begin";

/// Commit the open transaction.
pub const COMMIT: &str = "commit";

/// Name of the column holding the marker.
pub const VALUE_COLUMN: &str = "value";

/// Session-scoped durability directive, applied once per connection.
pub fn set_session_durability(mode: &DurabilityMode) -> String {
    format!("set session synchronous_commit to {mode}")
}

/// Transaction-scoped durability directive, applied after `BEGIN`.
pub fn set_local_durability(mode: &DurabilityMode) -> String {
    format!("set local synchronous_commit to {mode}")
}

/// Insert the marker row for a worker.
pub fn insert_marker(worker: WorkerId, marker: i64) -> String {
    format!("insert into synchtest (id, value) values ({worker}, {marker})")
}

/// Read back the marker row for a worker.
pub fn select_marker(worker: WorkerId) -> String {
    format!("select value from synchtest where id={worker}")
}
