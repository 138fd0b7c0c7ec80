//! Driver trait abstraction.

use async_trait::async_trait;

use crate::config::{Endpoint, Target, WorkerId};
use crate::store::error::StoreError;
use crate::store::row::Row;

/// Opens sessions to cluster members.
///
/// The target and worker are passed along so drivers can tag their own
/// logging; they carry no routing meaning.
#[async_trait(?Send)]
pub trait Connector {
    /// Session type produced by this connector.
    type Session: Session;

    /// Open a new session to `endpoint`.
    ///
    /// # Returns
    ///
    /// - `Ok(session)`: connected and ready for statements
    /// - `Err(StoreError)`: the endpoint could not be reached or refused us
    async fn connect(
        &self,
        target: Target,
        worker: WorkerId,
        endpoint: &Endpoint,
    ) -> Result<Self::Session, StoreError>;
}

/// A single live connection.
///
/// Sessions are never shared between workers, so statements on one session
/// are strictly sequential.
#[async_trait(?Send)]
pub trait Session {
    /// Run a statement that returns no rows.
    ///
    /// # Returns
    ///
    /// Number of rows affected, `0` for utility statements.
    async fn execute(&self, statement: &str) -> Result<u64, StoreError>;

    /// Run a statement and collect its rows.
    async fn query(&self, statement: &str) -> Result<Vec<Row>, StoreError>;

    /// Close the session gracefully.
    async fn close(self) -> Result<(), StoreError>
    where
        Self: Sized;
}
