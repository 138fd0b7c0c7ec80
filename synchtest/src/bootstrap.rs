//! Test table bootstrap.

use crate::config::{ClusterConfig, Target, WorkerId};
use crate::error::HarnessError;
use crate::sql;
use crate::store::{Connector, Session};

/// Drop and recreate the marker table on the primary.
///
/// Idempotent: running it twice leaves the same empty table. Replicas pick
/// the table up through replication.
pub async fn create_table<C: Connector>(
    connector: &C,
    cluster: &ClusterConfig,
) -> Result<(), HarnessError> {
    let session = connector
        .connect(
            Target::Primary,
            WorkerId::FIRST,
            cluster.endpoint(Target::Primary),
        )
        .await
        .map_err(|source| HarnessError::Connection {
            target: Target::Primary,
            worker: WorkerId::FIRST,
            source,
        })?;

    session
        .execute(sql::DROP_TABLE)
        .await
        .map_err(HarnessError::Bootstrap)?;
    session
        .execute(sql::CREATE_TABLE)
        .await
        .map_err(HarnessError::Bootstrap)?;

    tracing::info!(table = sql::TABLE, "created the table");

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "close after bootstrap failed");
    }
    Ok(())
}
