//! PostgreSQL driver over `tokio-postgres`.
//!
//! Statements go through the simple query protocol: the harness only ever
//! sends literal SQL text and reads text values back.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::config::{Endpoint, Target, WorkerId};
use crate::store::error::StoreError;
use crate::store::row::Row;
use crate::store::traits::{Connector, Session};

/// Application name reported to the server, visible in `pg_stat_activity`.
const APPLICATION_NAME: &str = "synchtest";

/// Connector for PostgreSQL endpoints, plaintext only.
///
/// Must be used from inside a [`tokio::task::LocalSet`]: each session's
/// connection future is driven by a local task.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }

    fn config(endpoint: &Endpoint) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&endpoint.host)
            .port(endpoint.port)
            .user(&endpoint.user)
            .password(&endpoint.password)
            .dbname(&endpoint.database)
            .application_name(APPLICATION_NAME);
        config
    }
}

#[async_trait(?Send)]
impl Connector for PostgresConnector {
    type Session = PostgresSession;

    async fn connect(
        &self,
        target: Target,
        worker: WorkerId,
        endpoint: &Endpoint,
    ) -> Result<PostgresSession, StoreError> {
        let (client, connection) = Self::config(endpoint).connect(NoTls).await?;

        // Lifecycle observer: end and error notifications are advisory only.
        let connection = tokio::task::spawn_local(async move {
            match connection.await {
                Ok(()) => tracing::debug!(%target, %worker, "connection ended"),
                Err(e) => tracing::warn!(%target, %worker, error = %e, "connection error"),
            }
        });

        tracing::debug!(
            %target,
            %worker,
            host = %endpoint.host,
            port = endpoint.port,
            "connected"
        );

        Ok(PostgresSession { client, connection })
    }
}

/// A live PostgreSQL session.
pub struct PostgresSession {
    client: Client,
    connection: JoinHandle<()>,
}

#[async_trait(?Send)]
impl Session for PostgresSession {
    async fn execute(&self, statement: &str) -> Result<u64, StoreError> {
        let messages = self.client.simple_query(statement).await?;
        let affected = messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::CommandComplete(rows) => Some(*rows),
                _ => None,
            })
            .sum();
        Ok(affected)
    }

    async fn query(&self, statement: &str) -> Result<Vec<Row>, StoreError> {
        let messages = self.client.simple_query(statement).await?;
        let rows = messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    row.columns()
                        .iter()
                        .enumerate()
                        .map(|(idx, column)| {
                            (column.name().to_string(), row.get(idx).map(str::to_string))
                        })
                        .collect::<Vec<_>>(),
                ),
                _ => None,
            })
            .map(Row::new)
            .collect();
        Ok(rows)
    }

    async fn close(self) -> Result<(), StoreError> {
        if self.client.is_closed() {
            return Err(StoreError::Closed);
        }
        // Dropping the last client handle sends Terminate; the connection
        // task then runs to completion.
        drop(self.client);
        self.connection
            .await
            .map_err(|e| StoreError::Query(format!("connection task failed: {e}")))
    }
}
