//! Per-target, per-worker connection pool.
//!
//! Holds exactly one session per `(target, worker)` pair. Sessions are opened
//! on first demand, live for the whole run and are only released by
//! [`ConnectionPool::close_all`]. No session is ever shared between workers.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::{ClusterConfig, DurabilityMode, Target, WorkerId};
use crate::error::HarnessError;
use crate::sql;
use crate::store::{Connector, Session};

/// Connection pool keyed by `(target, worker)`.
pub struct ConnectionPool<C: Connector> {
    connector: C,
    cluster: ClusterConfig,
    durability: Option<DurabilityMode>,
    sessions: BTreeMap<(Target, WorkerId), C::Session>,
}

impl<C: Connector> ConnectionPool<C> {
    /// Create an empty pool.
    ///
    /// When `durability` is set, every new session gets a session-scoped
    /// `synchronous_commit` directive before it is stored.
    pub fn new(connector: C, cluster: ClusterConfig, durability: Option<DurabilityMode>) -> Self {
        Self {
            connector,
            cluster,
            durability,
            sessions: BTreeMap::new(),
        }
    }

    /// Get or open the session for `(target, worker)`.
    ///
    /// Idempotent: an existing session is returned untouched.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Connection`] if the connect or the session directive
    /// fails. The failed session is not stored.
    pub async fn connect(
        &mut self,
        worker: WorkerId,
        target: Target,
    ) -> Result<&C::Session, HarnessError> {
        let key = (target, worker);
        if !self.sessions.contains_key(&key) {
            let session = self.open(worker, target).await?;
            self.sessions.insert(key, session);
        }
        self.session(target, worker)
    }

    async fn open(&self, worker: WorkerId, target: Target) -> Result<C::Session, HarnessError> {
        let connection_error = |source| HarnessError::Connection {
            target,
            worker,
            source,
        };

        let endpoint = self.cluster.endpoint(target);
        let session = self
            .connector
            .connect(target, worker, endpoint)
            .await
            .map_err(connection_error)?;

        if let Some(mode) = &self.durability {
            session
                .execute(&sql::set_session_durability(mode))
                .await
                .map_err(connection_error)?;
        }

        Ok(session)
    }

    /// Connect workers `1..=workers` one at a time.
    ///
    /// Each worker gets its primary session and, when `include_secondaries`
    /// is set, one session per replica. Connecting sequentially keeps the
    /// connection burst against the cluster bounded.
    ///
    /// # Errors
    ///
    /// The first connect failure aborts the whole mesh.
    pub async fn connect_all(
        &mut self,
        workers: u32,
        include_secondaries: bool,
    ) -> Result<(), HarnessError> {
        let start = Instant::now();

        for worker in WorkerId::range(workers) {
            self.connect(worker, Target::Primary).await?;
            if include_secondaries {
                for target in Target::SECONDARIES {
                    self.connect(worker, target).await?;
                }
            }
        }

        tracing::info!(
            workers,
            connections = self.sessions.len(),
            elapsed = ?start.elapsed(),
            "connections created"
        );
        Ok(())
    }

    /// Borrow an already-open session.
    pub fn session(&self, target: Target, worker: WorkerId) -> Result<&C::Session, HarnessError> {
        self.sessions
            .get(&(target, worker))
            .ok_or(HarnessError::MissingConnection { target, worker })
    }

    /// Whether a session exists for `(target, worker)`.
    pub fn contains(&self, target: Target, worker: WorkerId) -> bool {
        self.sessions.contains_key(&(target, worker))
    }

    /// Number of open sessions for a target.
    pub fn count(&self, target: Target) -> usize {
        self.sessions.keys().filter(|(t, _)| *t == target).count()
    }

    /// Total number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the pool holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session for `target` and forget it.
    ///
    /// Targets with no sessions are a no-op. Close failures are logged and do
    /// not stop the teardown. Returns the number of sessions released.
    pub async fn close_all(&mut self, target: Target) -> usize {
        let workers: Vec<WorkerId> = self
            .sessions
            .keys()
            .filter(|(t, _)| *t == target)
            .map(|(_, worker)| *worker)
            .collect();

        let mut released = 0;
        for worker in workers {
            let Some(session) = self.sessions.remove(&(target, worker)) else {
                continue;
            };
            released += 1;
            if let Err(e) = session.close().await {
                tracing::warn!(%target, %worker, error = %e, "close failed");
            }
        }

        tracing::debug!(%target, released, "closed connections");
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCluster;

    fn pool(cluster: &MemoryCluster, durability: Option<&str>) -> ConnectionPool<MemoryCluster> {
        ConnectionPool::new(
            cluster.clone(),
            ClusterConfig::default(),
            durability.map(DurabilityMode::new),
        )
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let cluster = MemoryCluster::new();
        let mut pool = pool(&cluster, None);

        pool.connect(WorkerId::new(1), Target::Primary).await.unwrap();
        pool.connect(WorkerId::new(1), Target::Primary).await.unwrap();

        assert_eq!(cluster.connects(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_connect_all_with_secondaries() {
        let cluster = MemoryCluster::new();
        let mut pool = pool(&cluster, None);

        pool.connect_all(4, true).await.unwrap();

        assert_eq!(pool.len(), 12);
        for target in Target::ALL {
            assert_eq!(pool.count(target), 4);
        }
        assert!(pool.contains(Target::Secondary2, WorkerId::new(4)));
        assert!(!pool.contains(Target::Secondary2, WorkerId::new(5)));
    }

    #[tokio::test]
    async fn test_connect_all_primary_only() {
        let cluster = MemoryCluster::new();
        let mut pool = pool(&cluster, None);

        pool.connect_all(3, false).await.unwrap();

        assert_eq!(pool.count(Target::Primary), 3);
        assert_eq!(pool.count(Target::Secondary1), 0);
        assert!(matches!(
            pool.session(Target::Secondary1, WorkerId::new(1)),
            Err(HarnessError::MissingConnection { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_directive_applied_once_per_connection() {
        let cluster = MemoryCluster::new();
        let mut pool = pool(&cluster, Some("remote_apply"));

        pool.connect_all(2, true).await.unwrap();
        pool.connect(WorkerId::new(1), Target::Primary).await.unwrap();

        let directives = cluster.directives();
        assert_eq!(directives.len(), 6);
        assert!(directives
            .iter()
            .all(|op| op.statement == "set session synchronous_commit to remote_apply"));
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal() {
        let cluster = MemoryCluster::new();
        cluster.refuse_connections(Target::Secondary2);
        let mut pool = pool(&cluster, None);

        let err = pool.connect_all(3, true).await.unwrap_err();
        match err {
            HarnessError::Connection { target, worker, .. } => {
                assert_eq!(target, Target::Secondary2);
                assert_eq!(worker, WorkerId::new(1));
            }
            other => panic!("expected connection error, got {other:?}"),
        }
        assert!(!pool.contains(Target::Secondary2, WorkerId::new(1)));
        assert_eq!(pool.count(Target::Primary), 1);
    }

    #[tokio::test]
    async fn test_close_all_releases_target() {
        let cluster = MemoryCluster::new();
        let mut pool = pool(&cluster, None);
        pool.connect_all(3, true).await.unwrap();

        assert_eq!(pool.close_all(Target::Primary).await, 3);
        assert_eq!(pool.count(Target::Primary), 0);
        assert_eq!(pool.count(Target::Secondary1), 3);
        assert_eq!(cluster.closed_sessions(), 3);

        // Already released: nothing left to close.
        assert_eq!(pool.close_all(Target::Primary).await, 0);
    }
}
