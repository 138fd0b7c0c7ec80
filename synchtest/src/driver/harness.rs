//! Run context shared by the driver and its worker tasks.

use crate::config::HarnessConfig;
use crate::oracle::ConsistencyOracle;
use crate::pool::ConnectionPool;
use crate::store::Connector;

/// Everything a run mutates, in one place.
///
/// Worker tasks borrow the harness immutably: the pool hands out shared
/// references to per-worker sessions and the oracle counts through `Cell`s.
/// Only the driver, between rounds, takes it mutably.
pub struct Harness<C: Connector> {
    config: HarnessConfig,
    pool: ConnectionPool<C>,
    oracle: ConsistencyOracle,
}

impl<C: Connector> Harness<C> {
    /// Create a harness with an empty pool and zeroed counters.
    pub fn new(connector: C, config: HarnessConfig) -> Self {
        let pool = ConnectionPool::new(
            connector,
            config.cluster.clone(),
            config.durability.clone(),
        );
        Self {
            config,
            pool,
            oracle: ConsistencyOracle::new(),
        }
    }

    /// Run configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Connection pool.
    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Connection pool, for connect and teardown.
    pub fn pool_mut(&mut self) -> &mut ConnectionPool<C> {
        &mut self.pool
    }

    /// Match/mismatch counters.
    pub fn oracle(&self) -> &ConsistencyOracle {
        &self.oracle
    }

    /// Zero every counter so the next report covers a single run.
    pub fn reset_oracle(&mut self) {
        self.oracle = ConsistencyOracle::new();
    }
}
