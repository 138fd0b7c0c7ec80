//! Workload driver builder.

use std::time::Duration;

use crate::config::{DurabilityMode, HarnessConfig, ReadErrorPolicy, VerifyMode};
use crate::driver::WorkloadDriver;
use crate::error::HarnessError;
use crate::store::Connector;

/// Builder for [`WorkloadDriver`] with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use synchtest::{DriverBuilder, MemoryCluster, VerifyMode};
///
/// let driver = DriverBuilder::new()
///     .connector(MemoryCluster::new())
///     .workers(3)
///     .rounds(1)
///     .verify_mode(VerifyMode::FanOut)
///     .durability("remote_apply")
///     .build()?;
/// ```
pub struct DriverBuilder<C: Connector> {
    connector: Option<C>,
    config: HarnessConfig,
}

impl<C: Connector> DriverBuilder<C> {
    /// Create a builder with the default configuration and no connector.
    pub fn new() -> Self {
        Self {
            connector: None,
            config: HarnessConfig::default(),
        }
    }

    /// Set the store connector (required).
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the whole configuration.
    ///
    /// Later calls to the field setters below still apply on top of it.
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Number of concurrent workers per round.
    pub fn workers(mut self, workers: u32) -> Self {
        self.config.workers = workers;
        self
    }

    /// Number of rounds.
    pub fn rounds(mut self, rounds: u32) -> Self {
        self.config.rounds = rounds;
        self
    }

    /// Verification mode.
    pub fn verify_mode(mut self, mode: VerifyMode) -> Self {
        self.config.verify_mode = mode;
        self
    }

    /// `synchronous_commit` override for sessions and transactions.
    pub fn durability(mut self, mode: impl Into<String>) -> Self {
        self.config.durability = Some(DurabilityMode::new(mode));
        self
    }

    /// Pause between rounds.
    pub fn round_pause(mut self, pause: Duration) -> Self {
        self.config.round_pause = pause;
        self
    }

    /// Handling of failed verification reads.
    pub fn read_errors(mut self, policy: ReadErrorPolicy) -> Self {
        self.config.read_errors = policy;
        self
    }

    /// Build the driver.
    ///
    /// # Errors
    ///
    /// [`HarnessError::Configuration`] if the connector is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<WorkloadDriver<C>, HarnessError> {
        let connector = self
            .connector
            .ok_or_else(|| HarnessError::Configuration("connector is required".to_string()))?;
        WorkloadDriver::new(connector, self.config)
    }
}

impl<C: Connector> Default for DriverBuilder<C> {
    fn default() -> Self {
        Self::new()
    }
}
