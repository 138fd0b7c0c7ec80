//! Cluster topology and run configuration.

use std::fmt;
use std::time::Duration;

use crate::error::HarnessError;

/// Default number of concurrent workers per round.
pub const DEFAULT_WORKERS: u32 = 30;

/// Default number of rounds.
pub const DEFAULT_ROUNDS: u32 = 5;

/// Default pause between rounds.
pub const DEFAULT_ROUND_PAUSE: Duration = Duration::from_millis(1);

/// A node of the cluster the harness talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Target {
    /// The writable leader.
    Primary,
    /// First streaming replica.
    Secondary1,
    /// Second streaming replica.
    Secondary2,
}

impl Target {
    /// All targets, primary first.
    pub const ALL: [Target; 3] = [Target::Primary, Target::Secondary1, Target::Secondary2];

    /// Replicas only.
    pub const SECONDARIES: [Target; 2] = [Target::Secondary1, Target::Secondary2];

    /// Order in which fan-out verification issues its reads.
    pub const FAN_OUT: [Target; 3] = [Target::Secondary1, Target::Secondary2, Target::Primary];

    /// Stable lowercase name, used in logs and error messages.
    pub fn name(self) -> &'static str {
        match self {
            Target::Primary => "primary",
            Target::Secondary1 => "secondary1",
            Target::Secondary2 => "secondary2",
        }
    }

    /// Short label used by the summary line.
    pub fn short_label(self) -> &'static str {
        match self {
            Target::Primary => "leader",
            Target::Secondary1 => "sec1",
            Target::Secondary2 => "sec2",
        }
    }

    /// Dense index into per-target arrays.
    pub(crate) fn index(self) -> usize {
        match self {
            Target::Primary => 0,
            Target::Secondary1 => 1,
            Target::Secondary2 => 2,
        }
    }

    /// Whether this target is a replica.
    pub fn is_secondary(self) -> bool {
        !matches!(self, Target::Primary)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 1-based worker identifier.
///
/// Also the `id` column value the worker writes its marker under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u32);

impl WorkerId {
    /// The worker whose primary connection carries the round barrier.
    pub const FIRST: WorkerId = WorkerId(1);

    /// Create a worker id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Raw id value.
    pub fn get(self) -> u32 {
        self.0
    }

    /// Worker ids `1..=count`.
    pub fn range(count: u32) -> impl Iterator<Item = WorkerId> {
        (1..=count).map(WorkerId)
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection details for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Login role.
    pub user: String,
    /// Login password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl Endpoint {
    /// Endpoint on `host` with the stock `postgres` credentials and port.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 5432,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
        }
    }
}

/// Endpoints of the three cluster members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    /// Leader endpoint.
    pub primary: Endpoint,
    /// First replica endpoint.
    pub secondary1: Endpoint,
    /// Second replica endpoint.
    pub secondary2: Endpoint,
}

impl ClusterConfig {
    /// Endpoint for a given target.
    pub fn endpoint(&self, target: Target) -> &Endpoint {
        match target {
            Target::Primary => &self.primary,
            Target::Secondary1 => &self.secondary1,
            Target::Secondary2 => &self.secondary2,
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            primary: Endpoint::new("patroni1"),
            secondary1: Endpoint::new("patroni2"),
            secondary2: Endpoint::new("patroni3"),
        }
    }
}

/// Value for the `synchronous_commit` directive, passed through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurabilityMode(String);

impl DurabilityMode {
    /// Wrap a mode string such as `on`, `remote_write` or `remote_apply`.
    pub fn new(mode: impl Into<String>) -> Self {
        Self(mode.into())
    }

    /// The raw mode string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a worker reads its marker back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    /// One read through the primary endpoint, trusting an external router
    /// to send it wherever it sends reads.
    Direct,
    /// Concurrent reads against both replicas and the primary.
    #[default]
    FanOut,
}

impl VerifyMode {
    /// Mode selected by the routed-reads flag.
    pub fn from_routed_reads(routed: bool) -> Self {
        if routed {
            VerifyMode::Direct
        } else {
            VerifyMode::FanOut
        }
    }

    /// Targets read during verification, in issue order.
    pub fn targets(self) -> &'static [Target] {
        match self {
            VerifyMode::Direct => &[Target::Primary],
            VerifyMode::FanOut => &Target::FAN_OUT,
        }
    }

    /// Whether replica connections are needed.
    pub fn needs_secondaries(self) -> bool {
        matches!(self, VerifyMode::FanOut)
    }
}

impl fmt::Display for VerifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifyMode::Direct => f.write_str("direct"),
            VerifyMode::FanOut => f.write_str("fan-out"),
        }
    }
}

/// What to do when a verification read itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReadErrorPolicy {
    /// Abort the run.
    #[default]
    Fatal,
    /// Record a mismatch against the target and keep going.
    Count,
}

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Cluster endpoints.
    pub cluster: ClusterConfig,
    /// Durability override; `None` keeps the server default.
    pub durability: Option<DurabilityMode>,
    /// Verification mode.
    pub verify_mode: VerifyMode,
    /// Concurrent workers per round.
    pub workers: u32,
    /// Number of rounds.
    pub rounds: u32,
    /// Pause between rounds.
    pub round_pause: Duration,
    /// Handling of failed verification reads.
    pub read_errors: ReadErrorPolicy,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            durability: None,
            verify_mode: VerifyMode::default(),
            workers: DEFAULT_WORKERS,
            rounds: DEFAULT_ROUNDS,
            round_pause: DEFAULT_ROUND_PAUSE,
            read_errors: ReadErrorPolicy::default(),
        }
    }
}

impl HarnessConfig {
    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.workers == 0 {
            return Err(HarnessError::Configuration(
                "number of connections must be at least 1".to_string(),
            ));
        }
        if self.rounds == 0 {
            return Err(HarnessError::Configuration(
                "number of loops must be at least 1".to_string(),
            ));
        }
        if let Some(mode) = &self.durability {
            if mode.as_str().trim().is_empty() {
                return Err(HarnessError::Configuration(
                    "synchronous commit mode must not be empty".to_string(),
                ));
            }
        }
        for target in Target::ALL {
            if self.cluster.endpoint(target).host.is_empty() {
                return Err(HarnessError::Configuration(format!(
                    "{target} host must not be empty"
                )));
            }
        }
        Ok(())
    }
}
