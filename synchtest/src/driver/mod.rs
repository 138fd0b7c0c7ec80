//! Workload orchestration.
//!
//! - **Harness**: the run context (config, pool, oracle) every task borrows
//! - **WorkloadDriver**: rounds, barrier, worker fan-out, pacing, teardown
//! - **DriverBuilder**: fluent construction with validation

pub mod builder;
pub mod harness;
pub mod workload;

pub use builder::DriverBuilder;
pub use harness::Harness;
pub use workload::WorkloadDriver;
