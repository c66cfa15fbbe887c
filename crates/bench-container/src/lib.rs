//! Container plumbing for db-bench.
//!
//! This crate owns everything that talks to the container runtime:
//! - [`ContainerRuntime`]: the runtime interface (create, exec, stats, stop, remove, inspect)
//! - [`DockerCli`]: the Docker implementation (CLI for control, Engine API for stats)
//! - [`Container`] and [`ContainerLifecycle`]: the per-handler state machine
//! - [`RawCounters`] and [`diff`]: resource snapshots and the metrics derived from them

pub mod docker;
mod engine_api;
pub mod error;
pub mod lifecycle;
pub mod readiness;
pub mod runtime;
pub mod stats;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use docker::{DockerCli, DEFAULT_DOCKER_SOCKET};
pub use error::{LifecycleError, RuntimeError};
pub use lifecycle::{Container, ContainerLifecycle, ContainerState, Readiness};
pub use readiness::{Backoff, ReadinessPolicy, ReadinessProbe, Sleeper, TokioSleeper};
pub use runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutput, ExecSession, PortMapping,
};
pub use stats::{diff, snapshot, RawCounters, ResourceMetrics, BYTES_PER_MIB};
