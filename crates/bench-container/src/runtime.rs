//! Container runtime interface consumed by the lifecycle manager and the handlers.

use crate::error::RuntimeError;
use crate::stats::RawCounters;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// CFS period used to turn a fractional core count into a quota.
pub const CPU_PERIOD_MICROS: i64 = 100_000;

/// Status string reported by the runtime for a live container.
pub const STATUS_RUNNING: &str = "running";

/// A container port published on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    pub host_port: u16,
}

impl PortMapping {
    pub fn new(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }
}

/// Everything the runtime needs to create and launch a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image: String,
    pub tag: String,
    /// Unique key; the lifecycle manager resolves containers by this name.
    pub name: String,
    pub ports: Vec<PortMapping>,
    pub env: BTreeMap<String, String>,
    /// Volume mounts in `host:container[:mode]` form.
    pub volumes: Vec<String>,
    /// CPU limit in cores (fractional values allowed).
    pub cpu_limit: f64,
    /// Memory limit in Docker notation, e.g. `2g` or `512m`.
    pub memory_limit: String,
    /// Replaces the image's default command when set.
    pub command: Option<Vec<String>>,
}

impl ContainerSpec {
    pub fn new(image: impl Into<String>, tag: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
            name: name.into(),
            ports: Vec::new(),
            env: BTreeMap::new(),
            volumes: Vec::new(),
            cpu_limit: 1.0,
            memory_limit: "2g".to_string(),
            command: None,
        }
    }

    pub fn with_port(mut self, container_port: u16, host_port: u16) -> Self {
        self.ports.push(PortMapping::new(container_port, host_port));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volumes.push(volume.into());
        self
    }

    pub fn with_cpu_limit(mut self, cores: f64) -> Self {
        self.cpu_limit = cores;
        self
    }

    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = limit.into();
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    /// `image:tag` reference passed to the runtime.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }

    /// CFS quota in microseconds per [`CPU_PERIOD_MICROS`].
    pub fn cpu_quota(&self) -> i64 {
        (self.cpu_limit * CPU_PERIOD_MICROS as f64).round() as i64
    }

    /// Host port published for `container_port`, if any.
    pub fn host_port(&self, container_port: u16) -> Option<u16> {
        self.ports
            .iter()
            .find(|p| p.container_port == container_port)
            .map(|p| p.host_port)
    }
}

/// Reference to a created container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

impl ContainerHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(12)
            .map_or(self.id.len(), |(i, _)| i);
        &self.id[..end]
    }
}

/// Result of running a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A long-lived process inside a container speaking one line per message.
#[async_trait]
pub trait ExecSession: Send {
    /// Write `line` (without its newline) to the process and read one line back.
    async fn request(&mut self, line: &str) -> Result<String, RuntimeError>;

    /// Close the process's stdin and wait for it to exit.
    async fn close(self: Box<Self>) -> Result<(), RuntimeError>;
}

/// Control-plane operations of a container runtime.
///
/// Calls are issued sequentially by a single benchmark driver; implementations do not
/// need to coordinate concurrent callers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and launch a detached container.
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Run `command` inside the container, optionally feeding `stdin`.
    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, RuntimeError>;

    /// Start `command` inside the container with stdin and stdout kept open.
    async fn open_session(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> Result<Box<dyn ExecSession>, RuntimeError>;

    /// Read the live resource counters of the container.
    async fn stats(&self, handle: &ContainerHandle) -> Result<RawCounters, RuntimeError>;

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Kill and remove the container whatever its status.
    async fn force_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Live status string, e.g. `running` or `exited`.
    async fn inspect(&self, handle: &ContainerHandle) -> Result<String, RuntimeError>;

    /// Resolve a container by name. `Ok(None)` when no such container exists.
    async fn lookup(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError>;

    /// Last `tail` lines of the container log.
    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_quota_from_fractional_cores() {
        let spec = ContainerSpec::new("mysql", "8.0", "m").with_cpu_limit(1.5);
        assert_eq!(spec.cpu_quota(), 150_000);
        let spec = spec.with_cpu_limit(2.0);
        assert_eq!(spec.cpu_quota(), 200_000);
    }

    #[test]
    fn test_image_ref_and_host_port() {
        let spec = ContainerSpec::new("clickhouse/clickhouse-server", "latest", "ch")
            .with_port(8123, 18123)
            .with_port(9000, 19000);
        assert_eq!(spec.image_ref(), "clickhouse/clickhouse-server:latest");
        assert_eq!(spec.host_port(9000), Some(19000));
        assert_eq!(spec.host_port(5432), None);
    }

    #[test]
    fn test_short_id() {
        let handle = ContainerHandle::new("0123456789abcdef0123", "x");
        assert_eq!(handle.short_id(), "0123456789ab");
        let handle = ContainerHandle::new("abc", "x");
        assert_eq!(handle.short_id(), "abc");
    }
}
