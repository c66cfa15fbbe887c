//! Docker runtime: the `docker` CLI for control, the Engine API socket for stats.

use crate::engine_api::EngineApi;
use crate::error::RuntimeError;
use crate::runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutput, ExecSession, CPU_PERIOD_MICROS,
};
use crate::stats::{DockerStats, RawCounters};
use async_trait::async_trait;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::debug;

/// Default location of the Docker Engine API socket.
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// [`ContainerRuntime`] backed by the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    api: EngineApi,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::with_socket(DEFAULT_DOCKER_SOCKET)
    }

    pub fn with_socket(socket_path: impl AsRef<Path>) -> Self {
        Self {
            binary: "docker".to_string(),
            api: EngineApi::new(socket_path),
        }
    }

    /// Use a different CLI binary (e.g. `podman` with its Docker-compatible socket).
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn socket_path(&self) -> &Path {
        self.api.socket()
    }

    async fn output(&self, args: &[String]) -> Result<Output, RuntimeError> {
        debug!("{} {}", self.binary, args.join(" "));
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| RuntimeError::Spawn {
                command: command_name(args),
                source,
            })
    }

    /// Run a command and return its trimmed stdout, mapping failures to errors.
    async fn checked(&self, args: &[String]) -> Result<String, RuntimeError> {
        let output = self.output(args).await?;
        if !output.status.success() {
            return Err(failure(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Arguments for `docker run` derived from a spec.
pub(crate) fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for (key, value) in &spec.env {
        args.push("-e".to_string());
        args.push(format!("{key}={value}"));
    }
    for port in &spec.ports {
        args.push("-p".to_string());
        args.push(format!("{}:{}", port.host_port, port.container_port));
    }
    for volume in &spec.volumes {
        args.push("-v".to_string());
        args.push(volume.clone());
    }
    args.extend([
        "--cpu-period".to_string(),
        CPU_PERIOD_MICROS.to_string(),
        "--cpu-quota".to_string(),
        spec.cpu_quota().to_string(),
        "--memory".to_string(),
        spec.memory_limit.clone(),
        spec.image_ref(),
    ]);
    if let Some(command) = &spec.command {
        args.extend(command.iter().cloned());
    }
    args
}

/// `docker exec -i` process with piped stdio.
struct DockerExecSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: Option<ChildStderr>,
}

impl DockerExecSession {
    /// Error for a process that stopped answering, with whatever it wrote to stderr.
    async fn closed(&mut self) -> RuntimeError {
        let mut stderr = String::new();
        if let Some(mut pipe) = self.stderr.take() {
            if let Err(e) = pipe.read_to_string(&mut stderr).await {
                debug!("Failed to read exec session stderr: {}", e);
            }
        }
        RuntimeError::SessionClosed {
            stderr: stderr.trim().to_string(),
        }
    }
}

#[async_trait]
impl ExecSession for DockerExecSession {
    async fn request(&mut self, line: &str) -> Result<String, RuntimeError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(self.closed().await);
        };
        let mut message = String::with_capacity(line.len() + 1);
        message.push_str(line);
        message.push('\n');
        if stdin.write_all(message.as_bytes()).await.is_err() || stdin.flush().await.is_err() {
            self.stdin = None;
            return Err(self.closed().await);
        }

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply).await? == 0 {
            self.stdin = None;
            return Err(self.closed().await);
        }
        Ok(reply.trim_end().to_string())
    }

    async fn close(mut self: Box<Self>) -> Result<(), RuntimeError> {
        drop(self.stdin.take());
        let status = self.child.wait().await?;
        if !status.success() {
            return Err(self.closed().await);
        }
        Ok(())
    }
}

fn command_name(args: &[String]) -> String {
    args.first().cloned().unwrap_or_default()
}

fn failure(args: &[String], output: &Output) -> RuntimeError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.contains("No such container") || stderr.contains("No such object") {
        let target = args.last().cloned().unwrap_or_default();
        return RuntimeError::NotFound(target);
    }
    RuntimeError::CommandFailed {
        command: command_name(args),
        stderr,
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let id = self.checked(&run_args(spec)).await?;
        Ok(ContainerHandle::new(id, spec.name.clone()))
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args = vec!["exec".to_string()];
        if stdin.is_some() {
            args.push("-i".to_string());
        }
        args.push(handle.id.clone());
        args.extend(command.iter().cloned());

        let spawn_error = |source| RuntimeError::Spawn {
            command: "exec".to_string(),
            source,
        };
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        Ok(ExecOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    async fn open_session(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> Result<Box<dyn ExecSession>, RuntimeError> {
        let mut args = vec!["exec".to_string(), "-i".to_string(), handle.id.clone()];
        args.extend(command.iter().cloned());
        debug!("{} exec -i {} ...", self.binary, handle.short_id());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: "exec".to_string(),
                source,
            })?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(RuntimeError::SessionClosed {
                stderr: "stdio was not captured".to_string(),
            });
        };
        let stderr = child.stderr.take();
        Ok(Box::new(DockerExecSession {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr,
        }))
    }

    async fn stats(&self, handle: &ContainerHandle) -> Result<RawCounters, RuntimeError> {
        let path = format!("/containers/{}/stats?stream=false", handle.id);
        let body = self.api.get(&path).await?;
        let stats: DockerStats = serde_json::from_slice(&body)?;
        Ok(RawCounters::from(stats))
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.checked(&["stop".to_string(), handle.id.clone()])
            .await
            .map(drop)
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.checked(&["rm".to_string(), handle.id.clone()])
            .await
            .map(drop)
    }

    async fn force_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.checked(&["rm".to_string(), "-f".to_string(), handle.id.clone()])
            .await
            .map(drop)
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        self.checked(&[
            "inspect".to_string(),
            "--format".to_string(),
            "{{.State.Status}}".to_string(),
            handle.id.clone(),
        ])
        .await
    }

    async fn lookup(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        let result = self
            .checked(&[
                "inspect".to_string(),
                "--type".to_string(),
                "container".to_string(),
                "--format".to_string(),
                "{{.Id}}".to_string(),
                name.to_string(),
            ])
            .await;
        match result {
            Ok(id) => Ok(Some(ContainerHandle::new(id, name))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn logs(&self, handle: &ContainerHandle, tail: usize) -> Result<String, RuntimeError> {
        let args = [
            "logs".to_string(),
            "--tail".to_string(),
            tail.to_string(),
            handle.id.clone(),
        ];
        let output = self.output(&args).await?;
        if !output.status.success() {
            return Err(failure(&args, &output));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(format!("{stdout}{stderr}"))
    }
}
