//! Deterministic fakes for tests: an in-memory runtime, a scripted probe and a
//! sleeper that records instead of waiting.

use crate::error::RuntimeError;
use crate::lifecycle::Container;
use crate::readiness::{ReadinessProbe, Sleeper};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutput, ExecSession};
use crate::stats::RawCounters;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type ExecResponder = Box<dyn Fn(&str, &[String], Option<&[u8]>) -> ExecOutput + Send + Sync>;
type SessionResponder = Arc<dyn Fn(&str, &str) -> Result<String, String> + Send + Sync>;
type SessionLog = Arc<Mutex<Vec<(String, String)>>>;

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    spec: ContainerSpec,
    status: String,
}

#[derive(Default)]
struct FakeState {
    next_id: u64,
    containers: BTreeMap<String, FakeContainer>,
    create_failures: HashSet<String>,
    exit_after_create: HashSet<String>,
    lookup_error: Option<RuntimeError>,
    stats: HashMap<String, VecDeque<RawCounters>>,
    stats_failures: HashSet<String>,
    stop_failures: HashSet<String>,
    force_remove_failures: HashSet<String>,
    exec_responder: Option<ExecResponder>,
    session_responder: Option<SessionResponder>,
    sessions: Vec<(String, Vec<String>)>,
    closed_sessions: usize,
    created: Vec<String>,
    stopped: Vec<String>,
    removed: Vec<String>,
    execs: Vec<(String, Vec<String>)>,
    stats_calls: usize,
}

/// In-memory [`ContainerRuntime`] that mimics Docker's observable behavior.
#[derive(Default)]
pub struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
    session_log: SessionLog,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, spec: ContainerSpec, status: &str) -> ContainerHandle {
        let mut state = self.state();
        state.next_id += 1;
        let id = format!("{:064x}", state.next_id);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: spec.name.clone(),
                spec: spec.clone(),
                status: status.to_string(),
            },
        );
        ContainerHandle::new(id, spec.name)
    }

    /// Pretend a container with this spec is already running, created outside this run.
    pub fn insert_running(&self, spec: ContainerSpec) -> ContainerHandle {
        self.insert(spec, "running")
    }

    /// Mark the named container as exited.
    pub fn kill(&self, name: &str) {
        for container in self.state().containers.values_mut() {
            if container.name == name {
                container.status = "exited".to_string();
            }
        }
    }

    /// Make `create` fail for this container name.
    pub fn fail_create(&self, name: &str) {
        self.state().create_failures.insert(name.to_string());
    }

    /// Containers with this name exit right after being created.
    pub fn exit_after_create(&self, name: &str) {
        self.state().exit_after_create.insert(name.to_string());
    }

    /// Make the next `lookup` fail with `error`.
    pub fn fail_lookup(&self, error: RuntimeError) {
        self.state().lookup_error = Some(error);
    }

    /// Queue counters returned by `stats` for this container; the last one repeats.
    pub fn push_stats(&self, name: &str, counters: RawCounters) {
        self.state()
            .stats
            .entry(name.to_string())
            .or_default()
            .push_back(counters);
    }

    /// Make every `stats` call for this container fail.
    pub fn fail_stats(&self, name: &str) {
        self.state().stats_failures.insert(name.to_string());
    }

    /// Make every `stop` call for this container fail, leaving it running.
    pub fn fail_stop(&self, name: &str) {
        self.state().stop_failures.insert(name.to_string());
    }

    /// Make every `force_remove` call for this container fail.
    pub fn fail_force_remove(&self, name: &str) {
        self.state().force_remove_failures.insert(name.to_string());
    }

    /// Answer `exec` calls with `responder(container_name, command, stdin)`.
    pub fn on_exec<F>(&self, responder: F)
    where
        F: Fn(&str, &[String], Option<&[u8]>) -> ExecOutput + Send + Sync + 'static,
    {
        self.state().exec_responder = Some(Box::new(responder));
    }

    /// Answer session requests with `responder(container_name, line)`.
    ///
    /// `Err(stderr)` ends the session as if the process had exited.
    pub fn on_session<F>(&self, responder: F)
    where
        F: Fn(&str, &str) -> Result<String, String> + Send + Sync + 'static,
    {
        self.state().session_responder = Some(Arc::new(responder));
    }

    /// `(container_name, command)` of every opened session.
    pub fn opened_sessions(&self) -> Vec<(String, Vec<String>)> {
        self.state().sessions.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.state().closed_sessions
    }

    /// `(container_name, line)` of every session request, across sessions.
    pub fn session_requests(&self) -> Vec<(String, String)> {
        self.session_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_container_running(&self, name: &str) -> bool {
        self.state()
            .containers
            .values()
            .any(|c| c.name == name && c.status == "running")
    }

    pub fn running_names(&self) -> Vec<String> {
        self.state()
            .containers
            .values()
            .filter(|c| c.status == "running")
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn container_count(&self) -> usize {
        self.state().containers.len()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.state().created.clone()
    }

    pub fn created_spec(&self, name: &str) -> Option<ContainerSpec> {
        self.state()
            .containers
            .values()
            .find(|c| c.name == name)
            .map(|c| c.spec.clone())
    }

    pub fn stop_calls(&self) -> Vec<String> {
        self.state().stopped.clone()
    }

    pub fn remove_calls(&self) -> Vec<String> {
        self.state().removed.clone()
    }

    pub fn exec_calls(&self) -> Vec<(String, Vec<String>)> {
        self.state().execs.clone()
    }

    pub fn stats_calls(&self) -> usize {
        self.state().stats_calls
    }
}

struct FakeSession {
    container: String,
    responder: Option<SessionResponder>,
    log: SessionLog,
    state: Arc<Mutex<FakeState>>,
    ended: bool,
}

#[async_trait]
impl ExecSession for FakeSession {
    async fn request(&mut self, line: &str) -> Result<String, RuntimeError> {
        if self.ended {
            return Err(RuntimeError::SessionClosed {
                stderr: String::new(),
            });
        }
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.container.clone(), line.to_string()));
        match &self.responder {
            Some(responder) => responder(&self.container, line).map_err(|stderr| {
                self.ended = true;
                RuntimeError::SessionClosed { stderr }
            }),
            None => Ok("{}".to_string()),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), RuntimeError> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed_sessions += 1;
        Ok(())
    }
}

fn not_found(handle: &ContainerHandle) -> RuntimeError {
    RuntimeError::NotFound(handle.id.clone())
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        {
            let state = self.state();
            let in_use = state.containers.values().any(|c| c.name == spec.name);
            if state.create_failures.contains(&spec.name) || in_use {
                return Err(RuntimeError::CommandFailed {
                    command: "run".to_string(),
                    stderr: format!("Conflict. The container name \"/{}\" is unavailable", spec.name),
                });
            }
        }
        let status = if self.state().exit_after_create.contains(&spec.name) {
            "exited"
        } else {
            "running"
        };
        let handle = self.insert(spec.clone(), status);
        self.state().created.push(spec.name.clone());
        Ok(handle)
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        command: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<ExecOutput, RuntimeError> {
        let mut state = self.state();
        let name = state
            .containers
            .get(&handle.id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found(handle))?;
        state.execs.push((name.clone(), command.to_vec()));
        Ok(match &state.exec_responder {
            Some(responder) => responder(&name, command, stdin),
            None => ExecOutput::default(),
        })
    }

    async fn open_session(
        &self,
        handle: &ContainerHandle,
        command: &[String],
    ) -> Result<Box<dyn ExecSession>, RuntimeError> {
        let mut state = self.state();
        let name = state
            .containers
            .get(&handle.id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found(handle))?;
        state.sessions.push((name.clone(), command.to_vec()));
        Ok(Box::new(FakeSession {
            container: name,
            responder: state.session_responder.clone(),
            log: self.session_log.clone(),
            state: self.state.clone(),
            ended: false,
        }))
    }

    async fn stats(&self, handle: &ContainerHandle) -> Result<RawCounters, RuntimeError> {
        let mut state = self.state();
        state.stats_calls += 1;
        let name = state
            .containers
            .get(&handle.id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found(handle))?;
        if state.stats_failures.contains(&name) {
            return Err(RuntimeError::Api {
                status: 500,
                body: "stats unavailable".to_string(),
            });
        }
        let queue = state.stats.entry(name).or_default();
        let counters = if queue.len() > 1 {
            queue.pop_front().unwrap_or_default()
        } else {
            queue.front().copied().unwrap_or_default()
        };
        Ok(counters)
    }

    async fn stop(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let mut state = self.state();
        let name = state
            .containers
            .get(&handle.id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found(handle))?;
        if state.stop_failures.contains(&name) {
            return Err(RuntimeError::CommandFailed {
                command: "stop".to_string(),
                stderr: "timeout".to_string(),
            });
        }
        if let Some(container) = state.containers.get_mut(&handle.id) {
            container.status = "exited".to_string();
        }
        state.stopped.push(name);
        Ok(())
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let mut state = self.state();
        match state.containers.get(&handle.id) {
            None => return Err(not_found(handle)),
            Some(c) if c.status == "running" => {
                return Err(RuntimeError::CommandFailed {
                    command: "rm".to_string(),
                    stderr: "cannot remove a running container".to_string(),
                })
            }
            Some(_) => {}
        }
        if let Some(container) = state.containers.remove(&handle.id) {
            state.removed.push(container.name);
        }
        Ok(())
    }

    async fn force_remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let mut state = self.state();
        let name = state
            .containers
            .get(&handle.id)
            .map(|c| c.name.clone())
            .ok_or_else(|| not_found(handle))?;
        if state.force_remove_failures.contains(&name) {
            return Err(RuntimeError::CommandFailed {
                command: "rm".to_string(),
                stderr: "device or resource busy".to_string(),
            });
        }
        state.containers.remove(&handle.id);
        state.removed.push(name);
        Ok(())
    }

    async fn inspect(&self, handle: &ContainerHandle) -> Result<String, RuntimeError> {
        self.state()
            .containers
            .get(&handle.id)
            .map(|c| c.status.clone())
            .ok_or_else(|| not_found(handle))
    }

    async fn lookup(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        let mut state = self.state();
        if let Some(error) = state.lookup_error.take() {
            return Err(error);
        }
        Ok(state
            .containers
            .iter()
            .find(|(_, c)| c.name == name)
            .map(|(id, c)| ContainerHandle::new(id.clone(), c.name.clone())))
    }

    async fn logs(&self, handle: &ContainerHandle, _tail: usize) -> Result<String, RuntimeError> {
        let state = self.state();
        let container = state
            .containers
            .get(&handle.id)
            .ok_or_else(|| not_found(handle))?;
        Ok(format!("{} is {}\n", container.name, container.status))
    }
}

/// Probe that replays a script of answers, then repeats a default.
pub struct ScriptedProbe {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    calls: AtomicU32,
}

impl ScriptedProbe {
    /// Answers in order; once exhausted, keeps answering `true`.
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            default: true,
            calls: AtomicU32::new(0),
        }
    }

    pub fn always(ready: bool) -> Self {
        Self {
            answers: Mutex::new(VecDeque::new()),
            default: ready,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReadinessProbe for ScriptedProbe {
    async fn is_ready(&self, _runtime: &dyn ContainerRuntime, _container: &Container) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(self.default)
    }
}

/// Sleeper that records requested durations and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    durations: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn durations(&self) -> Vec<Duration> {
        self.durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn total(&self) -> Duration {
        self.durations().into_iter().sum()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.durations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
    }
}
