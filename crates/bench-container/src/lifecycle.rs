//! Container state machine and the lifecycle manager that drives it.

use crate::error::LifecycleError;
use crate::readiness::{ReadinessPolicy, ReadinessProbe, Sleeper, TokioSleeper};
use crate::runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, STATUS_RUNNING};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lines of container log shown when a container never becomes ready.
const LOG_TAIL_LINES: usize = 20;

/// Runtime state of a handler's container.
///
/// ```text
/// Absent/Stopped --start--> Starting --(ready or timeout)--> Running
/// Running --stop--> Stopping --> Stopped --remove--> Absent
/// Stopping --(stop failed)--> Running
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerState {
    #[default]
    Absent,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl ContainerState {
    pub fn can_transition_to(self, next: ContainerState) -> bool {
        use ContainerState::*;
        matches!(
            (self, next),
            (Absent | Stopped, Starting)
                | (Starting, Running)
                | (Starting, Absent)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Stopping, Running)
                | (Stopped, Absent)
        )
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContainerState::Absent => "absent",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Stopping => "stopping",
            ContainerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A handler's container: its spec, cached runtime handle and state.
#[derive(Debug, Clone)]
pub struct Container {
    spec: ContainerSpec,
    handle: Option<ContainerHandle>,
    state: ContainerState,
}

impl Container {
    pub fn new(spec: ContainerSpec) -> Self {
        Self {
            spec,
            handle: None,
            state: ContainerState::Absent,
        }
    }

    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn handle(&self) -> Option<&ContainerHandle> {
        self.handle.as_ref()
    }

    pub fn state(&self) -> ContainerState {
        self.state
    }

    fn transition(&mut self, next: ContainerState) -> Result<(), LifecycleError> {
        if !self.state.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                name: self.spec.name.clone(),
                from: self.state,
                to: next,
            });
        }
        debug!("Container {}: {} -> {}", self.spec.name, self.state, next);
        self.state = next;
        Ok(())
    }

    /// Walk the state machine to Running for a container found live in the runtime.
    ///
    /// A live container in Stopping was never stopped, so it goes straight back to
    /// Running; only an Absent or Stopped container passes through Starting.
    fn adopt_running(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ContainerState::Running => Ok(()),
            ContainerState::Stopping => self.transition(ContainerState::Running),
            _ => {
                self.transition(ContainerState::Starting)?;
                self.transition(ContainerState::Running)
            }
        }
    }

    /// Walk the state machine to Stopped for a container that is no longer live.
    fn settle_not_running(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            ContainerState::Running => {
                self.transition(ContainerState::Stopping)?;
                self.transition(ContainerState::Stopped)
            }
            ContainerState::Stopping => self.transition(ContainerState::Stopped),
            _ => Ok(()),
        }
    }
}

/// Outcome of [`ContainerLifecycle::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// A live container with the same name was adopted; nothing was created.
    AlreadyRunning,
    Ready { attempts: u32 },
    /// The probe never succeeded; the container is Running but unverified.
    TimedOut { attempts: u32 },
}

impl Readiness {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Readiness::TimedOut { .. })
    }
}

/// Starts, stops and polls containers against a [`ContainerRuntime`].
#[derive(Clone)]
pub struct ContainerLifecycle {
    runtime: Arc<dyn ContainerRuntime>,
    policy: ReadinessPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ContainerLifecycle {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            policy: ReadinessPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn policy(&self) -> &ReadinessPolicy {
        &self.policy
    }

    /// Create and launch the container, then poll `probe` until ready or `wait_timeout`.
    ///
    /// Idempotent: a container already running under the same name is adopted as is.
    /// A readiness timeout is not an error here; it is reported as
    /// [`Readiness::TimedOut`] and the caller decides what to do with it.
    pub async fn start(
        &self,
        container: &mut Container,
        probe: &dyn ReadinessProbe,
        wait_timeout: Duration,
    ) -> Result<Readiness, LifecycleError> {
        if self.is_running(container).await? {
            container.adopt_running()?;
            info!("Container {} is already running", container.name());
            return Ok(Readiness::AlreadyRunning);
        }
        container.settle_not_running()?;

        if let Some(stale) = container.handle.take() {
            info!(
                "Removing stale container {} ({})",
                container.name(),
                stale.short_id()
            );
            if let Err(e) = self.runtime.remove(&stale).await {
                debug!("Failed to remove stale container (may not exist): {}", e);
            }
        }

        container.transition(ContainerState::Starting)?;
        let handle = match self.runtime.create(container.spec()).await {
            Ok(handle) => handle,
            Err(source) => {
                container.transition(ContainerState::Absent)?;
                return Err(LifecycleError::Startup {
                    name: container.name().to_string(),
                    source,
                });
            }
        };
        info!(
            "Started container: {} ({})",
            container.name(),
            handle.short_id()
        );
        container.handle = Some(handle);

        let readiness = self.wait_for_ready(container, probe, wait_timeout).await;
        container.transition(ContainerState::Running)?;
        Ok(readiness)
    }

    async fn wait_for_ready(
        &self,
        container: &Container,
        probe: &dyn ReadinessProbe,
        wait_timeout: Duration,
    ) -> Readiness {
        let attempts = self.policy.max_attempts(wait_timeout);
        let mut waited = Duration::ZERO;

        for attempt in 0..attempts {
            if self.is_live(container).await && probe.is_ready(self.runtime.as_ref(), container).await
            {
                info!(
                    "Container {} is ready after {} attempt(s)",
                    container.name(),
                    attempt + 1
                );
                return Readiness::Ready {
                    attempts: attempt + 1,
                };
            }
            if attempt + 1 == attempts {
                break;
            }
            let delay = self
                .policy
                .backoff
                .delay(attempt, self.policy.interval)
                .min(wait_timeout.saturating_sub(waited));
            if delay.is_zero() {
                break;
            }
            self.sleeper.sleep(delay).await;
            waited += delay;
        }

        warn!(
            "Container {} did not become ready within {:?}",
            container.name(),
            wait_timeout
        );
        self.log_tail(container).await;
        Readiness::TimedOut { attempts }
    }

    async fn is_live(&self, container: &Container) -> bool {
        let Some(handle) = container.handle() else {
            return false;
        };
        matches!(self.runtime.inspect(handle).await, Ok(status) if status == STATUS_RUNNING)
    }

    async fn log_tail(&self, container: &Container) {
        let Some(handle) = container.handle() else {
            return;
        };
        match self.runtime.logs(handle, LOG_TAIL_LINES).await {
            Ok(logs) if !logs.trim().is_empty() => {
                warn!("Last log lines of {}:\n{}", container.name(), logs.trim_end());
            }
            Ok(_) => {}
            Err(e) => debug!("Failed to read logs of {}: {}", container.name(), e),
        }
    }

    /// Stop the container; with `remove`, also remove it and clear the handle.
    ///
    /// Stopping is a no-op when the container is not running. A leftover exited
    /// container is still removed when `remove` is set. When the stop itself fails
    /// and `remove` is set, the container is force-removed and the stop error is
    /// returned.
    pub async fn stop(&self, container: &mut Container, remove: bool) -> Result<(), LifecycleError> {
        if self.is_running(container).await? {
            container.adopt_running()?;
            container.transition(ContainerState::Stopping)?;
            if let Some(handle) = container.handle.clone() {
                if let Err(e) = self.runtime.stop(&handle).await {
                    warn!("Failed to stop container {}: {}", container.name(), e);
                    let settled = if remove {
                        self.force_remove(container, handle).await
                    } else {
                        container.transition(ContainerState::Running)
                    };
                    if let Err(cleanup) = settled {
                        warn!("Container {} was left behind: {}", container.name(), cleanup);
                    }
                    return Err(e.into());
                }
            }
            container.transition(ContainerState::Stopped)?;
            info!("Stopped container {}", container.name());
        } else {
            container.settle_not_running()?;
        }

        if remove {
            if let Some(handle) = container.handle.take() {
                if let Err(e) = self.runtime.remove(&handle).await {
                    container.handle = Some(handle);
                    return Err(e.into());
                }
                info!("Removed container {}", container.name());
            }
            if container.state() == ContainerState::Stopped {
                container.transition(ContainerState::Absent)?;
            }
        }
        Ok(())
    }

    /// `docker rm -f` after a failed stop. On failure the container is still live.
    async fn force_remove(
        &self,
        container: &mut Container,
        handle: ContainerHandle,
    ) -> Result<(), LifecycleError> {
        match self.runtime.force_remove(&handle).await {
            Ok(()) => {
                info!("Force-removed container {}", container.name());
                container.handle = None;
                container.transition(ContainerState::Stopped)?;
                container.transition(ContainerState::Absent)
            }
            Err(e) => {
                container.transition(ContainerState::Running)?;
                Err(e.into())
            }
        }
    }

    /// Resolve the handle by name if not cached and report whether the container is live.
    ///
    /// A container the runtime does not know is not running; that is never an error.
    pub async fn is_running(&self, container: &mut Container) -> Result<bool, LifecycleError> {
        if container.handle.is_none() {
            match self.runtime.lookup(container.name()).await? {
                Some(handle) => container.handle = Some(handle),
                None => return Ok(false),
            }
        }
        let Some(handle) = container.handle.as_ref() else {
            return Ok(false);
        };
        match self.runtime.inspect(handle).await {
            Ok(status) => Ok(status == STATUS_RUNNING),
            Err(e) if e.is_not_found() => {
                container.handle = None;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeRuntime, RecordingSleeper, ScriptedProbe};
    use crate::RuntimeError;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec::new("mysql", "8.0", name).with_port(3306, 13306)
    }

    fn lifecycle(runtime: &Arc<FakeRuntime>, sleeper: &Arc<RecordingSleeper>) -> ContainerLifecycle {
        ContainerLifecycle::new(runtime.clone()).with_sleeper(sleeper.clone())
    }

    #[test]
    fn test_state_machine_transitions() {
        use ContainerState::*;
        assert!(Absent.can_transition_to(Starting));
        assert!(Stopped.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopping));
        assert!(Stopping.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Absent));
        assert!(Stopping.can_transition_to(Running));

        assert!(!Stopping.can_transition_to(Starting));
        assert!(!Absent.can_transition_to(Running));
        assert!(!Running.can_transition_to(Starting));
        assert!(!Stopped.can_transition_to(Running));
        assert!(!Running.can_transition_to(Stopped));
    }

    #[tokio::test]
    async fn test_start_polls_until_ready() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let probe = ScriptedProbe::new([false, false, true]);
        let mut container = Container::new(spec("bench-mysql"));

        let readiness = lifecycle(&runtime, &sleeper)
            .start(&mut container, &probe, Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(readiness, Readiness::Ready { attempts: 3 });
        assert_eq!(container.state(), ContainerState::Running);
        assert!(container.handle().is_some());
        assert_eq!(sleeper.durations(), vec![Duration::from_secs(1); 2]);
        assert!(runtime.is_container_running("bench-mysql"));
    }

    #[tokio::test]
    async fn test_start_times_out_after_bounded_attempts() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let probe = ScriptedProbe::always(false);
        let mut container = Container::new(spec("bench-mysql"));

        let readiness = lifecycle(&runtime, &sleeper)
            .start(&mut container, &probe, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(readiness, Readiness::TimedOut { attempts: 5 });
        assert_eq!(probe.calls(), 5);
        assert_eq!(sleeper.total(), Duration::from_secs(4));
        assert_eq!(container.state(), ContainerState::Running);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let probe = ScriptedProbe::always(true);
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &probe, Duration::from_secs(5))
            .await
            .unwrap();
        let second = lifecycle
            .start(&mut container, &probe, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(second, Readiness::AlreadyRunning);
        assert_eq!(runtime.created_names(), vec!["bench-mysql".to_string()]);
    }

    #[tokio::test]
    async fn test_start_adopts_container_left_running_by_name() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert_running(spec("bench-mysql"));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));

        let readiness = lifecycle(&runtime, &sleeper)
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(readiness, Readiness::AlreadyRunning);
        assert_eq!(container.state(), ContainerState::Running);
        assert!(runtime.created_names().is_empty());
    }

    #[tokio::test]
    async fn test_start_replaces_stale_exited_container() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.insert_running(spec("bench-mysql"));
        runtime.kill("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle(&runtime, &sleeper)
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(runtime.created_names(), vec!["bench-mysql".to_string()]);
        assert_eq!(runtime.container_count(), 1);
        assert!(runtime.is_container_running("bench-mysql"));
    }

    #[tokio::test]
    async fn test_start_failure_leaves_container_absent() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_create("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));

        let err = lifecycle(&runtime, &sleeper)
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Startup { .. }));
        assert_eq!(container.state(), ContainerState::Absent);
        assert!(container.handle().is_none());
    }

    #[tokio::test]
    async fn test_probe_not_called_while_container_is_down() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.exit_after_create("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let probe = ScriptedProbe::always(true);
        let mut container = Container::new(spec("bench-mysql"));

        let readiness = lifecycle(&runtime, &sleeper)
            .start(&mut container, &probe, Duration::from_secs(3))
            .await
            .unwrap();

        assert!(readiness.is_timed_out());
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test]
    async fn test_stop_with_remove_returns_to_absent() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        lifecycle.stop(&mut container, true).await.unwrap();

        assert_eq!(container.state(), ContainerState::Absent);
        assert!(container.handle().is_none());
        assert_eq!(runtime.container_count(), 0);
        assert!(!lifecycle.is_running(&mut container).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_without_remove_keeps_handle() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        lifecycle.stop(&mut container, false).await.unwrap();

        assert_eq!(container.state(), ContainerState::Stopped);
        assert!(container.handle().is_some());
        assert_eq!(runtime.container_count(), 1);

        // Restart goes through Starting again.
        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(container.state(), ContainerState::Running);
    }

    #[tokio::test]
    async fn test_stop_is_noop_when_absent() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle(&runtime, &sleeper)
            .stop(&mut container, true)
            .await
            .unwrap();

        assert_eq!(container.state(), ContainerState::Absent);
        assert!(runtime.stop_calls().is_empty());
    }

    #[tokio::test]
    async fn test_is_running_treats_unknown_container_as_stopped() {
        let runtime = Arc::new(FakeRuntime::new());
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("nope"));

        let running = lifecycle(&runtime, &sleeper)
            .is_running(&mut container)
            .await
            .unwrap();
        assert!(!running);
    }

    #[tokio::test]
    async fn test_is_running_propagates_other_runtime_errors() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_lookup(RuntimeError::CommandFailed {
            command: "inspect".to_string(),
            stderr: "Cannot connect to the Docker daemon".to_string(),
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));

        let result = lifecycle(&runtime, &sleeper).is_running(&mut container).await;
        assert!(matches!(result, Err(LifecycleError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_failed_stop_still_removes_container() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_stop("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        let err = lifecycle.stop(&mut container, true).await.unwrap_err();

        assert!(err.to_string().contains("timeout"));
        assert_eq!(container.state(), ContainerState::Absent);
        assert!(container.handle().is_none());
        assert_eq!(runtime.container_count(), 0);
        assert_eq!(runtime.remove_calls(), vec!["bench-mysql".to_string()]);

        // Nothing left to clean up on a second attempt
        lifecycle.stop(&mut container, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_stop_without_remove_keeps_container_running() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_stop("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(lifecycle.stop(&mut container, false).await.is_err());

        assert_eq!(container.state(), ContainerState::Running);
        assert!(runtime.is_container_running("bench-mysql"));
        assert!(runtime.remove_calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_force_remove_reports_the_stop_error() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_stop("bench-mysql");
        runtime.fail_force_remove("bench-mysql");
        let sleeper = Arc::new(RecordingSleeper::default());
        let lifecycle = lifecycle(&runtime, &sleeper);
        let mut container = Container::new(spec("bench-mysql"));

        lifecycle
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();
        let err = lifecycle.stop(&mut container, true).await.unwrap_err();

        assert!(err.to_string().contains("timeout"));
        assert_eq!(container.state(), ContainerState::Running);
        assert!(container.handle().is_some());
        assert_eq!(runtime.container_count(), 1);
    }

    #[tokio::test]
    async fn test_live_container_in_stopping_returns_to_running_without_start() {
        let runtime = Arc::new(FakeRuntime::new());
        let handle = runtime.insert_running(spec("bench-mysql"));
        let sleeper = Arc::new(RecordingSleeper::default());
        let mut container = Container::new(spec("bench-mysql"));
        container.handle = Some(handle);
        container.state = ContainerState::Stopping;

        let readiness = lifecycle(&runtime, &sleeper)
            .start(&mut container, &ScriptedProbe::always(true), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(readiness, Readiness::AlreadyRunning);
        assert_eq!(container.state(), ContainerState::Running);
        assert!(runtime.created_names().is_empty());
    }
}
