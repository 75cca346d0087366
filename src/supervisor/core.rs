use super::Registry;
use crate::catalog::{ServiceCatalog, ServiceDescriptor};
use crate::config::Settings;
use crate::error::{Error, Result, StartupFailure, StopError};
use crate::runtime::{runtime_for, ContainerRuntime};
use crate::service::{
    LogHandle, LogSink, ProcessHandle, ProcessInfo, ProcessLauncher, ProcessState,
    ReadinessMatcher, ReadinessOutcome,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Timing knobs of a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// How long a launch may take to print all of its start patterns.
    pub startup_timeout: Duration,
    /// Sleep between log reads while waiting for readiness.
    pub tail_interval: Duration,
    /// SIGTERM to SIGKILL grace when terminating a tracked process.
    pub stop_grace_period: Duration,
    /// Pause after readiness before the start is accepted.
    pub settle_period: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            tail_interval: crate::service::DEFAULT_TAIL_INTERVAL,
            stop_grace_period: Duration::from_secs(10),
            settle_period: Duration::from_millis(200),
        }
    }
}

impl From<&Settings> for SupervisorOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            startup_timeout: settings.startup_timeout,
            tail_interval: settings.tail_interval,
            stop_grace_period: settings.stop_grace_period,
            settle_period: settings.settle_period,
        }
    }
}

/// Outcome of stopping several services. Failures never cut the run short.
#[derive(Debug, Default)]
pub struct StopReport {
    pub stopped: Vec<String>,
    pub errors: Vec<StopError>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<String>> {
        if self.errors.is_empty() {
            Ok(self.stopped)
        } else {
            Err(Error::StopFailed(self.errors))
        }
    }
}

/// Starts, tracks and stops the services of one run.
///
/// # Concurrency
///
/// All operations take `&self`. The registry sits behind an async mutex and
/// every start or stop first takes a per-service operation lock, so two
/// operations on the same id never interleave while different ids proceed
/// independently.
///
/// Starting is interruptible: once the cancellation token is cancelled, an
/// in-flight readiness wait is abandoned (its process killed) and the call
/// returns [`Error::Aborted`].
pub struct Supervisor {
    catalog: Arc<dyn ServiceCatalog>,
    runtime: Arc<dyn ContainerRuntime>,
    launcher: ProcessLauncher,
    log_sink: LogSink,
    options: SupervisorOptions,
    pub(super) registry: Mutex<Registry>,
    op_locks: parking_lot::Mutex<HashMap<String, Arc<Mutex<()>>>>,
    cancellation_token: CancellationToken,
}

impl Supervisor {
    pub fn new(
        catalog: Arc<dyn ServiceCatalog>,
        runtime: Arc<dyn ContainerRuntime>,
        log_sink: LogSink,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            catalog,
            runtime,
            launcher: ProcessLauncher::new(),
            log_sink,
            options,
            registry: Mutex::new(Registry::new()),
            op_locks: parking_lot::Mutex::new(HashMap::new()),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Supervisor wired from resolved settings: runtime kind, log location
    /// and timings.
    pub fn from_settings(settings: &Settings, catalog: Arc<dyn ServiceCatalog>) -> Self {
        Self::new(
            catalog,
            runtime_for(settings),
            LogSink::new(&settings.logs_dir, &settings.log_category),
            SupervisorOptions::from(settings),
        )
    }

    /// Use `token` (typically the shutdown coordinator's) to abort starts.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn catalog(&self) -> &dyn ServiceCatalog {
        self.catalog.as_ref()
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    pub fn log_sink(&self) -> &LogSink {
        &self.log_sink
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    pub fn cancel_operations(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    fn op_lock(&self, service_id: &str) -> Arc<Mutex<()>> {
        self.op_locks
            .lock()
            .entry(service_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry of `service_id` once no other operation holds it.
    fn release_op_lock(&self, service_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        let mut locks = self.op_locks.lock();
        if locks
            .get(service_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(service_id);
        }
    }

    /// Start the catalog service `service_id`.
    pub async fn start(&self, service_id: &str) -> Result<ProcessInfo> {
        let descriptor = self.catalog.get(service_id)?;
        self.start_service(&descriptor).await
    }

    /// Start one service and wait until it is ready.
    ///
    /// A previous instance of the same id is stopped first. The new process is
    /// only registered once every start pattern matched; on any failure it is
    /// killed and the full service log is attached to the returned
    /// [`Error::StartupFailed`].
    #[tracing::instrument(skip(self, descriptor), fields(service.id = %descriptor.id))]
    pub async fn start_service(&self, descriptor: &ServiceDescriptor) -> Result<ProcessInfo> {
        let lock = self.op_lock(&descriptor.id);
        let result = {
            let _guard = lock.clone().lock_owned().await;
            self.start_service_locked(descriptor).await
        };
        self.release_op_lock(&descriptor.id, lock);
        result
    }

    async fn start_service_locked(&self, descriptor: &ServiceDescriptor) -> Result<ProcessInfo> {
        let id = descriptor.id.as_str();
        if self.is_cancelled() {
            return Err(Error::Aborted);
        }

        if let Err(e) = self.stop_service_locked(id).await {
            tracing::warn!("Stopping previous instance of '{}' failed: {}", id, e);
        }

        let log = self.log_sink.open(id)?;
        let command = self.runtime.launch_command(descriptor);
        log.write_line(&format!("Starting '{}'", id))?;
        log.write_line(&command.render())?;

        // Positioned before the spawn, so the first line of output is seen.
        let mut tail = log.tail()?;
        let mut handle = self.launcher.launch(id, &command, &log)?;
        tracing::info!("Starting '{}' (PID {:?})", id, handle.pid());

        let matcher = ReadinessMatcher::new(descriptor.startup_patterns.clone())
            .with_poll_interval(self.options.tail_interval);
        let waited = tokio::select! {
            outcome = matcher.wait_on_tail(&mut tail, &mut handle, self.options.startup_timeout) => Some(outcome),
            _ = self.cancellation_token.cancelled() => None,
        };

        let outcome = match waited {
            Some(Ok(outcome)) => outcome,
            Some(Err(e)) => {
                self.discard(&mut handle, &log).await;
                return Err(e);
            }
            None => {
                tracing::warn!("Start of '{}' aborted", id);
                self.discard(&mut handle, &log).await;
                return Err(Error::Aborted);
            }
        };

        let failure = match outcome {
            ReadinessOutcome::Ready => self.settle(&mut handle).await?,
            ReadinessOutcome::TimedOut => {
                Some(StartupFailure::TimedOut(self.options.startup_timeout))
            }
            ReadinessOutcome::ProcessExited(exit_code) => {
                Some(StartupFailure::UnexpectedExit { exit_code })
            }
        };

        if let Some(reason) = failure {
            tracing::error!("Starting '{}' failed: {}", id, reason);
            self.discard(&mut handle, &log).await;
            let captured = match log.read_all() {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!("Failed to read log of '{}': {}", id, e);
                    String::new()
                }
            };
            return Err(Error::StartupFailed {
                service: id.to_string(),
                reason,
                log: captured,
            });
        }

        let info = handle.info();
        let replaced = self.registry.lock().await.insert(handle);
        if let Some(mut stale) = replaced {
            tracing::warn!("Replacing an untracked instance of '{}'", id);
            stale.kill().await?;
        }
        tracing::info!("'{}' is running", id);
        Ok(info)
    }

    /// Let a ready process run for the settle period and check it is still up.
    async fn settle(&self, handle: &mut ProcessHandle) -> Result<Option<StartupFailure>> {
        if !self.options.settle_period.is_zero() {
            tokio::time::sleep(self.options.settle_period).await;
        }
        Ok(match handle.poll()? {
            ProcessState::Exited(Some(0)) => {
                tracing::debug!("'{}' exited cleanly after becoming ready", handle.service_id());
                None
            }
            ProcessState::Exited(Some(exit_code)) => Some(StartupFailure::NonZeroExit { exit_code }),
            ProcessState::Exited(None) => Some(StartupFailure::UnexpectedExit { exit_code: None }),
            ProcessState::NotStarted | ProcessState::Running | ProcessState::Killed => None,
        })
    }

    /// Best-effort teardown of a launch that is not going to be registered.
    async fn discard(&self, handle: &mut ProcessHandle, log: &LogHandle) {
        if let Err(e) = handle.kill().await {
            tracing::warn!("Failed to kill '{}': {}", handle.service_id(), e);
        }
        if let Err(e) = self.runtime.stop(handle.service_id(), Some(log)).await {
            tracing::warn!("Failed to stop '{}' through {}: {}", handle.service_id(), self.runtime.name(), e);
        }
    }

    /// Start every catalog service, in catalog order.
    pub async fn start_all(&self) -> Result<Vec<ProcessInfo>> {
        let descriptors = self.catalog.all();
        self.start_all_with(&descriptors, |_| {}).await
    }

    /// Start `descriptors` one after the other, calling `on_ready` after each.
    ///
    /// The first failure stops everything this call started, newest first,
    /// before the error is returned.
    pub async fn start_all_with<F>(
        &self,
        descriptors: &[ServiceDescriptor],
        mut on_ready: F,
    ) -> Result<Vec<ProcessInfo>>
    where
        F: FnMut(&ProcessInfo),
    {
        let mut started = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let result = if self.is_cancelled() {
                Err(Error::Aborted)
            } else {
                self.start_service(descriptor).await
            };

            match result {
                Ok(info) => {
                    on_ready(&info);
                    started.push(info);
                }
                Err(e) => {
                    self.rollback(&started).await;
                    return Err(e);
                }
            }
        }
        Ok(started)
    }

    async fn rollback(&self, started: &[ProcessInfo]) {
        if started.is_empty() {
            return;
        }
        tracing::info!("Rolling back {} started service(s)", started.len());
        for info in started.iter().rev() {
            if let Err(e) = self.stop_service(&info.service_id).await {
                tracing::warn!("Rollback of '{}' failed: {}", info.service_id, e);
            }
        }
    }

    /// Stop `service_id`. Stopping a service that is not running succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn stop_service(&self, service_id: &str) -> Result<()> {
        let lock = self.op_lock(service_id);
        let result = {
            let _guard = lock.clone().lock_owned().await;
            self.stop_service_locked(service_id).await
        };
        self.release_op_lock(service_id, lock);
        result
    }

    async fn stop_service_locked(&self, service_id: &str) -> Result<()> {
        let handle = self.registry.lock().await.remove(service_id);

        let log = match self.log_sink.open(service_id) {
            Ok(log) => Some(log),
            Err(e) => {
                tracing::debug!("No log for stopping '{}': {}", service_id, e);
                None
            }
        };
        if handle.is_some() {
            if let Some(log) = &log {
                if let Err(e) = log.write_line(&format!("Stopping '{}'", service_id)) {
                    tracing::debug!("Failed to write stop header of '{}': {}", service_id, e);
                }
            }
        }

        let mut failure = self
            .runtime
            .stop(service_id, log.as_ref())
            .await
            .err()
            .map(|e| e.to_string());

        if let Some(mut handle) = handle {
            match handle.terminate(self.options.stop_grace_period).await {
                Ok(state) => tracing::debug!("'{}' ended: {}", service_id, state),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e.to_string());
                    }
                }
            }
            tracing::info!("Stopped '{}'", service_id);
        }

        match failure {
            Some(message) => Err(Error::Stop(StopError::new(service_id, message))),
            None => Ok(()),
        }
    }

    /// Stop every tracked service, newest first. Every service is attempted.
    pub async fn stop_all(&self) -> StopReport {
        let mut ids = self.registry.lock().await.ids();
        ids.reverse();
        self.stop_services(&ids, |_| {}).await
    }

    /// Stop `service_ids` in the given order, calling `on_stopped` after each
    /// successful stop and collecting every failure.
    pub async fn stop_services<F>(&self, service_ids: &[String], mut on_stopped: F) -> StopReport
    where
        F: FnMut(&str),
    {
        let mut report = StopReport::default();
        for id in service_ids {
            match self.stop_service(id).await {
                Ok(()) => {
                    on_stopped(id);
                    report.stopped.push(id.clone());
                }
                Err(Error::Stop(e)) => report.errors.push(e),
                Err(other) => report.errors.push(StopError::new(id, other.to_string())),
            }
        }
        report
    }

    pub async fn running_services(&self) -> Vec<ProcessInfo> {
        self.registry.lock().await.snapshot()
    }

    pub async fn is_running(&self, service_id: &str) -> bool {
        self.registry
            .lock()
            .await
            .get(service_id)
            .is_some_and(ProcessHandle::is_running)
    }

    /// Drop tracked services whose process ended on its own.
    pub async fn reap_exited(&self) -> Vec<(String, ProcessState)> {
        let reaped = self.registry.lock().await.reap_exited();
        for (id, state) in &reaped {
            tracing::warn!("Process terminated: '{}' result: {}", id, state);
        }
        reaped
    }
}
