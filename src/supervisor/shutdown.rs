//! Shutdown coordination for a foreground run.
//!
//! Signal handlers never touch supervisor state. They only cancel a
//! [`CancellationToken`]; the foreground loop in
//! [`Supervisor::run_until_shutdown`] observes the token and performs the
//! stop-all itself, exactly once.

use super::{StopReport, Supervisor};
use crate::service::ProcessState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Turns SIGINT/SIGTERM into a one-shot cancellation.
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    signals: Arc<AtomicUsize>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token cancelled on the first shutdown request.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown. Requests after the first are counted and ignored.
    pub fn trigger(&self) {
        let count = self.signals.fetch_add(1, Ordering::SeqCst) + 1;
        if count == 1 {
            tracing::info!("Shutdown requested, stopping services");
            self.token.cancel();
        } else {
            tracing::warn!("Shutdown already in progress, ignoring repeated request");
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of shutdown requests received so far.
    pub fn requests(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }

    /// Listen for SIGINT and SIGTERM for the rest of the process lifetime.
    ///
    /// The handlers are registered before this returns; the listening loop
    /// runs in a background task. Must be called from within a tokio runtime.
    #[cfg(unix)]
    pub fn install(&self) {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Failed to create SIGINT handler: {}", e);
                None
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!("Failed to create SIGTERM handler: {}", e);
                None
            }
        };

        if sigint.is_none() && sigterm.is_none() {
            tracing::warn!("No signal handlers available - process can only be terminated externally");
            return;
        }

        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = async {
                        match sigint.as_mut() {
                            Some(s) => s.recv().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        tracing::debug!("Received SIGINT");
                        coordinator.trigger();
                    }
                    Some(()) = async {
                        match sigterm.as_mut() {
                            Some(s) => s.recv().await,
                            None => std::future::pending().await,
                        }
                    } => {
                        tracing::debug!("Received SIGTERM");
                        coordinator.trigger();
                    }
                    else => break,
                }
            }
        });
    }

    #[cfg(not(unix))]
    pub fn install(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                coordinator.trigger();
            }
        });
    }
}

/// Why [`Supervisor::run_until_shutdown`] returned.
#[derive(Debug)]
pub enum WatchExit {
    /// Shutdown was requested; every tracked service was stopped.
    Shutdown(StopReport),
    /// Every tracked process ended on its own.
    AllExited,
}

impl Supervisor {
    /// Foreground loop of a run.
    ///
    /// Polls tracked processes every `interval`, dropping (and reporting
    /// through `on_exit`) those that died on their own without touching their
    /// siblings. Returns once `shutdown` is cancelled, after stopping all
    /// services, or once nothing is left running.
    pub async fn run_until_shutdown<F>(
        &self,
        shutdown: &CancellationToken,
        interval: Duration,
        mut on_exit: F,
    ) -> WatchExit
    where
        F: FnMut(&str, ProcessState),
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    let report = self.stop_all().await;
                    return WatchExit::Shutdown(report);
                }
                _ = ticker.tick() => {
                    for (id, state) in self.reap_exited().await {
                        on_exit(&id, state);
                    }
                    if self.registry.lock().await.is_empty() {
                        tracing::info!("No services left running");
                        return WatchExit::AllExited;
                    }
                }
            }
        }
    }
}
