//! Shutdown of a foreground run: a termination signal stops every tracked
//! service exactly once, newest first.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;
use vehicle_runtime::service::LogSink;
use vehicle_runtime::{
    NativeRuntime, ServiceDescriptor, ShutdownCoordinator, StaticCatalog, Supervisor,
    SupervisorOptions, WatchExit,
};

fn supervisor(logs: &std::path::Path, ids: &[&str]) -> Supervisor {
    let services = ids
        .iter()
        .map(|id| {
            ServiceDescriptor::new(*id, "sh")
                .args(["-c", "echo up; sleep 30"])
                .startup_pattern("up")
                .unwrap()
        })
        .collect();
    Supervisor::new(
        Arc::new(StaticCatalog::new(services).unwrap()),
        Arc::new(NativeRuntime::new()),
        LogSink::new(logs, "runtime_local"),
        SupervisorOptions {
            startup_timeout: Duration::from_secs(5),
            tail_interval: Duration::from_millis(20),
            stop_grace_period: Duration::from_secs(1),
            settle_period: Duration::ZERO,
        },
    )
}

#[tokio::test]
async fn test_sigterm_stops_all_in_reverse_order() {
    let logs = tempfile::tempdir().unwrap();
    let shutdown = ShutdownCoordinator::new();
    shutdown.install();

    let sup = supervisor(logs.path(), &["broker", "databroker", "app"]).with_cancellation(shutdown.token());
    sup.start_all().await.unwrap();
    let pids: Vec<u32> = sup
        .running_services()
        .await
        .iter()
        .filter_map(|i| i.pid)
        .collect();
    assert_eq!(pids.len(), 3);

    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        nix::sys::signal::kill(nix::unistd::getpid(), nix::sys::signal::Signal::SIGTERM).unwrap();
    });

    let exit = sup
        .run_until_shutdown(&shutdown.token(), Duration::from_millis(100), |_, _| {})
        .await;
    match exit {
        WatchExit::Shutdown(report) => {
            assert!(report.is_clean());
            assert_eq!(report.stopped, vec!["app", "databroker", "broker"]);
        }
        other => panic!("expected shutdown, got {:?}", other),
    }

    assert!(shutdown.is_shutting_down());
    assert!(sup.running_services().await.is_empty());
    for pid in pids {
        let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok();
        assert!(!alive, "process {} survived shutdown", pid);
    }
}

#[tokio::test]
async fn test_repeated_shutdown_requests_stop_once() {
    let logs = tempfile::tempdir().unwrap();
    let shutdown = ShutdownCoordinator::new();
    let sup = supervisor(logs.path(), &["broker"]);
    sup.start("broker").await.unwrap();

    shutdown.trigger();
    shutdown.trigger();

    let exit = sup
        .run_until_shutdown(&shutdown.token(), Duration::from_millis(100), |_, _| {})
        .await;
    assert!(matches!(exit, WatchExit::Shutdown(ref r) if r.stopped == vec!["broker"]));
    assert_eq!(shutdown.requests(), 2);

    // A later stop-all finds nothing left to do.
    assert!(sup.stop_all().await.stopped.is_empty());
}

#[tokio::test]
async fn test_cancelled_token_blocks_new_starts() {
    let logs = tempfile::tempdir().unwrap();
    let shutdown = ShutdownCoordinator::new();
    let sup = supervisor(logs.path(), &["broker", "app"]).with_cancellation(shutdown.token());

    shutdown.trigger();
    assert!(matches!(
        sup.start_all().await,
        Err(vehicle_runtime::Error::Aborted)
    ));
    assert!(sup.running_services().await.is_empty());
}
