//! Smoke tests of the `vrt` binary against a temporary workspace.

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn vrt_binary() -> String {
    env!("CARGO_BIN_EXE_vrt").to_string()
}

fn vrt(workspace: &Path) -> Command {
    let mut cmd = Command::new(vrt_binary());
    cmd.args(["-w", workspace.to_str().unwrap(), "--runtime", "native"])
        .env_remove("VRT_RUNTIME")
        .env_remove("VRT_CATALOG")
        .env_remove("VRT_LOGS_DIR")
        .env_remove("VRT_STARTUP_TIMEOUT");
    cmd
}

fn sh_service(id: &str, script: &str, pattern: Option<&str>) -> serde_json::Value {
    let mut config = vec![
        serde_json::json!({ "key": "image", "value": "sh" }),
        serde_json::json!({ "key": "arg", "value": "-c" }),
        serde_json::json!({ "key": "arg", "value": script }),
    ];
    if let Some(pattern) = pattern {
        config.push(serde_json::json!({ "key": "start-pattern", "value": pattern }));
    }
    serde_json::json!({ "id": id, "interfaces": [], "config": config })
}

fn workspace(services: Vec<serde_json::Value>) -> TempDir {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    fs::write(
        dir.path().join("runtime.json"),
        serde_json::to_string_pretty(&services).unwrap(),
    )
    .expect("Failed to write runtime.json");
    dir
}

fn text(output: &Output) -> (String, String) {
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

fn log_path(workspace: &Path, id: &str) -> std::path::PathBuf {
    workspace
        .join("logs")
        .join("runtime_local")
        .join(format!("{}.log", id))
}

fn wait_for_log(workspace: &Path, id: &str, needle: &str, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Ok(content) = fs::read_to_string(log_path(workspace, id)) {
            if content.contains(needle) {
                return;
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("'{}' never appeared in the log of '{}'", needle, id);
}

fn signal(child: &Child, sig: nix::sys::signal::Signal) {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(child.id() as i32), sig)
        .expect("Failed to signal vrt");
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if child.try_wait().expect("Failed to poll vrt").is_some() {
            return child.wait_with_output().expect("Failed to collect output");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    child.kill().ok();
    panic!("vrt did not exit within {:?}", timeout);
}

#[test]
fn test_unknown_service_lists_available() {
    let ws = workspace(vec![
        sh_service("mqtt-broker", "sleep 30", None),
        sh_service("vehicledatabroker", "sleep 30", None),
    ]);

    let output = vrt(ws.path())
        .args(["start", "foo_bar_baz"])
        .output()
        .expect("Failed to run vrt");
    let (_, stderr) = text(&output);

    assert!(!output.status.success());
    assert!(stderr.contains("Error: Service with id 'foo_bar_baz' not defined"));
    assert!(stderr.contains("Available services:"));
    assert!(stderr.contains(" * 'mqtt-broker'"));
    assert!(stderr.contains(" * 'vehicledatabroker'"));
    assert!(!log_path(ws.path(), "foo_bar_baz").exists());
}

#[test]
fn test_list_shows_catalog() {
    let ws = workspace(vec![sh_service("broker", "sleep 30", Some("listening on port"))]);

    let output = vrt(ws.path()).arg("list").output().expect("Failed to run vrt");
    let (stdout, _) = text(&output);
    assert!(output.status.success());
    assert!(stdout.contains(" * 'broker' (sh)"));
    assert!(stdout.contains("listening on port"));

    let output = vrt(ws.path())
        .args(["list", "--json"])
        .output()
        .expect("Failed to run vrt");
    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(parsed[0]["id"], "broker");
    assert_eq!(parsed[0]["start_patterns"][0], "listening on port");
}

#[test]
fn test_missing_catalog_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = vrt(dir.path()).arg("list").output().expect("Failed to run vrt");
    let (_, stderr) = text(&output);
    assert!(!output.status.success());
    assert!(stderr.contains("runtime.json"));
}

#[test]
fn test_start_all_failure_dumps_log_and_rolls_back() {
    let ws = workspace(vec![
        sh_service("ok", "echo ready; sleep 30", Some("ready")),
        sh_service("bad", "echo crashing; exit 1", Some("never printed")),
    ]);

    let output = vrt(ws.path())
        .args(["--timeout", "5s", "start-all"])
        .output()
        .expect("Failed to run vrt");
    let (stdout, stderr) = text(&output);

    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr);
    assert!(stdout.contains("> ok running"));
    assert!(!stdout.contains("Runtime is ready to use!"));
    assert!(stdout.contains(">>>> Start log of bad >>>>"));
    assert!(stdout.contains("crashing"));
    assert!(stdout.contains("<<<< End log of bad <<<<"));
    assert!(stderr.contains("exit code 1"));
}

#[test]
fn test_sigterm_stops_running_services() {
    let ws = workspace(vec![sh_service("ok", "echo ready; sleep 30", Some("ready"))]);

    let child = vrt(ws.path())
        .arg("start-all")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn vrt");

    wait_for_log(ws.path(), "ok", "ready", Duration::from_secs(10));
    std::thread::sleep(Duration::from_millis(700));
    signal(&child, nix::sys::signal::Signal::SIGTERM);

    let output = wait_with_timeout(child, Duration::from_secs(15));
    let (stdout, stderr) = text(&output);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stdout.contains("Runtime is ready to use!"));
    assert!(stdout.contains("> ok stopped"));
}

#[test]
fn test_interrupt_during_startup_exits_130() {
    let ws = workspace(vec![sh_service("slow", "echo booting; sleep 30", Some("never printed"))]);

    let child = vrt(ws.path())
        .args(["--timeout", "30s", "start", "slow"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn vrt");

    wait_for_log(ws.path(), "slow", "booting", Duration::from_secs(10));
    signal(&child, nix::sys::signal::Signal::SIGINT);

    let output = wait_with_timeout(child, Duration::from_secs(10));
    assert_eq!(output.status.code(), Some(130));
}

#[test]
fn test_stop_all_acknowledges_each_service() {
    let ws = workspace(vec![
        sh_service("a", "sleep 30", None),
        sh_service("b", "sleep 30", None),
    ]);

    let output = vrt(ws.path()).arg("stop-all").output().expect("Failed to run vrt");
    let (stdout, stderr) = text(&output);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stdout.contains("> a stopped"));
    assert!(stdout.contains("> b stopped"));
}

#[test]
fn test_invalid_runtime_flag_is_rejected() {
    let ws = workspace(Vec::new());
    let output = Command::new(vrt_binary())
        .args(["-w", ws.path().to_str().unwrap(), "--runtime", "podman", "list"])
        .output()
        .expect("Failed to run vrt");
    assert!(!output.status.success());
}

fn brokers() -> Vec<serde_json::Value> {
    vec![
        serde_json::json!({ "id": "vehicledatabroker", "config": [
            { "key": "image", "value": "databroker" },
            { "key": "port", "value": "55555" },
        ]}),
        serde_json::json!({ "id": "mqtt-broker", "config": [
            { "key": "image", "value": "mosquitto" },
            { "key": "port", "value": "1883" },
        ]}),
    ]
}

#[test]
fn test_run_app_gets_middleware_env() {
    let ws = workspace(brokers());

    let output = vrt(ws.path())
        .args(["run-app", "-e", "APP_NAME=seat-adjuster", "--", "sh", "-c"])
        .arg("echo \"$SDV_MIDDLEWARE_TYPE $SDV_VEHICLEDATABROKER_ADDRESS $SDV_MQTT_ADDRESS $APP_NAME\"")
        .output()
        .expect("Failed to run vrt");
    let (stdout, stderr) = text(&output);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert_eq!(
        stdout.trim(),
        "native grpc://127.0.0.1:55555 mqtt://127.0.0.1:1883 seat-adjuster"
    );
}

#[test]
fn test_run_app_propagates_exit_code() {
    let ws = workspace(brokers());

    let output = vrt(ws.path())
        .args(["run-app", "--", "sh", "-c", "exit 7"])
        .output()
        .expect("Failed to run vrt");
    assert_eq!(output.status.code(), Some(7));
    let (_, stderr) = text(&output);
    assert!(!stderr.contains("Error:"), "stderr: {}", stderr);
}

#[test]
fn test_run_app_without_broker_port_fails() {
    let ws = workspace(vec![sh_service("vehicledatabroker", "sleep 30", None)]);

    let output = vrt(ws.path())
        .args(["run-app", "true"])
        .output()
        .expect("Failed to run vrt");
    assert_eq!(output.status.code(), Some(1));
    let (_, stderr) = text(&output);
    assert!(stderr.contains("port"), "stderr: {}", stderr);
}

#[test]
fn test_workspace_from_environment() {
    let ws = workspace(vec![sh_service("broker", "sleep 30", None)]);
    let elsewhere = tempfile::tempdir().expect("Failed to create temp dir");

    let output = Command::new(vrt_binary())
        .args(["--runtime", "native", "list"])
        .current_dir(elsewhere.path())
        .env("VRT_WORKSPACE_DIR", ws.path())
        .env_remove("VRT_CATALOG")
        .output()
        .expect("Failed to run vrt");
    let (stdout, stderr) = text(&output);
    assert!(output.status.success(), "stderr: {}", stderr);
    assert!(stdout.contains("'broker'"));
}
