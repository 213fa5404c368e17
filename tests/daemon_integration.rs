//! Integration tests for the supervisor daemon.
//!
//! These tests run the real binary end to end: singleton enforcement over
//! the control endpoint, remote stop, output forwarding, and the fatal
//! startup paths. Each test isolates itself with a unique control endpoint
//! name and its own defaults file.

use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::time::sleep;

use appcontrollerd::control::ControlChannel;

const BIN: &str = env!("CARGO_BIN_EXE_appcontrollerd");

/// Build a command against the binary with an isolated control endpoint and
/// defaults file.
fn daemon_cmd(control_name: &str, conf: &str) -> Command {
    let mut cmd = Command::new(BIN);
    cmd.env("APPCONTROLLER_CONTROL_NAME", control_name)
        .env("APPCONTROLLER_CONF", conf)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn unique_name(tag: &str) -> String {
    format!("appcontrollerd-it-{}-{}", std::process::id(), tag)
}

/// Wait until a daemon instance holds the given control endpoint.
async fn wait_until_held(channel: &ControlChannel) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match channel.try_bind().unwrap() {
            // Free: release it right back and keep waiting.
            Some(listener) => drop(listener),
            None => return,
        }
        assert!(
            Instant::now() < deadline,
            "daemon never acquired the control endpoint"
        );
        sleep(Duration::from_millis(50)).await;
    }
}

/// Wait for a child with a deadline, killing it on timeout so a broken
/// daemon cannot hang the test suite.
fn wait_with_deadline(mut child: Child, deadline: Duration) -> Output {
    let start = Instant::now();
    loop {
        if child.try_wait().unwrap().is_some() {
            return child.wait_with_output().unwrap();
        }
        if start.elapsed() > deadline {
            let _ = child.kill();
            let output = child.wait_with_output().unwrap();
            panic!(
                "daemon did not exit within {:?}; stderr: {}",
                deadline,
                String::from_utf8_lossy(&output.stderr)
            );
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[tokio::test]
async fn test_stop_without_running_instance_exits_zero() {
    let output = daemon_cmd(&unique_name("stop-noop"), "/nonexistent.conf")
        .arg("--stop")
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[tokio::test]
async fn test_show_platform_prints_defaults_file_identity() {
    let dir = TempDir::new().unwrap();
    let conf = dir.path().join("appcontroller.conf");
    std::fs::write(&conf, "base=imx8\nplatform=imx8-eglfs\n").unwrap();

    let output = daemon_cmd(&unique_name("show-platform"), conf.to_str().unwrap())
        .arg("--show-platform")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "base:imx8\nplatform:imx8-eglfs\n");
}

#[tokio::test]
async fn test_show_platform_without_defaults_file_is_unknown() {
    let output = daemon_cmd(&unique_name("show-unknown"), "/nonexistent.conf")
        .arg("--show-platform")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "base:unknown\nplatform:unknown\n");
}

#[tokio::test]
async fn test_child_output_is_forwarded_and_daemon_exits_zero() {
    let child = daemon_cmd(&unique_name("forward"), "/nonexistent.conf")
        .args(["echo", "hello from the target"])
        .spawn()
        .unwrap();

    let output = wait_with_deadline(child, Duration::from_secs(10));
    assert!(output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("hello from the target"),
        "child stdout should pass through the daemon"
    );
}

#[tokio::test]
async fn test_defaults_append_args_reach_the_child() {
    let dir = TempDir::new().unwrap();
    let conf = dir.path().join("appcontroller.conf");
    std::fs::write(&conf, "append=from-defaults\n").unwrap();

    let child = daemon_cmd(&unique_name("append"), conf.to_str().unwrap())
        .args(["echo", "user-arg"])
        .spawn()
        .unwrap();

    let output = wait_with_deadline(child, Duration::from_secs(10));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("user-arg from-defaults"));
}

#[tokio::test]
async fn test_qml_mode_announces_debug_port() {
    let dir = TempDir::new().unwrap();
    let conf = dir.path().join("appcontroller.conf");
    std::fs::write(&conf, "").unwrap();

    let child = daemon_cmd(&unique_name("qml"), conf.to_str().unwrap())
        .args(["--debug-qml", "--port-range", "40300-40399", "true"])
        .spawn()
        .unwrap();

    let output = wait_with_deadline(child, Duration::from_secs(10));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("QML Debugger: Going to wait for connection on port 40"),
        "unexpected stdout: {stdout}"
    );
}

#[tokio::test]
async fn test_stop_invocation_terminates_live_instance() {
    let name = unique_name("stop-live");
    let channel = ControlChannel::new(name.clone());

    // A live instance supervising a long-running child.
    let daemon = daemon_cmd(&name, "/nonexistent.conf")
        .args(["sleep", "30"])
        .spawn()
        .unwrap();

    wait_until_held(&channel).await;

    let stop = daemon_cmd(&name, "/nonexistent.conf")
        .arg("--stop")
        .output()
        .unwrap();
    assert!(stop.status.success());

    // The instance must terminate its child and exit 0 well before the
    // child's own 30 second runtime.
    let output = wait_with_deadline(daemon, Duration::from_secs(10));
    assert!(output.status.success());
}

#[tokio::test]
async fn test_second_launch_displaces_the_first() {
    let name = unique_name("displace");
    let channel = ControlChannel::new(name.clone());

    let first = daemon_cmd(&name, "/nonexistent.conf")
        .args(["sleep", "30"])
        .spawn()
        .unwrap();
    wait_until_held(&channel).await;

    // The second invocation signals the first, waits for the endpoint, and
    // becomes the sole supervisor for its own child.
    let second = daemon_cmd(&name, "/nonexistent.conf")
        .args(["echo", "second instance ran"])
        .spawn()
        .unwrap();

    let first_output = wait_with_deadline(first, Duration::from_secs(15));
    assert!(first_output.status.success());

    let second_output = wait_with_deadline(second, Duration::from_secs(15));
    assert!(second_output.status.success());
    assert!(String::from_utf8_lossy(&second_output.stdout).contains("second instance ran"));
}

#[tokio::test]
async fn test_fatal_startup_conditions_exit_one() {
    // No arguments at all.
    let output = daemon_cmd(&unique_name("fatal-noargs"), "/nonexistent.conf")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    // Debug mode without a port range.
    let output = daemon_cmd(&unique_name("fatal-norange"), "/nonexistent.conf")
        .args(["--debug-qml", "/bin/true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    // Unparsable port range.
    let output = daemon_cmd(&unique_name("fatal-badrange"), "/nonexistent.conf")
        .args(["--debug-qml", "--port-range", "not-a-range", "/bin/true"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));

    // Missing target binary.
    let output = daemon_cmd(&unique_name("fatal-nobin"), "/nonexistent.conf")
        .args(["/nonexistent/binary/xyz"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
