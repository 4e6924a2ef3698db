//! Server bootstrap behavior against real sockets and scripts.

#![cfg(unix)]

use std::fs;
use std::net::TcpListener;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fdp_common::{BootstrapError, ServerConfig};
use fdp_engine::bootstrap::{ensure_server_running, BootstrapOptions, ServerStart};

fn fast_options() -> BootstrapOptions {
    BootstrapOptions {
        probe_timeout: Duration::from_millis(200),
        retries: 2,
        retry_delay: Duration::from_millis(50),
        startup_grace: Duration::from_millis(10),
        env: Vec::new(),
        parse_address: None,
    }
}

fn write_script(dir: &Path, name: &str, mode: u32) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
    path
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("fdp-bootstrap-tests").join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn already_running_server_is_detected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ServerConfig {
        address: addr.to_string(),
        start_script: PathBuf::from("/nonexistent/start.sh"),
        required_files: Vec::new(),
    };
    assert_eq!(
        ensure_server_running(&server, &fast_options()).unwrap(),
        ServerStart::AlreadyRunning
    );
}

#[test]
fn missing_required_files_block_the_start() {
    let dir = test_dir("missing-files");
    let script = write_script(&dir, "start.sh", 0o755);
    let missing = dir.join("conf/server.conf");
    let server = ServerConfig {
        address: "127.0.0.1:1".to_string(),
        start_script: script,
        required_files: vec![missing.clone()],
    };
    match ensure_server_running(&server, &fast_options()) {
        Err(BootstrapError::MissingRequiredFiles(files)) => assert_eq!(files, vec![missing]),
        other => panic!("expected MissingRequiredFiles, got {other:?}"),
    }
}

#[test]
fn non_executable_script_is_rejected() {
    let dir = test_dir("not-executable");
    let script = write_script(&dir, "start.sh", 0o644);
    let server = ServerConfig {
        address: "127.0.0.1:1".to_string(),
        start_script: script.clone(),
        required_files: Vec::new(),
    };
    match ensure_server_running(&server, &fast_options()) {
        Err(BootstrapError::ScriptNotExecutable(path)) => assert_eq!(path, script),
        other => panic!("expected ScriptNotExecutable, got {other:?}"),
    }
}

#[test]
fn retries_are_exhausted_when_the_server_never_comes_up() {
    let dir = test_dir("retry-exhaustion");
    let script = write_script(&dir, "start.sh", 0o755);
    let server = ServerConfig {
        address: "127.0.0.1:1".to_string(),
        start_script: script,
        required_files: Vec::new(),
    };
    let options = fast_options();
    match ensure_server_running(&server, &options) {
        Err(BootstrapError::ServerUnreachable { attempts, .. }) => {
            assert_eq!(attempts, options.retries)
        }
        other => panic!("expected ServerUnreachable, got {other:?}"),
    }
}

#[test]
fn announced_address_overrides_the_configured_one() {
    // The script announces the real listener; the configured address points
    // at a dead port.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = test_dir("announced-address");
    let script = dir.join("start.sh");
    fs::write(&script, format!("#!/bin/sh\necho \"listening on {addr}\"\n")).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let mut options = fast_options();
    options.parse_address = Some(std::sync::Arc::new(|line: &str| {
        line.split("listening on ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|a| a.parse().ok())
    }));
    let server = ServerConfig {
        address: "127.0.0.1:1".to_string(),
        start_script: script,
        required_files: Vec::new(),
    };
    assert_eq!(
        ensure_server_running(&server, &options).unwrap(),
        ServerStart::Started
    );
}

#[test]
fn unresolvable_address_is_reported() {
    let server = ServerConfig {
        address: "not-an-address".to_string(),
        start_script: PathBuf::from("/nonexistent/start.sh"),
        required_files: Vec::new(),
    };
    assert!(matches!(
        ensure_server_running(&server, &fast_options()),
        Err(BootstrapError::InvalidAddress(_))
    ));
}
