//! Backend server bootstrap.
//!
//! Engines running distributed need their server reachable before any job
//! is submitted. `ensure_server_running` probes the configured address,
//! launches the start script when nothing answers, and retries the
//! connection until the server is up or the attempts are spent. A process
//! wide lock serializes concurrent bootstraps of the same installation.

use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use fdp_common::{BootstrapError, ServerConfig};
use tracing::{debug, info, warn};

/// Parses a server address out of one line of start-script output. Some
/// servers pick their port at startup and announce it on stdout.
pub type AddressParser = Arc<dyn Fn(&str) -> Option<SocketAddr> + Send + Sync>;

/// Tunable bootstrap timings. Defaults match the production behavior; tests
/// shrink them.
#[derive(Clone)]
pub struct BootstrapOptions {
    /// Timeout for each TCP probe.
    pub probe_timeout: Duration,
    /// Connection attempts after launching the script.
    pub retries: u32,
    /// Sleep between connection attempts.
    pub retry_delay: Duration,
    /// Settle time after the first successful connect, so the server can
    /// finish initializing before jobs arrive.
    pub startup_grace: Duration,
    /// Extra environment for the start script.
    pub env: Vec<(String, String)>,
    /// Optional parser applied to the script's output lines.
    pub parse_address: Option<AddressParser>,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            retries: 5,
            retry_delay: Duration::from_secs(5),
            startup_grace: Duration::from_secs(15),
            env: Vec::new(),
            parse_address: None,
        }
    }
}

/// Outcome of a successful bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStart {
    /// The server already answered the first probe.
    AlreadyRunning,
    /// The start script was launched and the server came up.
    Started,
}

// Serializes bootstraps process-wide. Two engines starting the same server
// installation concurrently would race on ports and lock files.
static SERVER_START_LOCK: Mutex<()> = Mutex::new(());

/// Make sure the configured server is reachable, starting it if needed.
///
/// The spawned process is left running; shutdown of servers is out of
/// scope and never forced from here.
pub fn ensure_server_running(
    server: &ServerConfig,
    options: &BootstrapOptions,
) -> Result<ServerStart, BootstrapError> {
    let mut addr = resolve_address(&server.address)?;

    let _guard = match SERVER_START_LOCK.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };

    if TcpStream::connect_timeout(&addr, options.probe_timeout).is_ok() {
        info!(%addr, operator = "Bootstrap", "server already running");
        return Ok(ServerStart::AlreadyRunning);
    }

    let missing: Vec<_> = server
        .required_files
        .iter()
        .filter(|path| !path.exists())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(BootstrapError::MissingRequiredFiles(missing));
    }
    check_script(&server.start_script)?;

    info!(
        script = %server.start_script.display(),
        %addr,
        operator = "Bootstrap",
        "starting server"
    );
    let mut command = Command::new(&server.start_script);
    command
        .envs(options.env.iter().cloned())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null());
    let mut child = command.spawn().map_err(|e| BootstrapError::SpawnFailed {
        script: server.start_script.clone(),
        reason: e.to_string(),
    })?;

    let (addr_tx, addr_rx) = mpsc::channel();
    if let Some(stdout) = child.stdout.take() {
        spawn_output_logger(stdout, options.parse_address.clone(), Some(addr_tx));
    }
    if let Some(stderr) = child.stderr.take() {
        spawn_output_logger(stderr, None, None);
    }
    // The child is deliberately not waited on or killed; the server outlives
    // this run.
    drop(child);

    for attempt in 1..=options.retries {
        thread::sleep(options.retry_delay);
        if let Ok(parsed) = addr_rx.try_recv() {
            info!(old = %addr, new = %parsed, operator = "Bootstrap", "server announced its address");
            addr = parsed;
        }
        match TcpStream::connect_timeout(&addr, options.probe_timeout) {
            Ok(_) => {
                info!(%addr, attempt, operator = "Bootstrap", "server is up");
                thread::sleep(options.startup_grace);
                return Ok(ServerStart::Started);
            }
            Err(e) => {
                debug!(%addr, attempt, error = %e, operator = "Bootstrap", "connect failed");
            }
        }
    }
    Err(BootstrapError::ServerUnreachable {
        addr,
        attempts: options.retries,
    })
}

fn resolve_address(address: &str) -> Result<SocketAddr, BootstrapError> {
    address
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| BootstrapError::InvalidAddress(address.to_string()))
}

fn check_script(script: &Path) -> Result<(), BootstrapError> {
    if !script.is_file() {
        return Err(BootstrapError::SpawnFailed {
            script: script.to_path_buf(),
            reason: "start script not found".to_string(),
        });
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = script
            .metadata()
            .map_err(|e| BootstrapError::SpawnFailed {
                script: script.to_path_buf(),
                reason: e.to_string(),
            })?
            .permissions()
            .mode();
        if mode & 0o111 == 0 {
            return Err(BootstrapError::ScriptNotExecutable(script.to_path_buf()));
        }
    }
    Ok(())
}

fn spawn_output_logger(
    stream: impl std::io::Read + Send + 'static,
    parse: Option<AddressParser>,
    addr_tx: Option<mpsc::Sender<SocketAddr>>,
) {
    thread::spawn(move || {
        let reader = BufReader::new(stream);
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            debug!(operator = "ServerOutput", "{line}");
            if let (Some(parse), Some(tx)) = (&parse, &addr_tx) {
                if let Some(addr) = parse(&line) {
                    if tx.send(addr).is_err() {
                        warn!(operator = "Bootstrap", "parsed address after bootstrap finished");
                    }
                }
            }
        }
    });
}
