use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Schema parsing/validation failures.
///
/// Raised before any job is submitted; a bad type string can never reach an
/// engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The key/value type string does not contain exactly a key type and a
    /// value type.
    #[error("malformed key/value types '{0}': must provide a type for both key and value")]
    Malformed(String),

    /// A type token names a primitive the registry does not know.
    #[error("unknown primitive type '{0}'")]
    UnknownPrimitive(String),
}

/// Configuration contract violations.
///
/// Examples:
/// - execution override set without key/value schemas (or vice versa)
/// - unresolvable configuration directory
/// - invalid server-start type for the active engine
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Execution override and input/output schemas must be set together or
    /// cleared together.
    #[error("pattern job '{0}': execution override and key/value schemas must be set together or cleared together")]
    SchemaOverrideMismatch(String),

    /// No configuration directory was given and the per-engine fallback
    /// environment variable is unset.
    #[error("configuration directory not set and environment variable '{0}' is unset")]
    MissingWorkflowDir(String),

    /// The configuration directory does not exist on the file system.
    #[error("configuration directory does not exist: {0}")]
    ConfigDirNotFound(PathBuf),

    /// The server-start type is not supported by the active engine.
    #[error("invalid server-start type '{0}'")]
    InvalidServerType(String),

    /// Job arguments must be of the form `name1 = value1, name2 = value2`.
    #[error("malformed job arguments entry '{0}'")]
    MalformedJobArguments(String),

    /// A data source/sink spec is internally inconsistent.
    #[error("invalid source/sink spec '{name}': {reason}")]
    InvalidIoSpec { name: String, reason: String },

    /// The dispatch configuration file could not be read or parsed.
    #[error("cannot load dispatch configuration from {path}: {reason}")]
    Load { path: PathBuf, reason: String },
}

/// Engine resolution/instantiation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The dispatch configuration lists no engines at all.
    #[error("no engines configured")]
    NoEnginesConfigured,

    /// No engine with the requested name exists in the configuration.
    #[error("engine '{0}' not found in configuration")]
    NotFound(String),

    /// The engine exists but its implementation could not be constructed.
    #[error("could not instantiate engine '{0}': {1}")]
    InstantiationFailed(String, String),
}

/// Job-graph validation failures discovered at preinitialize time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// An entity in the job graph is not a pattern or I/O actor.
    #[error("'{0}' is not a pattern actor")]
    NonPatternActor(String),

    /// A composite pattern actor has no sub-director, so its output types
    /// cannot be resolved statically.
    #[error("'{0}' must contain a director")]
    NotOpaque(String),

    /// A pattern job references a sub-workflow the model does not provide.
    #[error("sub-workflow '{0}' not found")]
    UnknownSubWorkflow(String),

    /// A pattern job has neither a sub-workflow nor an execution override.
    #[error("pattern job '{0}' has no sub-workflow and no execution override")]
    NoExecutionTarget(String),

    /// A graph edge references a node that does not exist.
    #[error("edge references unknown node '{0}'")]
    UnknownGraphNode(String),

    /// The workflow graph is not a DAG.
    #[error("workflow graph contains a cycle involving '{0}'")]
    CyclicGraph(String),
}

/// Filesystem/classpath resource failures.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A jar path does not exist or cannot be read.
    #[error("jar does not exist or cannot be read: {0}")]
    JarNotFound(PathBuf),

    /// The job directory could not be created after a unique name was found.
    #[error("could not create job directory {path}: {reason}")]
    DirectoryCreateFailed { path: PathBuf, reason: String },
}

/// Backend-server bootstrap failures. Terminal for the run: the server is
/// either connected or explicitly failed, never left ambiguous.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The configured server address does not resolve to a socket address.
    #[error("invalid server address '{0}'")]
    InvalidAddress(String),

    /// Files required before starting the server are missing.
    #[error("required files not found before starting server: {0:?}")]
    MissingRequiredFiles(Vec<PathBuf>),

    /// The start script exists but is not executable. Deliberately not
    /// auto-fixed: a permissions problem usually means a packaging problem.
    #[error("start script is not executable: {0}")]
    ScriptNotExecutable(PathBuf),

    /// The start script could not be launched.
    #[error("unable to start server via {script}: {reason}")]
    SpawnFailed { script: PathBuf, reason: String },

    /// All connect retries were exhausted without reaching the server.
    #[error("could not connect to server {addr} after {attempts} attempts")]
    ServerUnreachable { addr: SocketAddr, attempts: u32 },
}

/// Transient per-iteration failures. These abort the current fire() only;
/// the caller decides whether to fire again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A data source signalled "not ready" when iterated.
    #[error("source '{0}' is not ready to fire")]
    SourceNotReady(String),

    /// A data sink's prefire returned false.
    #[error("sink '{0}' is not ready to fire")]
    SinkNotReady(String),

    /// A stub worker thread went away while the driver was still exchanging
    /// records with it.
    #[error("stub channel for '{0}' disconnected")]
    ChannelDisconnected(String),

    /// The submitted job itself failed inside the engine.
    #[error("job execution failed: {0}")]
    JobFailed(String),
}

/// Canonical FDP error taxonomy used across crates.
///
/// Classification guidance:
/// - [`DispatchError::Schema`] / [`DispatchError::Config`] /
///   [`DispatchError::Validation`]: surfaced before any job is submitted
/// - [`DispatchError::Engine`] / [`DispatchError::Resource`] /
///   [`DispatchError::Bootstrap`]: run-terminal setup failures
/// - [`DispatchError::Runtime`]: aborts the current iteration only
/// - [`DispatchError::Io`]: raw filesystem/network failures from std APIs
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard FDP result alias.
pub type Result<T> = std::result::Result<T, DispatchError>;
