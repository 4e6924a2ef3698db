//! The cluster engine: bootstraps a backend server before running jobs.

use std::collections::BTreeMap;
use std::net::SocketAddr;

use fdp_common::{ConfigError, EngineDescriptor, Result};
use fdp_schema::Record;
use tracing::info;

use crate::bootstrap::{self, BootstrapOptions};
use crate::context::{JobContext, ServerMode, SERVER_TYPE_DISTRIBUTED, SERVER_TYPE_EMBEDDED};
use crate::exec;
use crate::{default_preinitialize, Engine, EngineFactory};

/// Engine backed by a separately running server.
///
/// In distributed mode the configured server is made reachable before any
/// job runs. Job execution itself still flows through the in-process
/// pipeline; shipping records to the remote backend is the engine's
/// `execute_job` seam.
pub struct ClusterEngine {
    descriptor: EngineDescriptor,
    options: BootstrapOptions,
}

impl ClusterEngine {
    pub fn new(descriptor: EngineDescriptor) -> Self {
        Self {
            descriptor,
            options: BootstrapOptions::default(),
        }
    }

    pub fn with_options(descriptor: EngineDescriptor, options: BootstrapOptions) -> Self {
        Self {
            descriptor,
            options,
        }
    }

    pub fn factory() -> EngineFactory {
        std::sync::Arc::new(|descriptor| Ok(Box::new(ClusterEngine::new(descriptor.clone()))))
    }
}

impl Engine for ClusterEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn server_types(&self) -> Vec<&'static str> {
        vec![SERVER_TYPE_DISTRIBUTED, SERVER_TYPE_EMBEDDED]
    }

    fn preinitialize(&mut self, ctx: &mut JobContext) -> Result<()> {
        default_preinitialize(self.name(), &self.server_types(), ctx)?;
        if ctx.server_mode() == ServerMode::Distributed {
            let server = self.descriptor.server.as_ref().ok_or_else(|| {
                ConfigError::InvalidServerType(SERVER_TYPE_DISTRIBUTED.to_string())
            })?;
            let mut options = self.options.clone();
            inject_server_home(&mut options.env, ctx.config_dir.as_deref());
            options.parse_address = Some(std::sync::Arc::new(parse_listen_address));
            let started = bootstrap::ensure_server_running(server, &options)?;
            info!(
                engine = %self.descriptor.name,
                address = %server.address,
                ?started,
                operator = "ClusterEngine",
                "backend server ready"
            );
        }
        Ok(())
    }

    fn execute_job(&mut self, ctx: &mut JobContext) -> Result<BTreeMap<String, Vec<Record>>> {
        if ctx.server_mode() == ServerMode::Distributed {
            info!(
                run_id = %ctx.run_id,
                job_dir = %ctx.job_dir.display(),
                jars = ctx.jars.len(),
                operator = "ClusterEngine",
                "running against distributed backend"
            );
        }
        exec::run_pipeline(ctx)
    }

    fn parse_server_address_from_output(&self, line: &str) -> Option<SocketAddr> {
        parse_listen_address(line)
    }
}

/// Servers announce their final address as "listening on HOST:PORT".
fn parse_listen_address(line: &str) -> Option<SocketAddr> {
    line.split("listening on ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|addr| addr.parse().ok())
}

/// Hand the configuration directory to the start script, unless the caller
/// already exported a server home.
fn inject_server_home(env: &mut Vec<(String, String)>, config_dir: Option<&std::path::Path>) {
    if std::env::var_os("FDP_SERVER_HOME").is_some() {
        return;
    }
    if let Some(dir) = config_dir {
        env.push(("FDP_SERVER_HOME".to_string(), dir.display().to_string()));
    }
}
