// # mepd - MEP AppD sync daemon
//
// This daemon is a thin integration layer: all sync logic lives in mep-core.
//
// The mepd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the rule store, DNS agent and data plane through the registry
// 4. Hosting the sync worker until a shutdown signal arrives
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Rule Store
// - `MEP_STORE_TYPE`: Type of rule store (file, memory)
// - `MEP_STORE_PATH`: Path to the store file (for file store)
//
// ### DNS Agent
// - `MEP_DNS_AGENT_MODE`: Where DNS rules go (local, dataplane, all)
// - `MEP_DNS_AGENT_ENDPOINT`: Base URL of the DNS server management API
// - `MEP_DNS_AGENT_ZONE`: Zone of the managed records
// - `MEP_DNS_AGENT_TIMEOUT_SECS`: HTTP timeout
//
// ### Data Plane
// - `MEP_DATA_PLANE_TYPE`: Data plane type (none)
//
// ### Worker
// - `MEP_KEY_ROOT`: Root of the store keys
// - `MEP_SHUTDOWN_TIMEOUT_SECS`: How long to wait for running tasks on shutdown
//
// ## Example
//
// ```bash
// export MEP_STORE_TYPE=file
// export MEP_STORE_PATH=/var/lib/mep/store.json
// export MEP_DNS_AGENT_MODE=all
// export MEP_DNS_AGENT_ENDPOINT=http://127.0.0.1:8086
//
// mepd
// ```

use anyhow::Result;
use mep_core::config::{
    DataPlaneConfig, DnsAgentBackend, DnsAgentConfig, DnsAgentMode, MepConfig, RuleStoreConfig,
    WorkerConfig,
};
use mep_core::task::TaskContext;
use mep_core::traits::{DataPlane, DnsAgent, RuleStore};
use mep_core::{PluginRegistry, Worker};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum MepExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<MepExitCode> for ExitCode {
    fn from(code: MepExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    core: MepConfig,
    shutdown_timeout_secs: u64,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup
    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let store = match var("MEP_STORE_TYPE").as_deref().unwrap_or("file") {
            "memory" => RuleStoreConfig::Memory,
            "file" => RuleStoreConfig::File {
                path: var("MEP_STORE_PATH")
                    .unwrap_or_else(|| "/var/lib/mep/store.json".to_string()),
            },
            other => anyhow::bail!(
                "MEP_STORE_TYPE '{}' is not supported. Supported types: file, memory",
                other
            ),
        };

        let mode: DnsAgentMode = match var("MEP_DNS_AGENT_MODE") {
            Some(mode) => mode.parse()?,
            None => DnsAgentMode::default(),
        };

        let DnsAgentBackend::Rest {
            endpoint: default_endpoint,
            zone: default_zone,
            timeout_secs: default_timeout,
        } = DnsAgentBackend::default()
        else {
            anyhow::bail!("default DNS agent backend is not REST");
        };
        let timeout_secs = match var("MEP_DNS_AGENT_TIMEOUT_SECS") {
            Some(s) => s.parse().map_err(|_| {
                anyhow::anyhow!("MEP_DNS_AGENT_TIMEOUT_SECS must be a number. Got: {}", s)
            })?,
            None => default_timeout,
        };
        let backend = DnsAgentBackend::Rest {
            endpoint: var("MEP_DNS_AGENT_ENDPOINT").unwrap_or(default_endpoint),
            zone: var("MEP_DNS_AGENT_ZONE").unwrap_or(default_zone),
            timeout_secs,
        };

        let data_plane = match var("MEP_DATA_PLANE_TYPE").as_deref().unwrap_or("none") {
            "none" => DataPlaneConfig::None,
            other => DataPlaneConfig::Custom {
                factory: other.to_string(),
                config: serde_json::Value::Null,
            },
        };

        let worker = WorkerConfig {
            key_root: var("MEP_KEY_ROOT").unwrap_or_else(|| WorkerConfig::default().key_root),
        };

        let shutdown_timeout_secs = match var("MEP_SHUTDOWN_TIMEOUT_SECS") {
            Some(s) => s.parse().map_err(|_| {
                anyhow::anyhow!("MEP_SHUTDOWN_TIMEOUT_SECS must be a number. Got: {}", s)
            })?,
            None => 30,
        };

        Ok(Self {
            core: MepConfig {
                store,
                dns_agent: DnsAgentConfig { mode, backend },
                data_plane,
                worker,
            },
            shutdown_timeout_secs,
            log_level: var("MEP_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.core.validate()?;

        if let RuleStoreConfig::File { path } = &self.core.store
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            anyhow::bail!(
                "MEP_STORE_PATH parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if !(1..=600).contains(&self.shutdown_timeout_secs) {
            anyhow::bail!(
                "MEP_SHUTDOWN_TIMEOUT_SECS must be between 1 and 600 seconds. Got: {}",
                self.shutdown_timeout_secs
            );
        }

        self.level()?;
        Ok(())
    }

    fn level(&self) -> Result<Level> {
        Ok(match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => anyhow::bail!(
                "MEP_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        })
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return MepExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return MepExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return MepExitCode::ConfigError.into();
    }

    info!("Starting mepd daemon");

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return MepExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            MepExitCode::RuntimeError
        } else {
            MepExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = PluginRegistry::with_builtins();

    #[cfg(feature = "rest-dns")]
    {
        info!("Registering REST DNS agent");
        mep_dns_agent::register(&registry);
    }

    let core = &config.core;
    info!("Rule store type: {}", core.store.type_name());
    info!("DNS agent mode: {:?}", core.dns_agent.mode);
    info!("Data plane type: {}", core.data_plane.type_name());

    let store: Arc<dyn RuleStore> = Arc::from(registry.create_rule_store(&core.store).await?);
    let dns_agent: Arc<dyn DnsAgent> =
        Arc::from(registry.create_dns_agent(&core.dns_agent.backend)?);
    let data_plane: Arc<dyn DataPlane> = Arc::from(registry.create_data_plane(&core.data_plane)?);

    data_plane
        .init_data_plane(&serde_json::to_value(&core.data_plane)?)
        .await?;

    let paths = core.worker.key_paths();
    report_stale_jobs(store.as_ref(), &paths.jobs_prefix()).await;

    let worker = Worker::new(TaskContext {
        store: store.clone(),
        dns_agent,
        data_plane,
        dns_mode: core.dns_agent.mode,
        paths,
    });

    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    let drain = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(drain, worker.shutdown()).await.is_err() {
        warn!(
            "Sync tasks still running after {:?}; their jobs stay staged",
            drain
        );
    }

    store.flush().await?;
    info!("Rule store flushed, daemon stopped");
    Ok(())
}

/// Log jobs left behind by a previous run
///
/// They are not resumed; each keeps its app instance locked until cleared.
async fn report_stale_jobs(store: &dyn RuleStore, prefix: &str) {
    match store.list_paths(prefix).await {
        Ok(jobs) => {
            for job in jobs {
                let app_instance_id = job.strip_prefix(prefix).unwrap_or(&job);
                warn!(
                    "Stale job found for app instance {}; it will not be resumed",
                    app_instance_id
                );
            }
        }
        Err(e) => warn!("Failed to scan for stale jobs: {}", e),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
