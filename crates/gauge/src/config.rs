//! Process configuration.
//!
//! Everything the host reads from its environment is resolved once at
//! startup into a [`GaugeConfig`] that the rest of the process treats as
//! read-only.

use std::path::PathBuf;
use std::time::Duration;

use eyre::{Result, WrapErr};

/// Set by the host to pick the API port; written back by the service when
/// it binds an ephemeral port, so child plugins can find it.
pub const API_PORT_ENV: &str = "GAUGE_API_PORT";
/// Overrides the project root (defaults to the working directory).
pub const PROJECT_ROOT_ENV: &str = "GAUGE_PROJECT_ROOT";
/// Where language plugins are installed.
pub const INSTALLATION_PREFIX_ENV: &str = "GAUGE_INSTALLATION_PREFIX";
/// Budget in milliseconds for a single runner request.
pub const RUNNER_REQUEST_TIMEOUT_ENV: &str = "GAUGE_RUNNER_REQUEST_TIMEOUT";
/// Port handed to a spawned runner so it can dial back.
pub const INTERNAL_PORT_ENV: &str = "GAUGE_INTERNAL_PORT";

/// Name of the specifications directory under the project root.
pub const SPECS_DIR_NAME: &str = "specs";

const DEFAULT_RUNNER_REQUEST_TIMEOUT_MS: u64 = 3000;

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct GaugeConfig {
    pub project_root: PathBuf,
    pub installation_prefix: Option<PathBuf>,
    pub runner_request_timeout: Duration,
    /// Port requested through the environment; `None` means "pick one".
    pub api_port: Option<u16>,
}

impl GaugeConfig {
    /// Resolve the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        let project_root = match std::env::var_os(PROJECT_ROOT_ENV) {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().wrap_err("failed to resolve working directory")?,
        };
        let project_root = project_root
            .canonicalize()
            .wrap_err_with(|| format!("project root {} does not exist", project_root.display()))?;

        let installation_prefix = std::env::var_os(INSTALLATION_PREFIX_ENV).map(PathBuf::from);

        let runner_request_timeout = std::env::var(RUNNER_REQUEST_TIMEOUT_ENV)
            .ok()
            .and_then(|ms| ms.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_RUNNER_REQUEST_TIMEOUT_MS));

        let api_port = std::env::var(API_PORT_ENV)
            .ok()
            .and_then(|port| port.parse::<u16>().ok());

        Ok(GaugeConfig {
            project_root,
            installation_prefix,
            runner_request_timeout,
            api_port,
        })
    }

    /// A configuration rooted at an explicit directory, environment ignored.
    /// Used by tests and by callers that already know the project root.
    pub fn for_project_root(project_root: PathBuf) -> Self {
        GaugeConfig {
            project_root,
            installation_prefix: None,
            runner_request_timeout: Duration::from_millis(DEFAULT_RUNNER_REQUEST_TIMEOUT_MS),
            api_port: None,
        }
    }

    pub fn specs_dir(&self) -> PathBuf {
        self.project_root.join(SPECS_DIR_NAME)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_root.join("manifest.json")
    }
}
