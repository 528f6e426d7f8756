//! Shared command setup: logging, configuration and service clients.

use std::path::Path;
use std::sync::Arc;

use ndvicube::config::{ConfigError, ConfigFile};
use ndvicube::logging::{init_logging, LogGuard};
use ndvicube::provider::{ReqwestClient, SentinelHubSession};
use tracing::{debug, info};

use crate::error::CliError;

/// Per-invocation state shared by the commands.
pub struct CliRunner {
    config: ConfigFile,
    _log_guard: LogGuard,
}

impl CliRunner {
    /// Initializes logging and loads the configuration file.
    ///
    /// A missing configuration file is not an error: defaults are used and
    /// credentials may still come from the environment.
    pub fn new(verbose: bool, log_file: Option<&Path>) -> Result<Self, CliError> {
        let log_guard = init_logging(verbose, log_file)?;
        let config = load_config()?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn log_startup(&self, command: &str) {
        info!(version = ndvicube::VERSION, command, "ndvicube starting");
    }

    /// Authenticated Sentinel Hub session from the configured credentials.
    pub fn session(&self) -> Result<Arc<SentinelHubSession<ReqwestClient>>, CliError> {
        let credentials = self.config.credentials().ok_or_else(|| {
            CliError::Config(
                "Sentinel Hub credentials missing. Set client_id and client_secret \
                 in config.ini or the SH_CLIENT_ID / SH_CLIENT_SECRET environment variables"
                    .to_string(),
            )
        })?;
        let sh = &self.config.sentinelhub;
        let http = ReqwestClient::with_timeout(self.config.extraction.timeout)?;
        let session = SentinelHubSession::new(http, credentials)
            .with_base_url(sh.base_url.as_str())
            .with_auth_url(sh.auth_url.as_str());
        Ok(Arc::new(session))
    }
}

fn load_config() -> Result<ConfigFile, CliError> {
    match ConfigFile::load() {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(path)) => {
            debug!(path = %path.display(), "No configuration file, using defaults");
            let mut config = ConfigFile::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}
