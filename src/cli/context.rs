//! Command execution context
//!
//! Loads configuration, applies command-line overrides and builds the
//! service graph every command works against.

use std::sync::Arc;

use crate::cli::{GlobalOptions, OutputFormat};
use crate::client::{RetryPolicy, UpstreamClient};
use crate::config::Config;
use crate::error::Result;
use crate::service::ProxyService;
use crate::store::SnapshotStore;

/// Context for command execution containing config and runtime options.
pub struct CommandContext {
    /// Loaded configuration with CLI overrides applied
    pub config: Config,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config from `--config` (or the default location) and apply
    /// `--data-dir` and `--api-host`.
    ///
    /// # Errors
    /// Returns error if the config file exists but cannot be parsed or is
    /// invalid.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let mut config = Config::load_at(opts.config_ref())?;

        if let Some(ref dir) = opts.data_dir {
            config.data_dir = Some(dir.clone());
        }
        if let Some(host) = opts.api_host_ref() {
            config.upstream.base_url = host.to_string();
        }
        config.validate()?;

        Ok(Self {
            config,
            format: opts.format,
        })
    }

    /// Build the proxy service over the configured store and upstream.
    ///
    /// Opening the store never touches the network.
    pub fn service(&self) -> Result<ProxyService> {
        let store = SnapshotStore::open(self.config.data_dir().as_deref())?;
        let upstream = UpstreamClient::new(
            &self.config.upstream,
            RetryPolicy::from_config(&self.config.retry),
        )?;
        log::debug!("Upstream API: {}", upstream.base_url());

        ProxyService::new(&self.config, Arc::new(upstream), store)
    }
}
