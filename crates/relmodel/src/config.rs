//! Service configuration.

use relmodel_core::{ConfigError, Error, Result};
use relmodel_relation::RemoteErrorPolicy;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};

/// Settings of one data service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used in log events
    pub service_name: String,
    /// Continue an assembly when a remote call fails, leaving that relation unset
    pub ignore_remote_errors: bool,
    /// Log every incoming remote request at info level
    pub log_queries: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "relmodel".to_string(),
            ignore_remote_errors: false,
            log_queries: false,
        }
    }
}

impl ServiceConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    pub fn ignore_remote_errors(mut self, ignore: bool) -> Self {
        self.ignore_remote_errors = ignore;
        self
    }

    pub fn log_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    /// Parse a JSON document; missing keys take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("invalid service configuration: {}", e),
                source: Some(Box::new(e)),
            })
        })
    }
}

/// Shared, reloadable configuration.
///
/// Readers take a snapshot with `current`; `reload` swaps the snapshot and is
/// seen by the next read, including the remote error policy consulted on
/// each failure.
#[derive(Debug, Default)]
pub struct ConfigHandle {
    current: RwLock<Arc<ServiceConfig>>,
}

impl ConfigHandle {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn current(&self) -> Arc<ServiceConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn reload(&self, config: ServiceConfig) {
        tracing::info!(
            service = %config.service_name,
            ignore_remote_errors = config.ignore_remote_errors,
            "Reloading service configuration"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(config);
    }

    /// Reload from JSON. The previous configuration stays in place on a parse error.
    pub fn reload_json(&self, text: &str) -> Result<()> {
        let config = ServiceConfig::from_json(text)?;
        self.reload(config);
        Ok(())
    }
}

impl RemoteErrorPolicy for ConfigHandle {
    fn ignore_remote_errors(&self) -> bool {
        self.current().ignore_remote_errors
    }
}
