//! Configuration for the registry and declaratively registered services

use crate::descriptor::ServiceDescriptor;
use crate::error::{RegistryError, RegistryResult};
use crate::identity::Origin;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_parallelism() -> usize {
    num_cpus::get().max(1)
}

fn default_queue_capacity() -> usize {
    256
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

/// Scheduler and activation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Activation attempts allowed to run at once
    #[serde(default = "default_parallelism")]
    pub max_parallel_activations: usize,
    /// Attempts allowed to wait for a free slot
    #[serde(default = "default_queue_capacity")]
    pub admission_queue_capacity: usize,
    /// How long an attempt waits for a slot before failing
    #[serde(default = "default_timeout_ms")]
    pub admission_timeout_ms: u64,
    /// Honor descriptor auto-activate flags
    #[serde(default = "default_true")]
    pub auto_activate: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_parallel_activations: default_parallelism(),
            admission_queue_capacity: default_queue_capacity(),
            admission_timeout_ms: default_timeout_ms(),
            auto_activate: default_true(),
        }
    }
}

impl RegistryConfig {
    pub fn admission_timeout(&self) -> Duration {
        Duration::from_millis(self.admission_timeout_ms)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> RegistryResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| RegistryError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from JSON string
    pub fn from_json(json_str: &str) -> RegistryResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| RegistryError::ConfigError(format!("Failed to parse JSON: {}", e)))
    }
}

/// One service declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Catalog name of the factory producing the instance
    pub factory: String,
    /// Origin the service is registered under
    #[serde(default)]
    pub origin: Origin,
    #[serde(flatten)]
    pub descriptor: ServiceDescriptor,
}

/// Registry settings plus the services to register
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

impl ServicesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service(
        &mut self,
        factory: impl Into<String>,
        descriptor: ServiceDescriptor,
    ) -> &mut Self {
        self.services.push(ServiceConfig {
            factory: factory.into(),
            origin: Origin::Local,
            descriptor,
        });
        self
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> RegistryResult<Self> {
        toml::from_str(toml_str)
            .map_err(|e| RegistryError::ConfigError(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration from JSON string
    pub fn from_json(json_str: &str) -> RegistryResult<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| RegistryError::ConfigError(format!("Failed to parse JSON: {}", e)))
    }
}
