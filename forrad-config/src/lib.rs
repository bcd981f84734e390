//! # Forrad Configuration
//!
//! Layered configuration for the node-local allocator and its simulator.
//!
//! Sources are merged in order, later ones winning:
//! 1. Built-in defaults
//! 2. `config/forrad.yaml`
//! 3. `config/<FORRAD_ENV>.yaml`
//! 4. `FORRAD_*` environment variables, `__` separating nested keys
//!    (e.g. `FORRAD_QUOTA__SHARED_POOL_MAX_SIZE=1048576`)

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod pool;
mod quota;
mod simulator;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use pool::PoolConfig;
pub use quota::QuotaConfig;
pub use simulator::SimulatorConfig;
pub use telemetry::TelemetryConfig;

const BASE_FILE: &str = "config/forrad.yaml";
const ENV_PREFIX: &str = "FORRAD_";

#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone, PartialEq)]
pub struct ForradConfig {
    /// Object pool sizing.
    #[serde(default)]
    #[validate(nested)]
    pub pool: PoolConfig,

    /// Shared pool budget.
    #[serde(default)]
    #[validate(nested)]
    pub quota: QuotaConfig,

    #[serde(default)]
    #[validate(nested)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    #[validate(nested)]
    pub simulator: SimulatorConfig,
}

impl ForradConfig {
    /// Load configuration from the default files and the environment.
    ///
    /// Missing files are skipped. The environment name comes from
    /// `FORRAD_ENV` and defaults to `production`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ForradConfig::default()));

        if Path::new(BASE_FILE).exists() {
            figment = figment.merge(Yaml::file(BASE_FILE));
        }

        let env = std::env::var("FORRAD_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Load configuration from a specific file, with defaults underneath and
    /// the environment on top.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        Self::extract(
            Figment::from(Serialized::defaults(ForradConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }
}
