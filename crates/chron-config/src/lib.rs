//! # chron-config
//!
//! Layered configuration loading for Chronicle using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`CHRONICLE_*` prefix, `__` as separator)
//! 2. An explicit file passed with `--config`
//! 3. Project-level `.chronicle/config.toml`
//! 4. User-level `~/.config/chronicle/config.toml`
//! 5. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! `CHRONICLE_DATABASE__PATH` -> `database.path`,
//! `CHRONICLE_AUDIT__TABLE_SUFFIX` -> `audit.table_suffix`, etc.
//!
//! Entity mappings are declared as `[[entities]]` tables in TOML:
//!
//! ```toml
//! [audit]
//! tracked = ["Article"]
//!
//! [[entities]]
//! name = "Article"
//! table = "articles"
//! id_generator = "database"
//! fields = [
//!     { name = "id", field_type = "integer", id = true },
//!     { name = "title", field_type = "text" },
//! ]
//! to_one = [{ name = "author", target = "Author" }]
//! ```

mod audit;
mod database;
mod error;
mod general;

pub use audit::AuditConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;

use std::path::{Path, PathBuf};

use chron_core::configuration::AuditConfiguration;
use chron_core::mapping::EntityMapping;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub entities: Vec<EntityMapping>,
}

impl ChronConfig {
    /// Load configuration from all default sources.
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` support.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment_with(None).extract().map_err(ConfigError::from)
    }

    /// Load configuration with an additional explicit TOML file layered above
    /// the project-local one.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::InvalidValue {
                field: "--config".into(),
                reason: format!("{} does not exist", path.display()),
            });
        }
        Self::figment_with(Some(path))
            .extract()
            .map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the default figment provider chain.
    pub fn figment() -> Figment {
        Self::figment_with(None)
    }

    /// Build the figment provider chain, optionally with an explicit file.
    pub fn figment_with(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Layer 1: User-global config
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        // Layer 2: Project-local config
        let local_path = PathBuf::from(".chronicle/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        // Layer 3: Explicit file
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        // Layer 4: Environment variables (highest priority)
        figment.merge(Env::prefixed("CHRONICLE_").split("__"))
    }

    /// Validate naming and build the immutable audit configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for bad names, or
    /// `ConfigError::Mapping` if a tracked type cannot be audited.
    pub fn audit_configuration(&self) -> Result<AuditConfiguration, ConfigError> {
        self.audit.validate()?;
        let built = AuditConfiguration::build(
            self.audit.naming(),
            self.entities.clone(),
            &self.audit.tracked,
        )?;
        Ok(built)
    }

    /// Path to the user-global config file.
    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chronicle").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_loads() {
        let config = ChronConfig::default();
        assert!(config.entities.is_empty());
        assert!(config.audit.tracked.is_empty());
        assert_eq!(config.general.page_size, 20);
    }

    #[test]
    fn figment_builds_without_files() {
        figment::Jail::expect_with(|_jail| {
            let config: ChronConfig = ChronConfig::figment().extract()?;
            assert_eq!(config.audit.table_suffix, "_audit");
            assert_eq!(config.database.path, ".chronicle/chronicle.db");
            Ok(())
        });
    }

    #[test]
    fn empty_configuration_builds() {
        let audit = ChronConfig::default().audit_configuration().unwrap();
        assert!(audit.tracked_types().is_empty());
    }
}
