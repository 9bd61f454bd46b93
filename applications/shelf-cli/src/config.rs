/// CLI configuration
use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use shelf_importer::ImportConfig;
use std::path::{Path, PathBuf};

/// Default configuration file, read when present
pub const DEFAULT_CONFIG_FILE: &str = "shelf.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShelfConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub import: ImportConfig,
}

impl ShelfConfig {
    /// Load configuration from file and environment
    ///
    /// `path` must exist when given; otherwise `shelf.toml` in the working
    /// directory is used if there is one. `SHELF_`-prefixed variables
    /// override file values, with `__` between nested keys
    /// (`SHELF_IMPORT__LIBRARY_DIR`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    settings = settings.add_source(config::File::from(default_path));
                }
            }
        }

        settings = settings.add_source(
            config::Environment::with_prefix("SHELF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = settings.build()?.try_deserialize()?;
        tracing::debug!(database = %config.database_url, "Loaded configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.is_empty() {
            return Err(CliError::Config(
                "database_url is required (set SHELF_DATABASE_URL)".to_string(),
            ));
        }
        self.import.validate()?;
        Ok(())
    }
}

fn default_database_url() -> String {
    "sqlite://./shelf.db".to_string()
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            import: ImportConfig::default(),
        }
    }
}
