//! Runtime configuration.
//!
//! Settings layer from lowest to highest precedence: built-in defaults, an
//! `isoflash.toml` file in the working directory, `ISOFLASH_*` environment
//! variables, then command-line flags.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CATALOG_URL: &str = "https://isoflash.dev/images/catalog.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Endpoint serving the image catalog as a JSON array.
    pub catalog_url: String,
    /// Directory downloaded images are written to and flashed from.
    pub download_dir: PathBuf,
    pub verbose: bool,
    pub json_logs: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            download_dir: PathBuf::from("."),
            verbose: false,
            json_logs: false,
        }
    }
}

impl AppConfig {
    /// Build the effective configuration, optionally merging CLI overrides
    /// on top. The overrides type serializes only the flags the user set.
    pub fn new<A: Serialize>(cli_overrides: Option<&A>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("isoflash.toml"))
            .merge(Env::prefixed("ISOFLASH_"));

        if let Some(overrides) = cli_overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        figment.extract().context("Failed to load configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        catalog_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        download_dir: Option<PathBuf>,
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        figment::Jail::expect_with(|_jail| {
            let config = AppConfig::new(None::<&Overrides>)
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.catalog_url, DEFAULT_CATALOG_URL);
            assert_eq!(config.download_dir, PathBuf::from("."));
            assert!(!config.verbose);
            Ok(())
        });
    }

    #[test]
    fn file_beats_defaults_and_env_beats_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "isoflash.toml",
                r#"
                catalog_url = "https://file.example/catalog.json"
                download_dir = "/tmp/from-file"
                "#,
            )?;
            jail.set_env("ISOFLASH_CATALOG_URL", "https://env.example/catalog.json");

            let config = AppConfig::new(None::<&Overrides>)
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.catalog_url, "https://env.example/catalog.json");
            assert_eq!(config.download_dir, PathBuf::from("/tmp/from-file"));
            Ok(())
        });
    }

    #[test]
    fn cli_overrides_beat_everything() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ISOFLASH_CATALOG_URL", "https://env.example/catalog.json");

            let overrides = Overrides {
                catalog_url: Some("https://cli.example/catalog.json".to_string()),
                download_dir: None,
            };
            let config = AppConfig::new(Some(&overrides))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.catalog_url, "https://cli.example/catalog.json");
            Ok(())
        });
    }
}
