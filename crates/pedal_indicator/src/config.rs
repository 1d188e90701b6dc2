use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use pedal_bus::{names, BusIdentity};
use serde::Deserialize;

use crate::opts::IdentityOverrides;

/// Contents of `config.json`. Every field is optional; missing values fall back to the defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub service_name: Option<String>,
    pub object_path: Option<String>,
    pub signal_name: Option<String>,
}

impl Config {
    /// `$XDG_CONFIG_HOME/pedal-indicator/config.json`
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = match std::env::var("XDG_CONFIG_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => PathBuf::from(std::env::var("HOME").context("Neither XDG_CONFIG_HOME nor HOME is set")?).join(".config"),
        };
        Ok(config_dir.join("pedal-indicator").join("config.json"))
    }

    /// Load the config from `path`, or from the default location if none is given. A missing file at
    /// the default location is fine; a missing file that was asked for explicitly is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => {
                if !path.is_file() {
                    bail!("Configuration file {} does not exist", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    log::debug!("No configuration at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Combine with the command line overrides into the identity to use.
    pub fn identity(&self, overrides: &IdentityOverrides) -> Result<BusIdentity> {
        let pick = |cli: &Option<String>, file: &Option<String>, default: &str| {
            cli.clone().or_else(|| file.clone()).unwrap_or_else(|| default.to_owned())
        };
        let identity = BusIdentity::new(
            pick(&overrides.service_name, &self.service_name, names::DEFAULT_SERVICE_NAME),
            pick(&overrides.object_path, &self.object_path, names::DEFAULT_OBJECT_PATH),
            pick(&overrides.signal_name, &self.signal_name, names::DEFAULT_SIGNAL_NAME),
        )?;
        Ok(identity)
    }
}
