//! Channel configuration
//!
//! ```yaml
//! channels:
//!   - name: P_total
//!     formula: "P_a + P_b + P_c"
//!     inputs: [P_a, P_b, P_c]
//!   - name: E_total
//!     formula: "Integrate(P_total, 1 / 3600)"
//!     inputs: [P_total]
//!     description: Energy in Wh
//! ```

use crate::error::{FormulaError, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "VOLTAGE_FORMULA_";

/// One calculated channel
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelDefinition {
    /// Channel name, also the input slot later channels use to read it
    pub name: String,
    pub formula: String,
    /// Input slots the formula may reference
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChannelDefinition {
    pub fn new<I, S>(name: impl Into<String>, formula: impl Into<String>, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            formula: formula.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FormulaConfig {
    #[serde(default)]
    pub channels: Vec<ChannelDefinition>,
}

impl FormulaConfig {
    /// Load from a single file, format chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new().merge(file_provider(path.as_ref())?);
        extract(figment)
    }

    /// Load defaults, then `path`, then `VOLTAGE_FORMULA_*` environment variables
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (prefixed, `__` separates nested keys)
    /// 2. Config file
    /// 3. Default values
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(file_provider(path.as_ref())?)
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        extract(figment)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        extract(Figment::new().merge(Yaml::string(yaml)))
    }

    /// Check channel names are present and unique
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(FormulaError::config("channel name must not be empty"));
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(FormulaError::config(format!(
                    "duplicate channel name: {}",
                    channel.name
                )));
            }
        }
        Ok(())
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| FormulaError::config("Config file must have an extension"))?;

    let figment = match extension {
        "toml" => Figment::from(Toml::file(path)),
        "yaml" | "yml" => Figment::from(Yaml::file(path)),
        "json" => Figment::from(Json::file(path)),
        _ => {
            return Err(FormulaError::config(format!(
                "Unsupported config file format: {}",
                extension
            )))
        },
    };
    Ok(figment)
}

fn extract(figment: Figment) -> Result<FormulaConfig> {
    let config: FormulaConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}
