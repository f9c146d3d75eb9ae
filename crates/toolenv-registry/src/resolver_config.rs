use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use toolenv_core::ResolverOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfigEntry {
    #[serde(rename = "type")]
    pub resolver_type: String,
    #[serde(flatten)]
    pub options: ResolverOptions,
}

impl ResolverConfigEntry {
    pub fn new(resolver_type: impl Into<String>) -> Self {
        Self {
            resolver_type: resolver_type.into(),
            options: ResolverOptions::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }
}

/// The ordered resolver chain as written in a resolver configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfigFile {
    #[serde(default = "config_file_version")]
    pub version: u32,
    #[serde(default)]
    pub resolvers: Vec<ResolverConfigEntry>,
}

impl ResolverConfigFile {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(input).context("failed to parse resolver configuration")?;
        if config.version != config_file_version() {
            anyhow::bail!(
                "unsupported resolver configuration version {}; expected {}",
                config.version,
                config_file_version()
            );
        }
        for (index, entry) in config.resolvers.iter().enumerate() {
            if entry.resolver_type.trim().is_empty() {
                anyhow::bail!("resolver entry {index} has an empty type");
            }
        }
        Ok(config)
    }
}

fn config_file_version() -> u32 {
    1
}

/// Reads a resolver configuration file. `Ok(None)` means the default chain
/// should be used: the file is absent or could not be read.
pub fn read_resolver_config(path: &Path) -> Result<Option<ResolverConfigFile>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(
                "Unable to find resolver configuration '{}', using default resolvers",
                path.display()
            );
            return Ok(None);
        }
        Err(err) => {
            tracing::warn!(
                "Unable to read resolver configuration '{}' ({err}), using default resolvers",
                path.display()
            );
            return Ok(None);
        }
    };

    let config = ResolverConfigFile::from_toml_str(&content)
        .with_context(|| format!("failed parsing resolver configuration: {}", path.display()))?;
    Ok(Some(config))
}
