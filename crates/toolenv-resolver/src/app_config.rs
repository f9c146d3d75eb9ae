use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use toolenv_core::{
    option_as_bool, ConfigProvider, ContainerDestination, ContainerType, OptionValue,
};

pub const USE_TOOL_DEPENDENCIES: &str = "use_tool_dependencies";
pub const TOOL_DEPENDENCY_DIR: &str = "tool_dependency_dir";
pub const DEPENDENCY_RESOLVERS_CONFIG_FILE: &str = "dependency_resolvers_config_file";
pub const USE_CACHED_DEPENDENCY_MANAGER: &str = "use_cached_dependency_manager";
pub const CONTAINER_DESTINATIONS: &str = "container_destinations";

/// Host configuration: a flat TOML table of options, including the
/// `<resolver_type>_<option>` keys resolvers fall back to.
///
/// ```toml
/// use_tool_dependencies = true
/// tool_dependency_dir = "/srv/deps"
/// conda_prefix = "/opt/conda"
///
/// [[container_destinations.docker]]
/// id = "docker_local"
/// params = { docker_sudo = "false" }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    values: toml::Table,
}

impl AppConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_table(values: toml::Table) -> Self {
        Self { values }
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let values: toml::Table =
            toml::from_str(input).context("failed to parse application configuration")?;
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| {
            format!("failed reading application configuration: {}", path.display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid application configuration: {}", path.display()))
    }

    /// Like [`AppConfig::load`], but an absent file yields the empty
    /// configuration.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(
                    "No application configuration at '{}', using defaults",
                    path.display()
                );
                Ok(Self::new())
            }
            _ => Self::load(path),
        }
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<OptionValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Absent means `false`.
    pub fn bool_option(&self, key: &str) -> Result<bool> {
        match self.values.get(key) {
            None => Ok(false),
            Some(value) => option_as_bool(value)
                .ok_or_else(|| anyhow!("option '{key}' must be a boolean, got {value}")),
        }
    }

    pub fn path_option(&self, key: &str) -> Result<Option<PathBuf>> {
        match self.values.get(key) {
            None => Ok(None),
            Some(OptionValue::String(raw)) if raw.trim().is_empty() => Ok(None),
            Some(OptionValue::String(raw)) => Ok(Some(PathBuf::from(raw))),
            Some(other) => Err(anyhow!("option '{key}' must be a path string, got {other}")),
        }
    }

    pub fn use_tool_dependencies(&self) -> Result<bool> {
        self.bool_option(USE_TOOL_DEPENDENCIES)
    }

    pub fn use_cached_dependency_manager(&self) -> Result<bool> {
        self.bool_option(USE_CACHED_DEPENDENCY_MANAGER)
    }

    pub fn tool_dependency_dir(&self) -> Result<Option<PathBuf>> {
        self.path_option(TOOL_DEPENDENCY_DIR)
    }

    pub fn dependency_resolvers_config_file(&self) -> Result<Option<PathBuf>> {
        self.path_option(DEPENDENCY_RESOLVERS_CONFIG_FILE)
    }

    /// Enabled container types and the destinations serving each, in table
    /// key order.
    pub fn container_destinations(
        &self,
    ) -> Result<IndexMap<ContainerType, Vec<ContainerDestination>>> {
        let mut destinations = IndexMap::new();
        let Some(raw) = self.values.get(CONTAINER_DESTINATIONS) else {
            return Ok(destinations);
        };
        let table = raw
            .as_table()
            .ok_or_else(|| anyhow!("option '{CONTAINER_DESTINATIONS}' must be a table"))?;

        for (key, value) in table {
            let container_type = ContainerType::parse(key).ok_or_else(|| {
                anyhow!(
                    "unsupported container type '{key}' in '{CONTAINER_DESTINATIONS}'; supported: docker, singularity"
                )
            })?;
            let entries: Vec<ContainerDestination> = value
                .clone()
                .try_into()
                .with_context(|| format!("invalid destinations for container type '{key}'"))?;
            destinations.insert(container_type, entries);
        }
        Ok(destinations)
    }
}

impl ConfigProvider for AppConfig {
    fn option(&self, key: &str) -> Option<OptionValue> {
        self.values.get(key).cloned()
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve configuration path")?;
        return Ok(PathBuf::from(app_data).join("toolenv").join("config.toml"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve configuration path")?;
    Ok(PathBuf::from(home).join(".toolenv").join("config.toml"))
}
