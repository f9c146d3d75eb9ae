use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;

pub type OptionValue = toml::Value;

/// Option name to value. Used both for a resolver's declared defaults and for
/// the explicit overrides of one configured resolver entry.
pub type ResolverOptions = toml::Table;

/// Read access to host-level configuration. `None` means "not configured",
/// which is distinct from a configured `false` or empty string.
pub trait ConfigProvider: fmt::Debug + Send + Sync {
    fn option(&self, key: &str) -> Option<OptionValue>;
}

impl ConfigProvider for toml::Table {
    fn option(&self, key: &str) -> Option<OptionValue> {
        self.get(key).cloned()
    }
}

/// Everything a resolver needs from its owning manager at construction time.
#[derive(Debug, Clone)]
pub struct ResolverContext {
    default_base_path: PathBuf,
    app_config: Arc<dyn ConfigProvider>,
}

impl ResolverContext {
    pub fn new(default_base_path: impl Into<PathBuf>, app_config: Arc<dyn ConfigProvider>) -> Self {
        Self {
            default_base_path: default_base_path.into(),
            app_config,
        }
    }

    pub fn default_base_path(&self) -> &Path {
        &self.default_base_path
    }

    pub fn app_config(&self) -> &Arc<dyn ConfigProvider> {
        &self.app_config
    }

    pub fn app_option(&self, key: &str) -> Option<OptionValue> {
        self.app_config.option(key)
    }

    /// Explicit option first, then the global `<resolver_type>_<key>` app
    /// option, then the resolver's declared default.
    pub fn resolver_option(
        &self,
        resolver_type: &str,
        key: &str,
        explicit: &ResolverOptions,
        defaults: &ResolverOptions,
    ) -> Option<OptionValue> {
        if let Some(value) = explicit.get(key) {
            return Some(value.clone());
        }
        let global_key = format!("{resolver_type}_{key}");
        self.app_option(&global_key)
            .or_else(|| defaults.get(key).cloned())
    }

    pub fn resolver_bool_option(
        &self,
        resolver_type: &str,
        key: &str,
        explicit: &ResolverOptions,
        defaults: &ResolverOptions,
    ) -> anyhow::Result<bool> {
        match self.resolver_option(resolver_type, key, explicit, defaults) {
            None => Ok(false),
            Some(value) => option_as_bool(&value).ok_or_else(|| {
                anyhow!("resolver '{resolver_type}' option '{key}' must be a boolean, got {value}")
            }),
        }
    }

    pub fn resolver_path_option(
        &self,
        resolver_type: &str,
        key: &str,
        explicit: &ResolverOptions,
        defaults: &ResolverOptions,
    ) -> anyhow::Result<Option<PathBuf>> {
        match self.resolver_option(resolver_type, key, explicit, defaults) {
            None => Ok(None),
            Some(OptionValue::String(raw)) => Ok(Some(PathBuf::from(raw))),
            Some(other) => Err(anyhow!(
                "resolver '{resolver_type}' option '{key}' must be a path string, got {other}"
            )),
        }
    }
}

/// Accepts TOML booleans as well as the string spellings hosts tend to write.
pub fn option_as_bool(value: &OptionValue) -> Option<bool> {
    match value {
        OptionValue::Boolean(flag) => Some(*flag),
        OptionValue::String(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        OptionValue::Integer(number) => Some(*number != 0),
        _ => None,
    }
}
