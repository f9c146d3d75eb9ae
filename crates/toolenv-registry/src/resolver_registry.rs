use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use toolenv_core::{DependencyResolver, ResolverContext, ResolverOptions};

use crate::resolver_config::{read_resolver_config, ResolverConfigEntry, ResolverConfigFile};
use crate::{
    build_conda_resolver, build_explicit_container_resolver, build_local_packages_resolver,
    build_tool_shed_packages_resolver, CONDA_TYPE, EXPLICIT_CONTAINER_TYPE, LOCAL_PACKAGES_TYPE,
    TOOL_SHED_PACKAGES_TYPE,
};

pub type ResolverChain = Vec<Box<dyn DependencyResolver>>;

pub type ResolverConstructor =
    fn(&ResolverContext, &ResolverOptions) -> Result<Box<dyn DependencyResolver>>;

/// Maps resolver-type tags to constructors.
#[derive(Debug, Clone, Default)]
pub struct ResolverRegistry {
    constructors: BTreeMap<String, ResolverConstructor>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtin_resolvers() -> Self {
        let mut registry = Self::new();
        registry
            .constructors
            .insert(TOOL_SHED_PACKAGES_TYPE.to_string(), build_tool_shed_packages_resolver);
        registry
            .constructors
            .insert(LOCAL_PACKAGES_TYPE.to_string(), build_local_packages_resolver);
        registry
            .constructors
            .insert(CONDA_TYPE.to_string(), build_conda_resolver);
        registry.constructors.insert(
            EXPLICIT_CONTAINER_TYPE.to_string(),
            build_explicit_container_resolver,
        );
        registry
    }

    pub fn register(
        &mut self,
        resolver_type: &str,
        constructor: ResolverConstructor,
    ) -> Result<()> {
        if self.constructors.contains_key(resolver_type) {
            anyhow::bail!("resolver type '{resolver_type}' is already registered");
        }
        self.constructors
            .insert(resolver_type.to_string(), constructor);
        Ok(())
    }

    pub fn resolver_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn build_resolver(
        &self,
        context: &ResolverContext,
        resolver_type: &str,
        options: &ResolverOptions,
    ) -> Result<Box<dyn DependencyResolver>> {
        let constructor = self.constructors.get(resolver_type).ok_or_else(|| {
            anyhow!(
                "unknown resolver type '{resolver_type}'; registered: {}",
                self.resolver_types().join(", ")
            )
        })?;
        constructor(context, options)
            .with_context(|| format!("failed constructing resolver '{resolver_type}'"))
    }

    /// Legacy repository packages first, then exact local and conda lookups,
    /// then their versionless fallbacks.
    pub fn default_chain(&self, context: &ResolverContext) -> Result<ResolverChain> {
        let entries = [
            ResolverConfigEntry::new(TOOL_SHED_PACKAGES_TYPE),
            ResolverConfigEntry::new(LOCAL_PACKAGES_TYPE),
            ResolverConfigEntry::new(CONDA_TYPE),
            ResolverConfigEntry::new(LOCAL_PACKAGES_TYPE).with_option("versionless", true),
            ResolverConfigEntry::new(CONDA_TYPE).with_option("versionless", true),
        ];
        self.chain_from_entries(context, &entries)
    }

    pub fn chain_from_config(
        &self,
        context: &ResolverContext,
        config: &ResolverConfigFile,
    ) -> Result<ResolverChain> {
        if config.resolvers.is_empty() {
            tracing::warn!("resolver configuration lists no resolvers; nothing will resolve");
        }
        self.chain_from_entries(context, &config.resolvers)
    }

    /// Builds the chain from `conf_file`, falling back to the default chain
    /// when no file is configured or it cannot be read.
    pub fn load_chain(
        &self,
        context: &ResolverContext,
        conf_file: Option<&Path>,
    ) -> Result<ResolverChain> {
        let Some(conf_file) = conf_file else {
            return self.default_chain(context);
        };
        match read_resolver_config(conf_file)? {
            Some(config) => self
                .chain_from_config(context, &config)
                .with_context(|| {
                    format!(
                        "invalid resolver configuration: {}",
                        conf_file.display()
                    )
                }),
            None => self.default_chain(context),
        }
    }

    fn chain_from_entries(
        &self,
        context: &ResolverContext,
        entries: &[ResolverConfigEntry],
    ) -> Result<ResolverChain> {
        entries
            .iter()
            .map(|entry| self.build_resolver(context, &entry.resolver_type, &entry.options))
            .collect()
    }
}
