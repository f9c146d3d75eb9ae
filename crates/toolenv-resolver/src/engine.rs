use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use toolenv_core::{
    BatchRequest, BatchResolution, ConfigProvider, ContainerDependency, ContainerDestination,
    ContainerDestinations, ContainerLookup, ContainerType, Dependency, DependencyResolver,
    DestinationParams, NullDependency, OptionValue, RequirementType, ResolveOptions,
    ResolverContext, ToolInfo, ToolRequirement, ToolRequirements,
};
use toolenv_registry::{ResolverChain, ResolverRegistry};

use crate::resolved::ResolvedDependencies;

/// Resolves tool requirements against an ordered chain of resolvers.
///
/// The chain is fixed at construction. Container destinations can be
/// changed afterwards through [`DependencyManager::set_enabled_container_types`].
#[derive(Debug)]
pub struct DependencyManager {
    default_base_path: PathBuf,
    app_config: Arc<dyn ConfigProvider>,
    resolvers: ResolverChain,
    destinations: ContainerDestinations,
}

impl DependencyManager {
    /// Builds the chain from `conf_file` using the built-in resolver types,
    /// or the default chain when no file is configured or readable.
    pub fn new(
        default_base_path: impl Into<PathBuf>,
        conf_file: Option<&Path>,
        app_config: Arc<dyn ConfigProvider>,
    ) -> Result<Self> {
        Self::with_registry(
            &ResolverRegistry::with_builtin_resolvers(),
            default_base_path,
            conf_file,
            app_config,
        )
    }

    pub fn with_registry(
        registry: &ResolverRegistry,
        default_base_path: impl Into<PathBuf>,
        conf_file: Option<&Path>,
        app_config: Arc<dyn ConfigProvider>,
    ) -> Result<Self> {
        let default_base_path = absolute_base_path(default_base_path.into())?;
        let context = ResolverContext::new(&default_base_path, Arc::clone(&app_config));
        let resolvers = registry.load_chain(&context, conf_file)?;
        Ok(Self {
            default_base_path,
            app_config,
            resolvers,
            destinations: ContainerDestinations::new(),
        })
    }

    /// Uses an already constructed chain instead of a registry.
    pub fn from_resolvers(
        default_base_path: impl Into<PathBuf>,
        app_config: Arc<dyn ConfigProvider>,
        resolvers: ResolverChain,
    ) -> Result<Self> {
        Ok(Self {
            default_base_path: absolute_base_path(default_base_path.into())?,
            app_config,
            resolvers,
            destinations: ContainerDestinations::new(),
        })
    }

    pub fn default_base_path(&self) -> &Path {
        &self.default_base_path
    }

    pub fn app_option(&self, key: &str) -> Option<OptionValue> {
        self.app_config.option(key)
    }

    pub fn resolvers(&self) -> &[Box<dyn DependencyResolver>] {
        &self.resolvers
    }

    pub fn resolver_types(&self) -> Vec<String> {
        self.resolvers
            .iter()
            .map(|resolver| resolver.resolver_type().to_string())
            .collect()
    }

    /// Replaces the enabled container types and their destinations. Types are
    /// enabled in map order.
    pub fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        self.destinations
            .set_enabled_container_types(container_types_to_destinations);
    }

    pub fn enabled_container_types(&self) -> Vec<ContainerType> {
        self.destinations.enabled_container_types()
    }

    pub fn destinations(&self) -> &ContainerDestinations {
        &self.destinations
    }

    pub fn get_destination_info(
        &self,
        container_type: ContainerType,
        destination_id: Option<&str>,
    ) -> Option<&DestinationParams> {
        self.destinations
            .destination_info(container_type, destination_id)
    }

    pub fn uses_tool_shed_dependencies(&self) -> bool {
        self.resolvers
            .iter()
            .any(|resolver| resolver.is_legacy_repository())
    }

    /// Walks the chain and answers every resolvable requirement it can.
    ///
    /// A batch-capable resolver is only asked while nothing is met yet, and a
    /// batch answer ends the walk. Null answers are kept only with
    /// `return_null`, and are replaced by any later concrete answer.
    pub fn requirements_to_dependencies(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<ResolvedDependencies> {
        let resolvable = requirements.resolvable();
        let tool_info = ToolInfo::new(resolvable.clone(), options.container_descriptions.clone());
        let enabled_container_types = self.destinations.enabled_container_types();
        let mut resolved = ResolvedDependencies::new();

        for (index, resolver) in self.resolvers.iter().enumerate() {
            if options.index.is_some_and(|wanted| wanted != index) {
                continue;
            }
            if options
                .resolver_type
                .as_deref()
                .is_some_and(|wanted| wanted != resolver.resolver_type())
            {
                continue;
            }

            let met = resolved.met_count();
            if met == resolvable.len() {
                break;
            }

            let container_lookup = resolver.container_lookup();
            if !container_lookup_allowed(container_lookup, options) {
                tracing::debug!(
                    "Skipping container resolver '{}' without search or install",
                    resolver.resolver_type()
                );
                continue;
            }

            if met == 0 {
                if let Some(batch) = resolver.batch() {
                    let request = BatchRequest {
                        requirements: &resolvable,
                        enabled_container_types: &enabled_container_types,
                        destinations: &self.destinations,
                        tool_info: &tool_info,
                        options,
                    };
                    let answer = batch.resolve_all(&request).with_context(|| {
                        format!(
                            "resolver '{}' failed resolving requirements",
                            resolver.resolver_type()
                        )
                    })?;
                    if let Some(dependencies) =
                        batch_dependencies(resolver.resolver_type(), answer, &resolvable)?
                    {
                        for (requirement, dependency) in resolvable.iter().zip(dependencies) {
                            tracing::debug!("{}", dependency.resolver_msg());
                            resolved.insert(requirement.clone(), dependency);
                        }
                        break;
                    }
                }
            }

            if container_lookup.is_some() {
                continue;
            }

            for requirement in &resolvable {
                if resolved.is_met(requirement) {
                    continue;
                }

                let mut dependency = resolver.resolve(requirement, options).with_context(|| {
                    format!(
                        "resolver '{}' failed resolving {requirement}",
                        resolver.resolver_type()
                    )
                })?;
                if options.exact && !dependency.exact() {
                    continue;
                }
                if dependency.is_null() {
                    if !options.return_null {
                        continue;
                    }
                    dependency.set_requested_version(requirement.version.as_deref());
                }
                tracing::debug!("{}", dependency.resolver_msg());
                resolved.insert(requirement.clone(), dependency);
            }
        }

        Ok(resolved.into_ordered(&resolvable))
    }

    /// Resolves a single requirement; a null dependency when nothing answers.
    pub fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        requirement_type: RequirementType,
        options: &ResolveOptions,
    ) -> Result<Dependency> {
        tracing::debug!(
            "Find dependency {name} version {}",
            version.unwrap_or("(any)")
        );
        let requirements =
            ToolRequirements::from(vec![ToolRequirement::new(name, version, requirement_type)]);
        let resolved = self.requirements_to_dependencies(&requirements, options)?;
        Ok(resolved
            .into_iter()
            .next()
            .map(|(_, dependency)| dependency)
            .unwrap_or_else(|| {
                NullDependency::new(name, version, "no resolver provided this dependency").into()
            }))
    }

    /// Activation commands of the resolved dependencies, in requirement
    /// order. Each dependency contributes its commands once, even when they
    /// match another dependency's; container dependencies contribute nothing.
    pub fn dependency_shell_commands(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        let resolved = self.requirements_to_dependencies(requirements, options)?;
        Ok(resolved
            .values()
            .filter(|dependency| !matches!(dependency, Dependency::Container(_)))
            .flat_map(Dependency::shell_commands)
            .collect())
    }
}

fn absolute_base_path(path: PathBuf) -> Result<PathBuf> {
    if !path.exists() {
        tracing::warn!("Path '{}' does not exist, ignoring", path.display());
    } else if !path.is_dir() {
        tracing::warn!("Path '{}' is not directory, ignoring", path.display());
    }
    std::path::absolute(&path)
        .with_context(|| format!("failed resolving dependency base path {}", path.display()))
}

/// Image builds need `install`; remote registry queries need `search` or
/// `install`.
fn container_lookup_allowed(lookup: Option<ContainerLookup>, options: &ResolveOptions) -> bool {
    match lookup {
        None | Some(ContainerLookup::Cached) | Some(ContainerLookup::Explicit) => true,
        Some(ContainerLookup::Remote) => options.search || options.install,
        Some(ContainerLookup::Build) => options.install,
    }
}

fn batch_dependencies(
    resolver_type: &str,
    answer: Option<BatchResolution>,
    resolvable: &ToolRequirements,
) -> Result<Option<Vec<Dependency>>> {
    match answer {
        None => Ok(None),
        Some(BatchResolution::Dependencies(dependencies)) if dependencies.is_empty() => Ok(None),
        Some(BatchResolution::Dependencies(dependencies)) => {
            if dependencies.len() != resolvable.len() {
                anyhow::bail!(
                    "resolver '{resolver_type}' returned {} dependencies for {} requirements",
                    dependencies.len(),
                    resolvable.len()
                );
            }
            Ok(Some(dependencies))
        }
        Some(BatchResolution::Container(description)) => Ok(Some(
            resolvable
                .iter()
                .map(|requirement| {
                    Dependency::from(ContainerDependency::new(description.clone(), requirement))
                })
                .collect(),
        )),
    }
}
