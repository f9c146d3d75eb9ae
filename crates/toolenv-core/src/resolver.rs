use std::fmt;

use crate::config::ResolverOptions;
use crate::containers::{ContainerDescription, ContainerDestinations, ContainerType};
use crate::dependency::{Dependency, NullDependency};
use crate::requirements::{ToolRequirement, ToolRequirements};

/// Per-call switches for one resolution pass over the chain.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    /// Only consult the resolver at this chain position.
    pub index: Option<usize>,
    /// Only consult resolvers of this type.
    pub resolver_type: Option<String>,
    /// Allow resolvers that build or install (image builds, package installs).
    pub install: bool,
    /// Discard answers that do not match the requested version precisely.
    pub exact: bool,
    /// Record unresolved requirements as null dependencies.
    pub return_null: bool,
    /// Allow container resolvers that query remote registries.
    pub search: bool,
    /// Container descriptions the tool declares explicitly.
    pub container_descriptions: Vec<ContainerDescription>,
}

/// What a batch resolver knows about the tool being prepared.
#[derive(Debug, Clone, Default)]
pub struct ToolInfo {
    pub requirements: ToolRequirements,
    pub container_descriptions: Vec<ContainerDescription>,
}

impl ToolInfo {
    pub fn new(
        requirements: ToolRequirements,
        container_descriptions: Vec<ContainerDescription>,
    ) -> Self {
        Self {
            requirements,
            container_descriptions,
        }
    }
}

pub struct BatchRequest<'a> {
    pub requirements: &'a ToolRequirements,
    pub enabled_container_types: &'a [ContainerType],
    pub destinations: &'a ContainerDestinations,
    pub tool_info: &'a ToolInfo,
    pub options: &'a ResolveOptions,
}

#[derive(Debug)]
pub enum BatchResolution {
    /// One dependency per requested requirement, in request order.
    Dependencies(Vec<Dependency>),
    /// A single container serving every requested requirement.
    Container(ContainerDescription),
}

pub trait BatchResolver {
    /// Resolves the whole requirement set at once, or answers `None`.
    fn resolve_all(&self, request: &BatchRequest<'_>) -> anyhow::Result<Option<BatchResolution>>;
}

/// How a container resolver finds images, which decides when the engine may
/// consult it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerLookup {
    /// Images already present locally.
    Cached,
    /// Images named explicitly by the tool.
    Explicit,
    /// Images discovered by querying a remote registry.
    Remote,
    /// Images built on demand.
    Build,
}

pub trait DependencyResolver: fmt::Debug + Send + Sync {
    fn resolver_type(&self) -> &str;

    fn config_options(&self) -> ResolverOptions {
        ResolverOptions::new()
    }

    fn resolve(
        &self,
        requirement: &ToolRequirement,
        _options: &ResolveOptions,
    ) -> anyhow::Result<Dependency> {
        Ok(NullDependency::unresolved(
            requirement,
            format!(
                "resolver '{}' does not resolve single requirements",
                self.resolver_type()
            ),
        )
        .into())
    }

    fn batch(&self) -> Option<&dyn BatchResolver> {
        None
    }

    /// `Some` for container resolvers. Container resolvers never take the
    /// per-requirement path.
    fn container_lookup(&self) -> Option<ContainerLookup> {
        None
    }

    /// Whether this resolver serves packages installed from the legacy
    /// repository.
    fn is_legacy_repository(&self) -> bool {
        false
    }
}
