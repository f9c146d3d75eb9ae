use indexmap::IndexMap;
use toolenv_core::{
    ContainerDestination, ContainerDestinations, ContainerType, Dependency, NullDependency,
    RequirementType, ResolveOptions, ToolRequirements,
};

use crate::resolved::ResolvedDependencies;

/// Stands in when dependency management is disabled: resolves nothing and
/// activates nothing.
#[derive(Debug, Clone, Default)]
pub struct NullDependencyManager {
    destinations: ContainerDestinations,
}

impl NullDependencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn destinations(&self) -> &ContainerDestinations {
        &self.destinations
    }

    pub fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        self.destinations
            .set_enabled_container_types(container_types_to_destinations);
    }

    pub fn requirements_to_dependencies(
        &self,
        _requirements: &ToolRequirements,
        _options: &ResolveOptions,
    ) -> ResolvedDependencies {
        ResolvedDependencies::new()
    }

    pub fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        _requirement_type: RequirementType,
    ) -> Dependency {
        NullDependency::new(name, version, "dependency management is disabled").into()
    }
}
