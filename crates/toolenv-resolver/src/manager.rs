use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use indexmap::IndexMap;
use toolenv_core::{
    ConfigProvider, ContainerDestination, ContainerType, Dependency, RequirementType,
    ResolveOptions, ToolRequirements,
};

use crate::app_config::{AppConfig, TOOL_DEPENDENCY_DIR, USE_TOOL_DEPENDENCIES};
use crate::cache::{CacheBuildOutcome, CachedDependencyManager};
use crate::engine::DependencyManager;
use crate::null::NullDependencyManager;
use crate::resolved::ResolvedDependencies;

/// What a host needs from a dependency manager, whichever variant it runs.
pub trait DependencyManagement: fmt::Debug + Send + Sync {
    fn requirements_to_dependencies(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<ResolvedDependencies>;

    fn dependency_shell_commands(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<Vec<String>>;

    fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        requirement_type: RequirementType,
        options: &ResolveOptions,
    ) -> Result<Dependency>;

    fn build_cache(
        &self,
        _requirements: &ToolRequirements,
        _options: &ResolveOptions,
        _force_rebuild: bool,
    ) -> Result<CacheBuildOutcome> {
        Ok(CacheBuildOutcome::Disabled)
    }

    fn uses_tool_shed_dependencies(&self) -> bool;

    fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    );

    fn resolver_types(&self) -> Vec<String>;
}

impl DependencyManagement for DependencyManager {
    fn requirements_to_dependencies(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<ResolvedDependencies> {
        DependencyManager::requirements_to_dependencies(self, requirements, options)
    }

    fn dependency_shell_commands(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        DependencyManager::dependency_shell_commands(self, requirements, options)
    }

    fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        requirement_type: RequirementType,
        options: &ResolveOptions,
    ) -> Result<Dependency> {
        DependencyManager::find_dep(self, name, version, requirement_type, options)
    }

    fn uses_tool_shed_dependencies(&self) -> bool {
        DependencyManager::uses_tool_shed_dependencies(self)
    }

    fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        DependencyManager::set_enabled_container_types(self, container_types_to_destinations);
    }

    fn resolver_types(&self) -> Vec<String> {
        DependencyManager::resolver_types(self)
    }
}

impl DependencyManagement for CachedDependencyManager {
    fn requirements_to_dependencies(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<ResolvedDependencies> {
        self.manager()
            .requirements_to_dependencies(requirements, options)
    }

    fn dependency_shell_commands(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        CachedDependencyManager::dependency_shell_commands(self, requirements, options)
    }

    fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        requirement_type: RequirementType,
        options: &ResolveOptions,
    ) -> Result<Dependency> {
        self.manager()
            .find_dep(name, version, requirement_type, options)
    }

    fn build_cache(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
        force_rebuild: bool,
    ) -> Result<CacheBuildOutcome> {
        CachedDependencyManager::build_cache(self, requirements, options, force_rebuild)
    }

    fn uses_tool_shed_dependencies(&self) -> bool {
        self.manager().uses_tool_shed_dependencies()
    }

    fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        self.manager_mut()
            .set_enabled_container_types(container_types_to_destinations);
    }

    fn resolver_types(&self) -> Vec<String> {
        self.manager().resolver_types()
    }
}

impl DependencyManagement for NullDependencyManager {
    fn requirements_to_dependencies(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<ResolvedDependencies> {
        Ok(NullDependencyManager::requirements_to_dependencies(
            self,
            requirements,
            options,
        ))
    }

    fn dependency_shell_commands(
        &self,
        _requirements: &ToolRequirements,
        _options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn find_dep(
        &self,
        name: &str,
        version: Option<&str>,
        requirement_type: RequirementType,
        _options: &ResolveOptions,
    ) -> Result<Dependency> {
        Ok(NullDependencyManager::find_dep(
            self,
            name,
            version,
            requirement_type,
        ))
    }

    fn uses_tool_shed_dependencies(&self) -> bool {
        false
    }

    fn set_enabled_container_types(
        &mut self,
        container_types_to_destinations: IndexMap<ContainerType, Vec<ContainerDestination>>,
    ) {
        NullDependencyManager::set_enabled_container_types(self, container_types_to_destinations);
    }

    fn resolver_types(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Picks the manager variant the configuration asks for: none unless
/// `use_tool_dependencies` is set, the cached manager with
/// `use_cached_dependency_manager`, the plain one otherwise.
pub fn build_dependency_manager(config: &AppConfig) -> Result<Box<dyn DependencyManagement>> {
    let destinations = config.container_destinations()?;

    let mut manager: Box<dyn DependencyManagement> = if !config.use_tool_dependencies()? {
        Box::new(NullDependencyManager::new())
    } else {
        let base_path = config.tool_dependency_dir()?.ok_or_else(|| {
            anyhow!("'{TOOL_DEPENDENCY_DIR}' must be set when '{USE_TOOL_DEPENDENCIES}' is enabled")
        })?;
        let conf_file = config.dependency_resolvers_config_file()?;
        let app_config: Arc<dyn ConfigProvider> = Arc::new(config.clone());
        if config.use_cached_dependency_manager()? {
            Box::new(CachedDependencyManager::new(
                base_path,
                conf_file.as_deref(),
                app_config,
            )?)
        } else {
            Box::new(DependencyManager::new(
                base_path,
                conf_file.as_deref(),
                app_config,
            )?)
        }
    };

    manager.set_enabled_container_types(destinations);
    Ok(manager)
}
