use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::containers::ContainerDescription;
use crate::requirements::{RequirementType, ToolRequirement};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    Package,
    SetEnvironment,
    Container,
}

impl DependencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::SetEnvironment => "set_environment",
            Self::Container => "container",
        }
    }

    pub fn for_requirement(requirement_type: RequirementType) -> Self {
        match requirement_type {
            RequirementType::SetEnvironment => Self::SetEnvironment,
            _ => Self::Package,
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour a resolver attaches to a resolved package: how to activate it
/// and, for cacheable environments, how to materialize it elsewhere.
pub trait PackageEnvironment: fmt::Debug + Send + Sync {
    fn shell_commands(&self) -> Vec<String>;

    fn cacheable(&self) -> bool {
        false
    }

    /// Populates `cache_path` with this environment. Only called for
    /// cacheable environments.
    fn build_cache(&self, _cache_path: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_cache_path(&mut self, _cache_path: &Path) {}

    fn summary_fields(&self) -> Map<String, Value> {
        Map::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullDependency {
    pub name: String,
    pub version: Option<String>,
    pub reason: String,
}

impl NullDependency {
    pub fn new(name: impl Into<String>, version: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
            reason: reason.into(),
        }
    }

    pub fn unresolved(requirement: &ToolRequirement, reason: impl Into<String>) -> Self {
        Self::new(
            requirement.name.clone(),
            requirement.version.as_deref(),
            reason,
        )
    }
}

#[derive(Debug)]
pub struct PackageDependency {
    pub name: String,
    pub version: Option<String>,
    pub exact: bool,
    pub dependency_type: DependencyType,
    pub resolver_msg: String,
    environment: Box<dyn PackageEnvironment>,
}

impl PackageDependency {
    pub fn new(
        name: impl Into<String>,
        version: Option<&str>,
        exact: bool,
        dependency_type: DependencyType,
        environment: Box<dyn PackageEnvironment>,
    ) -> Self {
        let name = name.into();
        let resolver_msg = match version {
            Some(version) => format!("Using {dependency_type} {name} version {version}"),
            None => format!("Using {dependency_type} {name}"),
        };
        Self {
            name,
            version: version.map(str::to_string),
            exact,
            dependency_type,
            resolver_msg,
            environment,
        }
    }

    pub fn with_resolver_msg(mut self, resolver_msg: impl Into<String>) -> Self {
        self.resolver_msg = resolver_msg.into();
        self
    }

    pub fn environment(&self) -> &dyn PackageEnvironment {
        self.environment.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDependency {
    pub name: String,
    pub version: Option<String>,
    pub description: ContainerDescription,
}

impl ContainerDependency {
    pub fn new(description: ContainerDescription, requirement: &ToolRequirement) -> Self {
        Self {
            name: requirement.name.clone(),
            version: requirement.version.clone(),
            description,
        }
    }
}

/// The resolved answer to one requirement.
#[derive(Debug)]
pub enum Dependency {
    Null(NullDependency),
    Package(PackageDependency),
    Container(ContainerDependency),
}

impl Dependency {
    pub fn name(&self) -> &str {
        match self {
            Self::Null(null) => &null.name,
            Self::Package(package) => &package.name,
            Self::Container(container) => &container.name,
        }
    }

    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Null(null) => null.version.as_deref(),
            Self::Package(package) => package.version.as_deref(),
            Self::Container(container) => container.version.as_deref(),
        }
    }

    pub fn exact(&self) -> bool {
        match self {
            Self::Package(package) => package.exact,
            Self::Null(_) | Self::Container(_) => true,
        }
    }

    pub fn dependency_type(&self) -> Option<DependencyType> {
        match self {
            Self::Null(_) => None,
            Self::Package(package) => Some(package.dependency_type),
            Self::Container(_) => Some(DependencyType::Container),
        }
    }

    pub fn cacheable(&self) -> bool {
        match self {
            Self::Package(package) => package.environment.cacheable(),
            Self::Null(_) | Self::Container(_) => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(_))
    }

    pub fn resolver_msg(&self) -> String {
        match self {
            Self::Null(null) => match &null.version {
                Some(version) => format!(
                    "Dependency {} version {} not found: {}",
                    null.name, version, null.reason
                ),
                None => format!("Dependency {} not found: {}", null.name, null.reason),
            },
            Self::Package(package) => package.resolver_msg.clone(),
            Self::Container(container) => format!(
                "Using {} container {} for {}",
                container.description.container_type,
                container.description.identifier,
                container.name
            ),
        }
    }

    pub fn shell_commands(&self) -> Vec<String> {
        match self {
            Self::Package(package) => package.environment.shell_commands(),
            Self::Null(_) | Self::Container(_) => Vec::new(),
        }
    }

    pub fn build_cache(&self, cache_path: &Path) -> anyhow::Result<()> {
        match self {
            Self::Package(package) if package.environment.cacheable() => {
                package.environment.build_cache(cache_path)
            }
            _ => Ok(()),
        }
    }

    pub fn set_cache_path(&mut self, cache_path: &Path) {
        if let Self::Package(package) = self {
            if package.environment.cacheable() {
                package.environment.set_cache_path(cache_path);
            }
        }
    }

    /// Stamps the requested version onto an unresolved dependency.
    pub fn set_requested_version(&mut self, version: Option<&str>) {
        if let Self::Null(null) = self {
            null.version = version.map(str::to_string);
        }
    }

    pub fn cache_key(&self) -> DependencyKey {
        DependencyKey {
            name: self.name().to_string(),
            version: self.version().map(str::to_string),
            exact: self.exact(),
            dependency_type: self.dependency_type(),
        }
    }

    pub fn summary(&self) -> DependencySummary {
        let (reason, container_description, extra) = match self {
            Self::Null(null) => (Some(null.reason.clone()), None, Map::new()),
            Self::Package(package) => (None, None, package.environment.summary_fields()),
            Self::Container(container) => (None, Some(container.description.clone()), Map::new()),
        };
        DependencySummary {
            model_class: self.model_class(),
            name: self.name().to_string(),
            version: self.version().map(str::to_string),
            exact: self.exact(),
            dependency_type: self.dependency_type(),
            cacheable: self.cacheable(),
            reason,
            container_description,
            extra,
        }
    }

    fn model_class(&self) -> &'static str {
        match self {
            Self::Null(_) => "NullDependency",
            Self::Package(_) => "PackageDependency",
            Self::Container(_) => "ContainerDependency",
        }
    }
}

impl From<NullDependency> for Dependency {
    fn from(null: NullDependency) -> Self {
        Self::Null(null)
    }
}

impl From<PackageDependency> for Dependency {
    fn from(package: PackageDependency) -> Self {
        Self::Package(package)
    }
}

impl From<ContainerDependency> for Dependency {
    fn from(container: ContainerDependency) -> Self {
        Self::Container(container)
    }
}

/// The identity of a dependency for cache hashing purposes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DependencyKey {
    pub name: String,
    pub version: Option<String>,
    pub exact: bool,
    pub dependency_type: Option<DependencyType>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DependencySummary {
    pub model_class: &'static str,
    pub name: String,
    pub version: Option<String>,
    pub exact: bool,
    pub dependency_type: Option<DependencyType>,
    pub cacheable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_description: Option<ContainerDescription>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
