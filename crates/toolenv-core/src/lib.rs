mod config;
mod containers;
mod dependency;
mod requirements;
mod resolver;

pub use config::{option_as_bool, ConfigProvider, OptionValue, ResolverContext, ResolverOptions};
pub use containers::{
    ContainerDescription, ContainerDestination, ContainerDestinations, ContainerType,
    DestinationParams,
};
pub use dependency::{
    ContainerDependency, Dependency, DependencyKey, DependencySummary, DependencyType,
    NullDependency, PackageDependency, PackageEnvironment,
};
pub use requirements::{RequirementDeclaration, RequirementType, ToolRequirement, ToolRequirements};
pub use resolver::{
    BatchRequest, BatchResolution, BatchResolver, ContainerLookup, DependencyResolver,
    ResolveOptions, ToolInfo,
};
