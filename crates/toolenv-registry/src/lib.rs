mod conda;
mod conda_ops;
mod explicit_container;
mod local_packages;
mod resolver_config;
mod resolver_registry;
mod shell;
mod tool_shed_packages;

pub use conda::{CondaResolver, CONDA_TYPE};
pub use explicit_container::{ExplicitContainerResolver, EXPLICIT_CONTAINER_TYPE};
pub use local_packages::{LocalPackageResolver, LOCAL_PACKAGES_TYPE};
pub use resolver_config::{read_resolver_config, ResolverConfigEntry, ResolverConfigFile};
pub use resolver_registry::{ResolverChain, ResolverConstructor, ResolverRegistry};
pub use tool_shed_packages::{ToolShedPackageResolver, TOOL_SHED_PACKAGES_TYPE};

pub(crate) use conda::build_conda_resolver;
pub(crate) use explicit_container::build_explicit_container_resolver;
pub(crate) use local_packages::build_local_packages_resolver;
pub(crate) use tool_shed_packages::build_tool_shed_packages_resolver;

#[cfg(test)]
mod tests;
