use anyhow::Result;
use toolenv_core::{
    BatchRequest, BatchResolution, BatchResolver, ContainerLookup, DependencyResolver,
    ResolverContext, ResolverOptions,
};

pub const EXPLICIT_CONTAINER_TYPE: &str = "explicit";

/// Serves the container a tool names itself, provided its container type is
/// enabled in this deployment.
#[derive(Debug, Clone, Default)]
pub struct ExplicitContainerResolver;

impl DependencyResolver for ExplicitContainerResolver {
    fn resolver_type(&self) -> &str {
        EXPLICIT_CONTAINER_TYPE
    }

    fn batch(&self) -> Option<&dyn BatchResolver> {
        Some(self)
    }

    fn container_lookup(&self) -> Option<ContainerLookup> {
        Some(ContainerLookup::Explicit)
    }
}

impl BatchResolver for ExplicitContainerResolver {
    fn resolve_all(&self, request: &BatchRequest<'_>) -> Result<Option<BatchResolution>> {
        let description = request
            .tool_info
            .container_descriptions
            .iter()
            .find(|description| {
                request
                    .enabled_container_types
                    .contains(&description.container_type)
            });
        Ok(description.map(|description| {
            tracing::debug!(
                "Using explicit {} container {}",
                description.container_type,
                description.identifier
            );
            BatchResolution::Container(description.clone())
        }))
    }
}

pub(crate) fn build_explicit_container_resolver(
    _context: &ResolverContext,
    options: &ResolverOptions,
) -> Result<Box<dyn DependencyResolver>> {
    if let Some(key) = options.keys().next() {
        anyhow::bail!("resolver '{EXPLICIT_CONTAINER_TYPE}' takes no options, got '{key}'");
    }
    Ok(Box::new(ExplicitContainerResolver))
}
