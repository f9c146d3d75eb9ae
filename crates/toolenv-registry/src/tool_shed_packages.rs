use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use toolenv_core::{
    Dependency, DependencyResolver, DependencyType, NullDependency, PackageDependency,
    RequirementType, ResolveOptions, ResolverContext, ResolverOptions, ToolRequirement,
};

use crate::local_packages::LocalPackageEnvironment;

pub const TOOL_SHED_PACKAGES_TYPE: &str = "tool_shed_packages";

/// Number of `<owner>/<repository>/<revision>` levels below a package version.
const REPOSITORY_DEPTH: usize = 3;

/// Packages installed from the legacy tool repository, laid out as
/// `<base>/<name>/<version>/<owner>/<repository>/<revision>/env.sh`.
#[derive(Debug, Clone)]
pub struct ToolShedPackageResolver {
    base_path: PathBuf,
}

impl ToolShedPackageResolver {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn search_root(&self, requirement: &ToolRequirement) -> Option<(PathBuf, Option<String>)> {
        match requirement.requirement_type {
            RequirementType::Package => requirement.version.as_ref().map(|version| {
                (
                    self.base_path.join(&requirement.name).join(version),
                    Some(version.clone()),
                )
            }),
            RequirementType::SetEnvironment => Some((
                self.base_path
                    .join("environment_settings")
                    .join(&requirement.name),
                None,
            )),
            RequirementType::EnvironmentVariable | RequirementType::Other => None,
        }
    }
}

impl DependencyResolver for ToolShedPackageResolver {
    fn resolver_type(&self) -> &str {
        TOOL_SHED_PACKAGES_TYPE
    }

    fn resolve(
        &self,
        requirement: &ToolRequirement,
        _options: &ResolveOptions,
    ) -> Result<Dependency> {
        let Some((root, version)) = self.search_root(requirement) else {
            return Ok(NullDependency::unresolved(
                requirement,
                "installed repository packages require a version",
            )
            .into());
        };

        let Some(script) = find_installed_script(&root)? else {
            return Ok(NullDependency::unresolved(
                requirement,
                format!("no installed repository under {}", root.display()),
            )
            .into());
        };

        let install_dir = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.clone());
        let environment = LocalPackageEnvironment::script(&install_dir, script);
        let dependency = PackageDependency::new(
            requirement.name.clone(),
            version.as_deref(),
            true,
            DependencyType::for_requirement(requirement.requirement_type),
            Box::new(environment),
        )
        .with_resolver_msg(format!(
            "Using installed repository {} {} at {}",
            requirement.requirement_type,
            requirement.name,
            install_dir.display()
        ));
        Ok(dependency.into())
    }

    fn is_legacy_repository(&self) -> bool {
        true
    }
}

pub(crate) fn build_tool_shed_packages_resolver(
    context: &ResolverContext,
    options: &ResolverOptions,
) -> Result<Box<dyn DependencyResolver>> {
    let base_path = context
        .resolver_path_option(
            TOOL_SHED_PACKAGES_TYPE,
            "base_path",
            options,
            &ResolverOptions::new(),
        )?
        .unwrap_or_else(|| context.default_base_path().to_path_buf());
    Ok(Box::new(ToolShedPackageResolver::new(base_path)))
}

/// First `env.sh` exactly `REPOSITORY_DEPTH` levels below `root`, walking
/// directories in name order.
fn find_installed_script(root: &Path) -> Result<Option<PathBuf>> {
    let mut level = vec![root.to_path_buf()];
    for _ in 0..REPOSITORY_DEPTH {
        let mut next = Vec::new();
        for dir in &level {
            if !dir.is_dir() {
                continue;
            }
            let mut children = Vec::new();
            for entry in fs::read_dir(dir)
                .with_context(|| format!("failed reading repository directory {}", dir.display()))?
            {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    children.push(entry.path());
                }
            }
            children.sort();
            next.extend(children);
        }
        level = next;
    }

    Ok(level
        .into_iter()
        .map(|dir| dir.join("env.sh"))
        .find(|script| script.is_file()))
}
