use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use toolenv_core::{
    option_as_bool, Dependency, DependencyResolver, DependencyType, NullDependency,
    PackageDependency, PackageEnvironment, RequirementType, ResolveOptions, ResolverContext,
    ResolverOptions, ToolRequirement,
};

use crate::shell::shell_quote_path;

pub const LOCAL_PACKAGES_TYPE: &str = "local_packages";

/// Packages installed by hand under `<base>/<name>/<version>/`, with an
/// optional `<base>/<name>/default` link naming the preferred version.
#[derive(Debug, Clone)]
pub struct LocalPackageResolver {
    base_path: PathBuf,
    versionless: bool,
}

impl LocalPackageResolver {
    pub fn new(base_path: impl Into<PathBuf>, versionless: bool) -> Self {
        Self {
            base_path: base_path.into(),
            versionless,
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn versionless(&self) -> bool {
        self.versionless
    }

    fn find_versioned(&self, requirement: &ToolRequirement, version: &str) -> Result<Dependency> {
        let path = self.base_path.join(&requirement.name).join(version);
        Ok(local_package_at(requirement, &path, version, true)?.unwrap_or_else(|| {
            NullDependency::unresolved(
                requirement,
                format!("no env.sh or bin/ under {}", path.display()),
            )
            .into()
        }))
    }

    fn find_default(&self, requirement: &ToolRequirement) -> Result<Dependency> {
        let link = self.base_path.join(&requirement.name).join("default");
        if !link.exists() {
            return Ok(NullDependency::unresolved(
                requirement,
                format!("no default version at {}", link.display()),
            )
            .into());
        }

        let real_path = fs::canonicalize(&link)
            .with_context(|| format!("failed resolving default package link {}", link.display()))?;
        let version = real_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "default".to_string());
        let exact = requirement
            .version
            .as_deref()
            .map_or(true, |requested| requested == version);

        Ok(local_package_at(requirement, &real_path, &version, exact)?.unwrap_or_else(|| {
            NullDependency::unresolved(
                requirement,
                format!("no env.sh or bin/ under {}", real_path.display()),
            )
            .into()
        }))
    }
}

impl DependencyResolver for LocalPackageResolver {
    fn resolver_type(&self) -> &str {
        LOCAL_PACKAGES_TYPE
    }

    fn config_options(&self) -> ResolverOptions {
        let mut defaults = ResolverOptions::new();
        defaults.insert("versionless".to_string(), toml::Value::Boolean(false));
        defaults
    }

    fn resolve(
        &self,
        requirement: &ToolRequirement,
        _options: &ResolveOptions,
    ) -> Result<Dependency> {
        if requirement.requirement_type != RequirementType::Package {
            return Ok(NullDependency::unresolved(
                requirement,
                "local packages only provide package requirements",
            )
            .into());
        }

        match requirement.version.as_deref() {
            Some(version) if !self.versionless => self.find_versioned(requirement, version),
            _ => self.find_default(requirement),
        }
    }
}

pub(crate) fn build_local_packages_resolver(
    context: &ResolverContext,
    options: &ResolverOptions,
) -> Result<Box<dyn DependencyResolver>> {
    let mut defaults = ResolverOptions::new();
    defaults.insert(
        "base_path".to_string(),
        toml::Value::String(context.default_base_path().display().to_string()),
    );
    let base_path = context
        .resolver_path_option(LOCAL_PACKAGES_TYPE, "base_path", options, &defaults)?
        .unwrap_or_else(|| context.default_base_path().to_path_buf());
    let versionless = explicit_bool_option(LOCAL_PACKAGES_TYPE, "versionless", options)?;
    Ok(Box::new(LocalPackageResolver::new(base_path, versionless)))
}

/// Reads a flag that only makes sense per resolver entry, never globally.
pub(crate) fn explicit_bool_option(
    resolver_type: &str,
    key: &str,
    options: &ResolverOptions,
) -> Result<bool> {
    match options.get(key) {
        None => Ok(false),
        Some(value) => option_as_bool(value).ok_or_else(|| {
            anyhow::anyhow!("resolver '{resolver_type}' option '{key}' must be a boolean, got {value}")
        }),
    }
}

fn local_package_at(
    requirement: &ToolRequirement,
    path: &Path,
    version: &str,
    exact: bool,
) -> Result<Option<Dependency>> {
    let Some(environment) = LocalPackageEnvironment::detect(path) else {
        return Ok(None);
    };
    let dependency = PackageDependency::new(
        requirement.name.clone(),
        Some(version),
        exact,
        DependencyType::for_requirement(requirement.requirement_type),
        Box::new(environment),
    )
    .with_resolver_msg(format!(
        "Using local package {} version {} at {}",
        requirement.name,
        version,
        path.display()
    ));
    Ok(Some(dependency.into()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LocalActivation {
    Script(PathBuf),
    Bin(PathBuf),
}

/// A package tree activated by sourcing its `env.sh` or by putting its
/// `bin/` on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalPackageEnvironment {
    path: PathBuf,
    activation: LocalActivation,
}

impl LocalPackageEnvironment {
    pub(crate) fn detect(path: &Path) -> Option<Self> {
        let script = path.join("env.sh");
        if script.is_file() {
            return Some(Self::script(path, script));
        }
        let bin = path.join("bin");
        if bin.is_dir() {
            return Some(Self {
                path: path.to_path_buf(),
                activation: LocalActivation::Bin(bin),
            });
        }
        None
    }

    pub(crate) fn script(path: &Path, script: PathBuf) -> Self {
        Self {
            path: path.to_path_buf(),
            activation: LocalActivation::Script(script),
        }
    }
}

impl PackageEnvironment for LocalPackageEnvironment {
    fn shell_commands(&self) -> Vec<String> {
        match &self.activation {
            LocalActivation::Script(script) => vec![format!(
                "PACKAGE_BASE={}; export PACKAGE_BASE; . {}",
                shell_quote_path(&self.path),
                shell_quote_path(script)
            )],
            LocalActivation::Bin(bin) => vec![format!(
                "PATH={}:\"$PATH\"; export PATH",
                shell_quote_path(bin)
            )],
        }
    }

    fn summary_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "path".to_string(),
            Value::String(self.path.display().to_string()),
        );
        fields
    }
}
