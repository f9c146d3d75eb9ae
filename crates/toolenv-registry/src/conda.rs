use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use semver::Version;
use serde_json::{Map, Value};
use toolenv_core::{
    Dependency, DependencyResolver, DependencyType, NullDependency, PackageDependency,
    PackageEnvironment, RequirementType, ResolveOptions, ResolverContext, ResolverOptions,
    ToolRequirement,
};

use crate::conda_ops::run_conda_install;
use crate::local_packages::explicit_bool_option;
use crate::shell::shell_quote_path;

pub const CONDA_TYPE: &str = "conda";

const ENV_NAME_PREFIX: &str = "__";

/// Per-package conda environments named `__<name>@<version>` under
/// `<prefix>/envs`.
#[derive(Debug, Clone)]
pub struct CondaResolver {
    prefix: PathBuf,
    exec: PathBuf,
    versionless: bool,
}

impl CondaResolver {
    pub fn new(prefix: impl Into<PathBuf>, exec: impl Into<PathBuf>, versionless: bool) -> Self {
        Self {
            prefix: prefix.into(),
            exec: exec.into(),
            versionless,
        }
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn versionless(&self) -> bool {
        self.versionless
    }

    fn envs_dir(&self) -> PathBuf {
        self.prefix.join("envs")
    }

    fn find_versioned(&self, requirement: &ToolRequirement, version: &str) -> Dependency {
        let env_path = self.envs_dir().join(env_name(&requirement.name, version));
        if env_path.is_dir() {
            return self.dependency(requirement, env_path, version, true);
        }
        NullDependency::unresolved(
            requirement,
            format!("conda environment {} not found", env_path.display()),
        )
        .into()
    }

    fn find_highest(&self, requirement: &ToolRequirement) -> Result<Dependency> {
        let envs_dir = self.envs_dir();
        let entries = match fs::read_dir(&envs_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(NullDependency::unresolved(
                    requirement,
                    format!("conda environments directory {} not found", envs_dir.display()),
                )
                .into());
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed reading conda environments {}", envs_dir.display())
                });
            }
        };

        let name_prefix = format!("{ENV_NAME_PREFIX}{}@", requirement.name);
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            if let Some(version) = file_name.strip_prefix(&name_prefix) {
                if !version.is_empty() {
                    versions.push(version.to_string());
                }
            }
        }

        versions.sort();
        let Some(version) = versions.into_iter().max_by(|left, right| compare_versions(left, right))
        else {
            return Ok(NullDependency::unresolved(
                requirement,
                format!("no conda environment for {} in {}", requirement.name, envs_dir.display()),
            )
            .into());
        };

        let exact = requirement
            .version
            .as_deref()
            .map_or(true, |requested| requested == version);
        let env_path = envs_dir.join(env_name(&requirement.name, &version));
        Ok(self.dependency(requirement, env_path, &version, exact))
    }

    fn dependency(
        &self,
        requirement: &ToolRequirement,
        env_path: PathBuf,
        version: &str,
        exact: bool,
    ) -> Dependency {
        let environment = CondaEnvironment {
            activate: self.prefix.join("bin").join("activate"),
            exec: self.exec.clone(),
            env_path,
            package_spec: format!("{}={}", requirement.name, version),
            cache_path: None,
        };
        PackageDependency::new(
            requirement.name.clone(),
            Some(version),
            exact,
            DependencyType::Package,
            Box::new(environment),
        )
        .with_resolver_msg(format!(
            "Using conda environment for {} version {}",
            requirement.name, version
        ))
        .into()
    }
}

impl DependencyResolver for CondaResolver {
    fn resolver_type(&self) -> &str {
        CONDA_TYPE
    }

    fn config_options(&self) -> ResolverOptions {
        let mut defaults = ResolverOptions::new();
        defaults.insert(
            "prefix".to_string(),
            toml::Value::String(self.prefix.display().to_string()),
        );
        defaults.insert(
            "exec".to_string(),
            toml::Value::String(self.exec.display().to_string()),
        );
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
                "conda only provides package requirements",
            )
            .into());
        }

        match requirement.version.as_deref() {
            Some(version) if !self.versionless => Ok(self.find_versioned(requirement, version)),
            _ => self.find_highest(requirement),
        }
    }
}

pub(crate) fn build_conda_resolver(
    context: &ResolverContext,
    options: &ResolverOptions,
) -> Result<Box<dyn DependencyResolver>> {
    let mut defaults = ResolverOptions::new();
    defaults.insert(
        "prefix".to_string(),
        toml::Value::String(context.default_base_path().join("_conda").display().to_string()),
    );
    let prefix = context
        .resolver_path_option(CONDA_TYPE, "prefix", options, &defaults)?
        .unwrap_or_else(|| context.default_base_path().join("_conda"));

    defaults.insert(
        "exec".to_string(),
        toml::Value::String(prefix.join("bin").join("conda").display().to_string()),
    );
    let exec = context
        .resolver_path_option(CONDA_TYPE, "exec", options, &defaults)?
        .unwrap_or_else(|| prefix.join("bin").join("conda"));
    let versionless = explicit_bool_option(CONDA_TYPE, "versionless", options)?;

    Ok(Box::new(CondaResolver::new(prefix, exec, versionless)))
}

fn env_name(name: &str, version: &str) -> String {
    format!("{ENV_NAME_PREFIX}{name}@{version}")
}

/// Semver ordering where both sides parse (short versions are padded), plain
/// string ordering otherwise.
fn compare_versions(left: &str, right: &str) -> Ordering {
    match (lenient_version(left), lenient_version(right)) {
        (Some(left), Some(right)) => left.cmp(&right),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => left.cmp(right),
    }
}

fn lenient_version(raw: &str) -> Option<Version> {
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    let parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut numbers = [0_u64; 3];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        *slot = part.parse().ok()?;
    }
    Some(Version::new(numbers[0], numbers[1], numbers[2]))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CondaEnvironment {
    activate: PathBuf,
    exec: PathBuf,
    env_path: PathBuf,
    package_spec: String,
    cache_path: Option<PathBuf>,
}

impl CondaEnvironment {
    fn active_path(&self) -> &Path {
        self.cache_path.as_deref().unwrap_or(&self.env_path)
    }
}

impl PackageEnvironment for CondaEnvironment {
    fn shell_commands(&self) -> Vec<String> {
        vec![format!(
            ". {} {}",
            shell_quote_path(&self.activate),
            shell_quote_path(self.active_path())
        )]
    }

    fn cacheable(&self) -> bool {
        true
    }

    fn build_cache(&self, cache_path: &Path) -> Result<()> {
        run_conda_install(&self.exec, cache_path, &self.package_spec)
    }

    fn set_cache_path(&mut self, cache_path: &Path) {
        self.cache_path = Some(cache_path.to_path_buf());
    }

    fn summary_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(
            "environment_path".to_string(),
            Value::String(self.env_path.display().to_string()),
        );
        if let Some(cache_path) = &self.cache_path {
            fields.insert(
                "cache_path".to_string(),
                Value::String(cache_path.display().to_string()),
            );
        }
        fields
    }
}
