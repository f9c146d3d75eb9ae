use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use toolenv_core::{
    ContainerDescription, ContainerType, RequirementDeclaration, RequirementType, ResolveOptions,
    ToolRequirement, ToolRequirements,
};
use toolenv_resolver::{
    build_dependency_manager, default_config_path, AppConfig, CacheBuildOutcome,
    DependencyManagement,
};

use crate::completion::write_completions_script;
use crate::render::{current_output_style, render_status_line, OutputStyle};
use crate::{Cli, Commands, RequirementArgs, ResolveArgs};

pub(crate) fn run_cli<W: Write>(cli: Cli, out: &mut W) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions_script(shell, out);
    }

    let config = load_app_config(cli.config.as_deref())?;
    let manager = build_dependency_manager(&config)?;
    tracing::debug!(resolvers = ?manager.resolver_types(), "dependency manager ready");
    run_command(manager.as_ref(), cli.command, current_output_style(), out)
}

pub(crate) fn run_command<W: Write>(
    manager: &dyn DependencyManagement,
    command: Commands,
    style: OutputStyle,
    out: &mut W,
) -> Result<()> {
    match command {
        Commands::ShellCommands {
            requirements,
            resolve,
        } => {
            let declared = load_requirements(&requirements)?;
            let options = resolve_options(&resolve, &requirements)?;
            for line in manager.dependency_shell_commands(&declared, &options)? {
                writeln!(out, "{line}")?;
            }
        }
        Commands::Resolve {
            requirements,
            resolve,
        } => {
            let declared = load_requirements(&requirements)?;
            let options = resolve_options(&resolve, &requirements)?;
            let resolved = manager.requirements_to_dependencies(&declared, &options)?;
            let entries: Vec<serde_json::Value> = resolved
                .iter()
                .map(|(requirement, dependency)| {
                    json!({
                        "requirement": requirement,
                        "dependency": dependency.summary(),
                    })
                })
                .collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
        }
        Commands::BuildCache {
            requirements,
            resolve,
            force_rebuild,
        } => {
            let declared = load_requirements(&requirements)?;
            let options = resolve_options(&resolve, &requirements)?;
            let outcome = manager.build_cache(&declared, &options, force_rebuild)?;
            let (status, message) = match outcome {
                CacheBuildOutcome::Built => ("ok", "built dependency cache"),
                CacheBuildOutcome::Rebuilt => ("ok", "rebuilt dependency cache"),
                CacheBuildOutcome::AlreadyBuilt => ("..", "dependency cache already built"),
                CacheBuildOutcome::Disabled => (
                    "warn",
                    "dependency caching is disabled; enable use_cached_dependency_manager",
                ),
            };
            writeln!(out, "{}", render_status_line(style, status, message))?;
        }
        Commands::Find {
            name,
            version,
            requirement_type,
            resolve,
        } => {
            let requirement_type = RequirementType::parse(&requirement_type).ok_or_else(|| {
                anyhow!(
                    "unsupported requirement type '{requirement_type}'; supported: package, set_environment, environment_variable, other"
                )
            })?;
            let options = resolve_options(&resolve, &RequirementArgs::default())?;
            let dependency =
                manager.find_dep(&name, version.as_deref(), requirement_type, &options)?;
            writeln!(
                out,
                "{}",
                serde_json::to_string_pretty(&dependency.summary())?
            )?;
        }
        Commands::Resolvers => {
            let resolver_types = manager.resolver_types();
            if resolver_types.is_empty() {
                writeln!(
                    out,
                    "{}",
                    render_status_line(
                        style,
                        "warn",
                        "no resolvers configured; dependency management is disabled"
                    )
                )?;
            }
            for (index, resolver_type) in resolver_types.iter().enumerate() {
                writeln!(out, "{index}: {resolver_type}")?;
            }
            if manager.uses_tool_shed_dependencies() {
                writeln!(
                    out,
                    "{}",
                    render_status_line(
                        style,
                        "..",
                        "chain includes installed repository packages"
                    )
                )?;
            }
        }
        Commands::Completions { shell } => write_completions_script(shell, out)?,
    }

    Ok(())
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path),
        None => AppConfig::load_or_default(&default_config_path()?),
    }
}

pub(crate) fn load_requirements(args: &RequirementArgs) -> Result<ToolRequirements> {
    let mut requirements = match &args.requirements_file {
        Some(path) => {
            let content = fs::read_to_string(path).with_context(|| {
                format!("failed reading requirements file: {}", path.display())
            })?;
            ToolRequirements::from_toml_str(&content)
                .with_context(|| format!("invalid requirements file: {}", path.display()))?
        }
        None => ToolRequirements::new(),
    };

    for raw in &args.requirements {
        requirements.push(parse_requirement_spec(raw)?);
    }
    if requirements.is_empty() {
        anyhow::bail!("no requirements given; pass --requirement or --requirements-file");
    }
    Ok(requirements)
}

/// Parses `name[@version][:type]`.
pub(crate) fn parse_requirement_spec(raw: &str) -> Result<ToolRequirement> {
    let (body, requirement_type) = match raw.rsplit_once(':') {
        Some((body, requirement_type)) => (body, Some(requirement_type.to_string())),
        None => (raw, None),
    };
    let (name, version) = match body.split_once('@') {
        Some((name, version)) => (name, Some(version.to_string())),
        None => (body, None),
    };

    RequirementDeclaration {
        name: name.to_string(),
        version,
        requirement_type,
    }
    .to_requirement()
    .with_context(|| format!("invalid requirement '{raw}'"))
}

/// Parses `type:identifier`; the identifier may itself contain colons.
pub(crate) fn parse_container_spec(raw: &str) -> Result<ContainerDescription> {
    let (container_type, identifier) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("container '{raw}' must be written as type:identifier"))?;
    let container_type = ContainerType::parse(container_type).ok_or_else(|| {
        anyhow!("unsupported container type '{container_type}'; supported: docker, singularity")
    })?;
    if identifier.trim().is_empty() {
        anyhow::bail!("container '{raw}' has an empty identifier");
    }
    Ok(ContainerDescription::new(identifier.trim(), container_type))
}

pub(crate) fn resolve_options(
    resolve: &ResolveArgs,
    requirements: &RequirementArgs,
) -> Result<ResolveOptions> {
    let container_descriptions = requirements
        .containers
        .iter()
        .map(|raw| parse_container_spec(raw))
        .collect::<Result<Vec<_>>>()?;
    Ok(ResolveOptions {
        index: resolve.index,
        resolver_type: resolve.resolver_type.clone(),
        install: resolve.install,
        exact: resolve.exact,
        return_null: resolve.return_null,
        search: resolve.search,
        container_descriptions,
    })
}
