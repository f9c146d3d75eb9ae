use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::error::ErrorKind;
use clap::Parser;
use toolenv_core::{ContainerType, RequirementType};

use super::*;
use crate::completion::write_completions_script;
use crate::dispatch::{
    load_requirements, parse_container_spec, parse_requirement_spec, resolve_options, run_cli,
};
use crate::render::{render_status_line, OutputStyle};

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "toolenv-cli-test-{}-{nanos}-{counter}",
        std::process::id()
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

/// Writes a config enabling tool dependencies with a local-packages-only chain.
fn write_local_config(root: &Path, cached: bool) -> PathBuf {
    let resolvers_file = root.join("dependency_resolvers.toml");
    fs::write(&resolvers_file, "[[resolvers]]\ntype = \"local_packages\"\n")
        .expect("must write resolver configuration");

    let config_path = root.join("config.toml");
    fs::write(
        &config_path,
        format!(
            "use_tool_dependencies = true\ntool_dependency_dir = {:?}\ndependency_resolvers_config_file = {:?}\nuse_cached_dependency_manager = {cached}\n",
            root.join("deps").display().to_string(),
            resolvers_file.display().to_string(),
        ),
    )
    .expect("must write application configuration");
    config_path
}

fn run_to_string(args: &[&str]) -> anyhow::Result<String> {
    let cli = Cli::try_parse_from(args)?;
    let mut out = Vec::new();
    run_cli(cli, &mut out)?;
    Ok(String::from_utf8(out).expect("output must be utf-8"))
}

#[test]
fn cli_parses_shell_commands_with_repeatable_requirements() {
    let cli = Cli::try_parse_from([
        "toolenv",
        "shell-commands",
        "-r",
        "samtools@1.9",
        "--requirement",
        "bwa",
        "--container",
        "docker:quay.io/biocontainers/bwa:0.7.17",
        "--exact",
        "-vv",
    ])
    .expect("command must parse");

    assert_eq!(cli.verbose, 2);
    match cli.command {
        Commands::ShellCommands {
            requirements,
            resolve,
        } => {
            assert_eq!(requirements.requirements, vec!["samtools@1.9", "bwa"]);
            assert_eq!(
                requirements.containers,
                vec!["docker:quay.io/biocontainers/bwa:0.7.17"]
            );
            assert!(resolve.exact);
            assert!(!resolve.install);
            assert!(resolve.index.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_parses_build_cache_and_find_flags() {
    let cli = Cli::try_parse_from([
        "toolenv",
        "build-cache",
        "--requirements-file",
        "reqs.toml",
        "--force-rebuild",
        "--install",
    ])
    .expect("command must parse");
    match cli.command {
        Commands::BuildCache {
            requirements,
            resolve,
            force_rebuild,
        } => {
            assert!(force_rebuild);
            assert!(resolve.install);
            assert_eq!(
                requirements.requirements_file,
                Some(PathBuf::from("reqs.toml"))
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let cli = Cli::try_parse_from([
        "toolenv",
        "find",
        "JAVA_HOME",
        "--type",
        "set_environment",
        "--index",
        "1",
        "--config",
        "custom.toml",
    ])
    .expect("command must parse");
    assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
    match cli.command {
        Commands::Find {
            name,
            version,
            requirement_type,
            resolve,
        } => {
            assert_eq!(name, "JAVA_HOME");
            assert!(version.is_none());
            assert_eq!(requirement_type, "set_environment");
            assert_eq!(resolve.index, Some(1));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn cli_rejects_unknown_completion_shell() {
    let err = Cli::try_parse_from(["toolenv", "completions", "tcsh"])
        .expect_err("unknown shell must fail");
    assert_eq!(err.kind(), ErrorKind::InvalidValue);
}

#[test]
fn requirement_spec_parses_name_version_and_type() {
    let requirement = parse_requirement_spec("samtools@1.9").expect("must parse");
    assert_eq!(requirement.name, "samtools");
    assert_eq!(requirement.version.as_deref(), Some("1.9"));
    assert_eq!(requirement.requirement_type, RequirementType::Package);

    let requirement = parse_requirement_spec("JAVA_HOME:set_environment").expect("must parse");
    assert_eq!(requirement.name, "JAVA_HOME");
    assert!(requirement.version.is_none());
    assert_eq!(requirement.requirement_type, RequirementType::SetEnvironment);

    let requirement = parse_requirement_spec("bwa@0.7.17:package").expect("must parse");
    assert_eq!(requirement.version.as_deref(), Some("0.7.17"));
}

#[test]
fn requirement_spec_rejects_bad_input() {
    let err = parse_requirement_spec("bwa:binary").expect_err("unknown type must fail");
    assert!(format!("{err:#}").contains("unsupported requirement type 'binary'"));

    let err = parse_requirement_spec("bwa@").expect_err("empty version must fail");
    assert!(err.to_string().contains("invalid requirement 'bwa@'"));

    parse_requirement_spec("@1.0").expect_err("empty name must fail");
}

#[test]
fn container_spec_keeps_colons_in_identifier() {
    let container =
        parse_container_spec("singularity:docker://quay.io/biocontainers/bwa:0.7.17")
            .expect("must parse");
    assert_eq!(container.container_type, ContainerType::Singularity);
    assert_eq!(
        container.identifier,
        "docker://quay.io/biocontainers/bwa:0.7.17"
    );

    let err = parse_container_spec("podman:bwa").expect_err("unknown type must fail");
    assert!(err.to_string().contains("unsupported container type 'podman'"));
    parse_container_spec("docker").expect_err("missing identifier must fail");
    parse_container_spec("docker: ").expect_err("blank identifier must fail");
}

#[test]
fn resolve_options_carry_flags_and_containers() {
    let resolve = ResolveArgs {
        index: Some(2),
        resolver_type: Some("conda".to_string()),
        exact: true,
        install: true,
        search: false,
        return_null: true,
    };
    let requirements = RequirementArgs {
        containers: vec!["docker:busybox".to_string()],
        ..RequirementArgs::default()
    };

    let options = resolve_options(&resolve, &requirements).expect("must convert");
    assert_eq!(options.index, Some(2));
    assert_eq!(options.resolver_type.as_deref(), Some("conda"));
    assert!(options.exact && options.install && options.return_null);
    assert!(!options.search);
    assert_eq!(options.container_descriptions.len(), 1);
    assert_eq!(options.container_descriptions[0].identifier, "busybox");
}

#[test]
fn load_requirements_merges_file_and_flags() {
    let root = test_root();
    let file = root.join("requirements.toml");
    fs::write(
        &file,
        "[[requirements]]\nname = \"samtools\"\nversion = \"1.9\"\n\n[[requirements]]\nname = \"JAVA_HOME\"\ntype = \"set_environment\"\n",
    )
    .expect("must write requirements file");

    let args = RequirementArgs {
        requirements: vec!["bwa@0.7.17".to_string(), "samtools@1.9".to_string()],
        requirements_file: Some(file),
        containers: Vec::new(),
    };
    let requirements = load_requirements(&args).expect("must load");
    let names: Vec<&str> = requirements.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["samtools", "JAVA_HOME", "bwa"]);

    let err = load_requirements(&RequirementArgs::default()).expect_err("empty set must fail");
    assert!(err.to_string().contains("no requirements given"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn status_lines_render_plain_and_rich() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "built dependency cache"),
        "built dependency cache"
    );

    let rich = render_status_line(OutputStyle::Rich, "warn", "caching disabled");
    assert!(rich.contains("[WARN]"));
    assert!(rich.contains('\u{1b}'));
    assert!(rich.ends_with(" caching disabled"));

    let info = render_status_line(OutputStyle::Rich, "unknown", "note");
    assert!(info.contains("[..]"));
}

#[test]
fn completions_script_names_binary() {
    let mut out = Vec::new();
    write_completions_script(CliCompletionShell::Bash, &mut out).expect("must generate");
    let script = String::from_utf8(out).expect("script must be utf-8");
    assert!(script.contains("toolenv"));
    assert!(script.contains("shell-commands"));
}

#[test]
fn run_cli_prints_shell_commands_for_local_package() {
    let root = test_root();
    let config = write_local_config(&root, false);
    let bin = root.join("deps").join("bwa").join("0.7.17").join("bin");
    fs::create_dir_all(&bin).expect("must create bin");
    let config_arg = config.display().to_string();

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "shell-commands",
        "-r",
        "bwa@0.7.17",
        "-r",
        "samtools@1.9",
    ])
    .expect("must run");
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("PATH="));
    assert!(lines[0].contains("bwa"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn run_cli_find_and_resolve_emit_json() {
    let root = test_root();
    let config = write_local_config(&root, false);
    fs::create_dir_all(root.join("deps").join("bwa").join("0.7.17").join("bin"))
        .expect("must create bin");
    let config_arg = config.display().to_string();

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "find",
        "bwa",
        "--version",
        "0.7.17",
    ])
    .expect("must run");
    let summary: serde_json::Value = serde_json::from_str(&output).expect("must be json");
    assert_eq!(summary["model_class"], "PackageDependency");
    assert_eq!(summary["name"], "bwa");
    assert_eq!(summary["version"], "0.7.17");
    assert_eq!(summary["exact"], true);

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "resolve",
        "-r",
        "bwa@0.7.17",
        "-r",
        "samtools@1.9",
        "--return-null",
    ])
    .expect("must run");
    let entries: serde_json::Value = serde_json::from_str(&output).expect("must be json");
    let entries = entries.as_array().expect("must be an array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["requirement"]["name"], "bwa");
    assert_eq!(entries[1]["dependency"]["model_class"], "NullDependency");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn run_cli_lists_resolvers_and_builds_cache() {
    let root = test_root();
    let config = write_local_config(&root, true);
    fs::create_dir_all(root.join("deps").join("bwa").join("0.7.17").join("bin"))
        .expect("must create bin");
    let config_arg = config.display().to_string();

    let output = run_to_string(&["toolenv", "--config", &config_arg, "resolvers"])
        .expect("must run");
    assert_eq!(output, "0: local_packages\n");

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "build-cache",
        "-r",
        "bwa@0.7.17",
    ])
    .expect("must run");
    assert!(output.contains("built dependency cache"));

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "build-cache",
        "-r",
        "bwa@0.7.17",
    ])
    .expect("must run");
    assert!(output.contains("dependency cache already built"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn run_cli_reports_disabled_dependency_management() {
    let root = test_root();
    let config = root.join("config.toml");
    fs::write(&config, "use_tool_dependencies = false\n").expect("must write config");
    let config_arg = config.display().to_string();

    let output = run_to_string(&["toolenv", "--config", &config_arg, "resolvers"])
        .expect("must run");
    assert!(output.contains("dependency management is disabled"));

    let output = run_to_string(&[
        "toolenv",
        "--config",
        &config_arg,
        "shell-commands",
        "-r",
        "bwa",
    ])
    .expect("must run");
    assert!(output.is_empty());

    let err = run_to_string(&[
        "toolenv",
        "--config",
        &root.join("missing.toml").display().to_string(),
        "resolvers",
    ])
    .expect_err("missing explicit config must fail");
    assert!(err.to_string().contains("failed reading application configuration"));

    let _ = fs::remove_dir_all(&root);
}
