use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use toolenv_core::{
    BatchRequest, BatchResolution, ContainerDescription, ContainerDestinations, ContainerType,
    DependencyResolver, DependencyType, RequirementType, ResolveOptions, ResolverContext,
    ResolverOptions, ToolInfo, ToolRequirement, ToolRequirements,
};

use super::*;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    path.push(format!(
        "toolenv-registry-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}

fn context_for(base: &Path) -> ResolverContext {
    ResolverContext::new(base, Arc::new(toml::Table::new()))
}

fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("must create parent directory");
    }
    fs::write(path, content).expect("must write file");
}

fn chain_types(chain: &ResolverChain) -> Vec<String> {
    chain
        .iter()
        .map(|resolver| resolver.resolver_type().to_string())
        .collect()
}

#[test]
fn default_chain_orders_legacy_exact_then_versionless() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();

    let chain = registry
        .default_chain(&context_for(&root))
        .expect("must build default chain");
    assert_eq!(
        chain_types(&chain),
        vec![
            "tool_shed_packages",
            "local_packages",
            "conda",
            "local_packages",
            "conda"
        ]
    );
    assert!(chain[0].is_legacy_repository());
    assert!(chain[1..].iter().all(|resolver| !resolver.is_legacy_repository()));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn default_chain_versionless_entries_follow_default_link() {
    let root = test_root();
    write_file(&root.join("bwa").join("0.7.17").join("env.sh"), "");
    let registry = ResolverRegistry::with_builtin_resolvers();
    let chain = registry
        .default_chain(&context_for(&root))
        .expect("must build default chain");

    let requirement = ToolRequirement::package("bwa", Some("0.7.15"));
    let exact = chain[1]
        .resolve(&requirement, &ResolveOptions::default())
        .expect("exact lookup must complete");
    assert!(exact.is_null());

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(
            root.join("bwa").join("0.7.17"),
            root.join("bwa").join("default"),
        )
        .expect("must create default link");
        let versionless = chain[3]
            .resolve(&requirement, &ResolveOptions::default())
            .expect("versionless lookup must complete");
        assert!(!versionless.is_null());
        assert!(!versionless.exact());
        assert_eq!(versionless.version(), Some("0.7.17"));
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn build_resolver_rejects_unknown_type() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();

    let err = registry
        .build_resolver(&context_for(&root), "modules", &toml::Table::new())
        .expect_err("must reject unknown resolver type");
    assert!(err.to_string().contains("unknown resolver type 'modules'"));
    assert!(err.to_string().contains("local_packages"));

    let _ = fs::remove_dir_all(&root);
}

fn build_unit_resolver(
    _context: &ResolverContext,
    _options: &ResolverOptions,
) -> anyhow::Result<Box<dyn DependencyResolver>> {
    Ok(Box::new(ExplicitContainerResolver))
}

#[test]
fn register_rejects_duplicate_type() {
    let mut registry = ResolverRegistry::with_builtin_resolvers();
    let err = registry
        .register(CONDA_TYPE, build_unit_resolver)
        .expect_err("must reject duplicate resolver type");
    assert!(err.to_string().contains("already registered"));
}

#[test]
fn load_chain_without_config_uses_default_chain() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();

    let unconfigured = registry
        .load_chain(&context_for(&root), None)
        .expect("must build default chain");
    assert_eq!(unconfigured.len(), 5);

    let missing = registry
        .load_chain(
            &context_for(&root),
            Some(&root.join("dependency_resolvers.toml")),
        )
        .expect("missing config must fall back to default chain");
    assert_eq!(chain_types(&missing), chain_types(&unconfigured));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_chain_with_unreadable_config_uses_default_chain() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();
    let conf_dir = root.join("dependency_resolvers.toml");
    fs::create_dir_all(&conf_dir).expect("must create directory in place of config");

    let chain = registry
        .load_chain(&context_for(&root), Some(&conf_dir))
        .expect("unreadable config must fall back to default chain");
    assert_eq!(
        chain_types(&chain),
        vec![
            "tool_shed_packages",
            "local_packages",
            "conda",
            "local_packages",
            "conda"
        ]
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_chain_reads_configured_entries_in_order() {
    let root = test_root();
    let conf_file = root.join("dependency_resolvers.toml");
    write_file(
        &conf_file,
        r#"
version = 1

[[resolvers]]
type = "explicit"

[[resolvers]]
type = "conda"
prefix = "/opt/conda"
versionless = true

[[resolvers]]
type = "local_packages"
"#,
    );
    let registry = ResolverRegistry::with_builtin_resolvers();

    let chain = registry
        .load_chain(&context_for(&root), Some(&conf_file))
        .expect("must build configured chain");
    assert_eq!(chain_types(&chain), vec!["explicit", "conda", "local_packages"]);
    assert!(chain[0].batch().is_some());
    assert!(chain[1].batch().is_none());
    assert_eq!(
        chain[1].config_options().get("prefix"),
        Some(&toml::Value::String("/opt/conda".to_string()))
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn load_chain_fails_for_unknown_configured_type() {
    let root = test_root();
    let conf_file = root.join("dependency_resolvers.toml");
    write_file(
        &conf_file,
        r#"
[[resolvers]]
type = "lmod"
"#,
    );
    let registry = ResolverRegistry::with_builtin_resolvers();

    let err = registry
        .load_chain(&context_for(&root), Some(&conf_file))
        .expect_err("must reject unknown configured type");
    let rendered = format!("{err:#}");
    assert!(rendered.contains("invalid resolver configuration"));
    assert!(rendered.contains("unknown resolver type 'lmod'"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn resolver_config_rejects_malformed_documents() {
    let err = ResolverConfigFile::from_toml_str("resolvers = 3").expect_err("must fail to parse");
    assert!(err.to_string().contains("failed to parse resolver configuration"));

    let err = ResolverConfigFile::from_toml_str("version = 2")
        .expect_err("must reject future version");
    assert!(err.to_string().contains("unsupported resolver configuration version 2"));

    let err = ResolverConfigFile::from_toml_str(
        r#"
[[resolvers]]
type = " "
"#,
    )
    .expect_err("must reject empty type");
    assert!(err.to_string().contains("empty type"));
}

#[test]
fn explicit_resolver_rejects_options() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();
    let mut options = toml::Table::new();
    options.insert("prefix".to_string(), toml::Value::String("/x".to_string()));

    let err = registry
        .build_resolver(&context_for(&root), EXPLICIT_CONTAINER_TYPE, &options)
        .expect_err("must reject unexpected option");
    assert!(format!("{err:#}").contains("takes no options"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn local_packages_prefers_env_script_over_bin() {
    let root = test_root();
    write_file(&root.join("samtools").join("1.9").join("env.sh"), "");
    fs::create_dir_all(root.join("samtools").join("1.9").join("bin")).expect("must create bin");
    fs::create_dir_all(root.join("bwa").join("0.7.17").join("bin")).expect("must create bin");
    let resolver = LocalPackageResolver::new(&root, false);

    let samtools = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.9")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(samtools.exact());
    let commands = samtools.shell_commands();
    assert_eq!(commands.len(), 1);
    assert!(commands[0].starts_with("PACKAGE_BASE="));
    assert!(commands[0].contains("env.sh"));

    let bwa = resolver
        .resolve(
            &ToolRequirement::package("bwa", Some("0.7.17")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    let commands = bwa.shell_commands();
    assert!(commands[0].starts_with("PATH='"));
    assert!(commands[0].ends_with(":\"$PATH\"; export PATH"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn local_packages_ignores_non_package_requirements() {
    let root = test_root();
    write_file(&root.join("blast_env").join("1.0").join("env.sh"), "");
    let resolver = LocalPackageResolver::new(&root, false);

    let dependency = resolver
        .resolve(
            &ToolRequirement::new("blast_env", Some("1.0"), RequirementType::SetEnvironment),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(dependency.is_null());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn tool_shed_packages_finds_installed_repository_script() {
    let root = test_root();
    let install = root
        .join("samtools")
        .join("1.9")
        .join("devteam")
        .join("package_samtools_1_9")
        .join("c0ffee");
    write_file(&install.join("env.sh"), "");
    write_file(
        &root
            .join("environment_settings")
            .join("BLAST_DB")
            .join("devteam")
            .join("blast_datatypes")
            .join("abc123")
            .join("env.sh"),
        "",
    );
    let resolver = ToolShedPackageResolver::new(&root);

    let package = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.9")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(!package.is_null());
    assert!(package.exact());
    assert_eq!(package.dependency_type(), Some(DependencyType::Package));
    assert!(package.shell_commands()[0].contains("c0ffee"));

    let settings = resolver
        .resolve(
            &ToolRequirement::new("BLAST_DB", None, RequirementType::SetEnvironment),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert_eq!(
        settings.dependency_type(),
        Some(DependencyType::SetEnvironment)
    );

    let unversioned = resolver
        .resolve(
            &ToolRequirement::package("samtools", None),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(unversioned.is_null());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn conda_resolves_exact_environment() {
    let root = test_root();
    let prefix = root.join("_conda");
    fs::create_dir_all(prefix.join("envs").join("__samtools@1.9")).expect("must create env");
    let resolver = CondaResolver::new(&prefix, prefix.join("bin").join("conda"), false);

    let found = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.9")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(found.exact());
    assert!(found.cacheable());
    assert!(found.shell_commands()[0].contains("__samtools@1.9"));

    let missing = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.10")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(missing.is_null());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn conda_versionless_picks_highest_version() {
    let root = test_root();
    let prefix = root.join("_conda");
    for env in ["__samtools@1.9", "__samtools@1.10", "__samtools@0.1.19", "__bwa@2.0"] {
        fs::create_dir_all(prefix.join("envs").join(env)).expect("must create env");
    }
    let resolver = CondaResolver::new(&prefix, prefix.join("bin").join("conda"), true);

    let found = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.9")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert_eq!(found.version(), Some("1.10"));
    assert!(!found.exact());

    let unversioned = resolver
        .resolve(
            &ToolRequirement::package("samtools", None),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    assert!(unversioned.exact());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn conda_prefix_falls_back_to_global_app_option() {
    let root = test_root();
    let mut app = toml::Table::new();
    app.insert(
        "conda_prefix".to_string(),
        toml::Value::String(root.join("shared_conda").display().to_string()),
    );
    let context = ResolverContext::new(&root, Arc::new(app));
    let registry = ResolverRegistry::with_builtin_resolvers();

    let resolver = registry
        .build_resolver(&context, CONDA_TYPE, &toml::Table::new())
        .expect("must build conda resolver");
    assert_eq!(
        resolver.config_options().get("prefix"),
        Some(&toml::Value::String(
            root.join("shared_conda").display().to_string()
        ))
    );
    assert_eq!(
        resolver.config_options().get("exec"),
        Some(&toml::Value::String(
            root.join("shared_conda")
                .join("bin")
                .join("conda")
                .display()
                .to_string()
        ))
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn conda_rejects_non_boolean_versionless() {
    let root = test_root();
    let registry = ResolverRegistry::with_builtin_resolvers();
    let mut options = toml::Table::new();
    options.insert(
        "versionless".to_string(),
        toml::Value::String("sometimes".to_string()),
    );

    let err = registry
        .build_resolver(&context_for(&root), CONDA_TYPE, &options)
        .expect_err("must reject invalid flag");
    assert!(format!("{err:#}").contains("must be a boolean"));

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn conda_build_cache_creates_then_installs_into_prefix() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let prefix = root.join("_conda");
    fs::create_dir_all(prefix.join("envs").join("__samtools@1.9")).expect("must create env");
    fs::create_dir_all(prefix.join("envs").join("__bwa@0.7.17")).expect("must create env");
    let log = root.join("conda.log");
    let exec = root.join("fake-conda");
    write_file(
        &exec,
        &format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--prefix\" ]; then mkdir -p \"$2\"; fi\n  shift\ndone\n",
            log.display()
        ),
    );
    fs::set_permissions(&exec, fs::Permissions::from_mode(0o755)).expect("must chmod");
    let resolver = CondaResolver::new(&prefix, &exec, false);
    let cache_path = root.join("cache").join("abcd1234");

    for (name, version) in [("samtools", "1.9"), ("bwa", "0.7.17")] {
        let dependency = resolver
            .resolve(
                &ToolRequirement::package(name, Some(version)),
                &ResolveOptions::default(),
            )
            .expect("lookup must complete");
        dependency
            .build_cache(&cache_path)
            .expect("build must succeed");
    }

    let calls = fs::read_to_string(&log).expect("must read log");
    let lines: Vec<&str> = calls.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("create --yes --quiet --prefix"));
    assert!(lines[0].ends_with("samtools=1.9"));
    assert!(lines[1].starts_with("install --yes --quiet --prefix"));
    assert!(lines[1].ends_with("bwa=0.7.17"));

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn conda_build_cache_reports_failed_install() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let prefix = root.join("_conda");
    fs::create_dir_all(prefix.join("envs").join("__samtools@1.9")).expect("must create env");
    let exec = root.join("fake-conda");
    write_file(&exec, "#!/bin/sh\necho 'PackagesNotFoundError' >&2\nexit 1\n");
    fs::set_permissions(&exec, fs::Permissions::from_mode(0o755)).expect("must chmod");
    let resolver = CondaResolver::new(&prefix, &exec, false);

    let dependency = resolver
        .resolve(
            &ToolRequirement::package("samtools", Some("1.9")),
            &ResolveOptions::default(),
        )
        .expect("lookup must complete");
    let err = dependency
        .build_cache(&root.join("cache").join("abcd1234"))
        .expect_err("build must fail");
    assert!(err.to_string().contains("PackagesNotFoundError"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn explicit_container_uses_first_enabled_description() {
    let resolver = ExplicitContainerResolver;
    let requirements = ToolRequirements::from(vec![ToolRequirement::package(
        "samtools",
        Some("1.9"),
    )]);
    let tool_info = ToolInfo::new(
        requirements.clone(),
        vec![
            ContainerDescription::new("samtools.sif", ContainerType::Singularity),
            ContainerDescription::new("biocontainers/samtools:1.9", ContainerType::Docker),
        ],
    );
    let destinations = ContainerDestinations::new();
    let options = ResolveOptions::default();
    let enabled = [ContainerType::Docker];
    let request = BatchRequest {
        requirements: &requirements,
        enabled_container_types: &enabled,
        destinations: &destinations,
        tool_info: &tool_info,
        options: &options,
    };

    let batch = resolver.batch().expect("explicit resolver is batch capable");
    match batch.resolve_all(&request).expect("must resolve") {
        Some(BatchResolution::Container(description)) => {
            assert_eq!(description.identifier, "biocontainers/samtools:1.9");
        }
        other => panic!("unexpected resolution: {other:?}"),
    }

    let none_enabled = BatchRequest {
        enabled_container_types: &[],
        ..request
    };
    assert!(batch
        .resolve_all(&none_enabled)
        .expect("must complete")
        .is_none());
}
