use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use toolenv_core::{
    option_as_bool, ConfigProvider, Dependency, DependencyKey, DependencyType, OptionValue,
    ResolveOptions, ToolRequirements,
};

use crate::engine::DependencyManager;
use crate::resolved::ResolvedDependencies;

pub const CACHE_DIR_OPTION: &str = "tool_dependency_cache_dir";
pub const PRECACHE_OPTION: &str = "precache_dependencies";

const DIGEST_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBuildOutcome {
    /// The entry already existed and was reused.
    AlreadyBuilt,
    Built,
    /// A stale entry was cleared and built again.
    Rebuilt,
    /// This manager does not cache dependencies.
    Disabled,
}

/// Short digest identifying a set of cacheable dependencies. Non-cacheable
/// dependencies are ignored and order does not matter.
pub fn hash_dependencies<'a>(dependencies: impl IntoIterator<Item = &'a Dependency>) -> Result<String> {
    hash_dependency_keys(
        dependencies
            .into_iter()
            .filter(|dependency| dependency.cacheable())
            .map(Dependency::cache_key)
            .collect(),
    )
}

pub fn hash_dependency_keys(mut keys: Vec<DependencyKey>) -> Result<String> {
    keys.sort();
    let tuples: Vec<(&str, Option<&str>, bool, Option<&str>)> = keys
        .iter()
        .map(|key| {
            (
                key.name.as_str(),
                key.version.as_deref(),
                key.exact,
                key.dependency_type.map(DependencyType::as_str),
            )
        })
        .collect();
    let encoded =
        serde_json::to_string(&tuples).context("failed encoding dependency identities")?;
    let digest = hex::encode(Sha256::digest(encoded.as_bytes()));
    Ok(digest[..DIGEST_LEN].to_string())
}

/// `<root>/<digest>/` entries. `<root>/<digest>.complete` is written once an
/// entry is fully built, and `<root>/<digest>.lock` serializes builders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }

    pub fn lock_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.lock"))
    }

    pub fn complete_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!("{digest}.complete"))
    }

    fn trash_path(&self, digest: &str) -> PathBuf {
        self.root.join(format!(".trash-{digest}-{}", unique_suffix()))
    }

    /// An entry counts as built once its directory exists and its completion
    /// stamp has been written. Lock files play no part.
    pub fn is_built(&self, digest: &str) -> bool {
        self.entry_path(digest).is_dir() && self.complete_path(digest).is_file()
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create cache directory {}", self.root.display()))
    }
}

/// Exclusive advisory lock on building one cache entry. The OS releases it
/// when the guard drops or the holding process dies; the lock file itself
/// stays in place.
#[derive(Debug)]
struct CacheBuildLock {
    _file: File,
}

impl CacheBuildLock {
    /// Waits until no other builder holds the lock.
    fn acquire(path: &Path) -> Result<Self> {
        let file = open_lock_file(path)?;
        file.lock_exclusive()
            .with_context(|| format!("failed to lock cache build lock: {}", path.display()))?;
        Ok(Self::claimed(file))
    }

    /// `None` while another builder holds the lock.
    fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self::claimed(file))),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("failed to lock cache build lock: {}", path.display())),
        }
    }

    fn claimed(mut file: File) -> Self {
        // Holder pid, for whoever inspects a busy lock.
        let _ = file
            .set_len(0)
            .and_then(|()| writeln!(file, "{}", std::process::id()));
        Self { _file: file }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    fs::OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open cache build lock: {}", path.display()))
}

/// A [`DependencyManager`] that materializes cacheable dependencies into a
/// shared, content-addressed directory and activates them from there.
#[derive(Debug)]
pub struct CachedDependencyManager {
    manager: DependencyManager,
    layout: CacheLayout,
}

impl CachedDependencyManager {
    pub fn new(
        default_base_path: impl Into<PathBuf>,
        conf_file: Option<&Path>,
        app_config: Arc<dyn ConfigProvider>,
    ) -> Result<Self> {
        Self::from_manager(DependencyManager::new(
            default_base_path,
            conf_file,
            app_config,
        )?)
    }

    /// Cache root from `tool_dependency_cache_dir`, or `<base>/_cache`.
    pub fn from_manager(manager: DependencyManager) -> Result<Self> {
        let root = match manager.app_option(CACHE_DIR_OPTION) {
            None => manager.default_base_path().join("_cache"),
            Some(OptionValue::String(raw)) => PathBuf::from(raw),
            Some(other) => {
                anyhow::bail!("option '{CACHE_DIR_OPTION}' must be a path string, got {other}")
            }
        };
        let root = std::path::absolute(&root)
            .with_context(|| format!("failed resolving cache directory {}", root.display()))?;
        Ok(Self {
            manager,
            layout: CacheLayout::new(root),
        })
    }

    pub fn manager(&self) -> &DependencyManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut DependencyManager {
        &mut self.manager
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Where the cache entry for `resolved` lives, whether built or not.
    pub fn cache_path(&self, resolved: &ResolvedDependencies) -> Result<PathBuf> {
        Ok(self.layout.entry_path(&hash_dependencies(resolved.values())?))
    }

    pub fn build_cache(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
        force_rebuild: bool,
    ) -> Result<CacheBuildOutcome> {
        let resolved = self
            .manager
            .requirements_to_dependencies(requirements, options)?;
        self.build_resolved(&resolved, force_rebuild)
    }

    /// Activation commands for every resolved dependency, pointing cacheable
    /// ones at the cache entry when it is built. With `precache_dependencies`
    /// a missing entry is built first.
    pub fn dependency_shell_commands(
        &self,
        requirements: &ToolRequirements,
        options: &ResolveOptions,
    ) -> Result<Vec<String>> {
        let mut resolved = self
            .manager
            .requirements_to_dependencies(requirements, options)?;
        let digest = hash_dependencies(resolved.values())?;

        if !self.layout.is_built(&digest) && self.precache_enabled()? {
            self.precache(&resolved, &digest)?;
        }
        if self.layout.is_built(&digest) {
            let entry = self.layout.entry_path(&digest);
            for dependency in resolved.values_mut() {
                dependency.set_cache_path(&entry);
            }
        }

        Ok(resolved
            .values()
            .flat_map(Dependency::shell_commands)
            .collect())
    }

    fn precache_enabled(&self) -> Result<bool> {
        match self.manager.app_option(PRECACHE_OPTION) {
            None => Ok(false),
            Some(value) => option_as_bool(&value).ok_or_else(|| {
                anyhow!("option '{PRECACHE_OPTION}' must be a boolean, got {value}")
            }),
        }
    }

    /// Builds the entry unless another process is already building it, in
    /// which case activation goes ahead uncached.
    fn precache(&self, resolved: &ResolvedDependencies, digest: &str) -> Result<()> {
        self.layout.ensure_root()?;
        match CacheBuildLock::try_acquire(&self.layout.lock_path(digest))? {
            Some(_lock) => {
                self.build_locked(resolved, digest, false)?;
            }
            None => tracing::debug!(
                "Cached dependencies '{}' are being built elsewhere, activating uncached",
                self.layout.entry_path(digest).display()
            ),
        }
        Ok(())
    }

    fn build_resolved(
        &self,
        resolved: &ResolvedDependencies,
        force_rebuild: bool,
    ) -> Result<CacheBuildOutcome> {
        let digest = hash_dependencies(resolved.values())?;
        if !force_rebuild && self.layout.is_built(&digest) {
            tracing::debug!(
                "Cached dependencies directory '{}' already exists, skipping build",
                self.layout.entry_path(&digest).display()
            );
            return Ok(CacheBuildOutcome::AlreadyBuilt);
        }

        self.layout.ensure_root()?;
        let _lock = CacheBuildLock::acquire(&self.layout.lock_path(&digest))?;
        self.build_locked(resolved, &digest, force_rebuild)
    }

    /// Must run under the entry's build lock.
    fn build_locked(
        &self,
        resolved: &ResolvedDependencies,
        digest: &str,
        force_rebuild: bool,
    ) -> Result<CacheBuildOutcome> {
        let entry = self.layout.entry_path(digest);
        let complete = self.layout.complete_path(digest);
        // Another builder may have finished while we waited for the lock.
        if !force_rebuild && self.layout.is_built(digest) {
            return Ok(CacheBuildOutcome::AlreadyBuilt);
        }

        let rebuilt = if fs::symlink_metadata(&entry).is_ok() {
            if !force_rebuild {
                tracing::warn!(
                    "Clearing incomplete cached dependencies directory '{}'",
                    entry.display()
                );
            }
            remove_stamp(&complete)?;
            if let Err(err) = remove_cache_entry(&entry, &self.layout.trash_path(digest)) {
                tracing::warn!(
                    "Could not delete cached dependencies directory '{}': {err:#}",
                    entry.display()
                );
                return Err(err);
            }
            true
        } else {
            false
        };

        let built = build_entry(&entry, resolved).and_then(|()| {
            fs::write(&complete, format!("{digest}\n"))
                .with_context(|| format!("failed to stamp cache entry {}", entry.display()))
        });
        if let Err(err) = built {
            if entry.exists() {
                if let Err(cleanup_err) = fs::remove_dir_all(&entry) {
                    tracing::warn!(
                        "Could not remove partial cache entry '{}': {cleanup_err}",
                        entry.display()
                    );
                }
            }
            return Err(err);
        }

        tracing::debug!("Built cached dependencies in '{}'", entry.display());
        Ok(if rebuilt {
            CacheBuildOutcome::Rebuilt
        } else {
            CacheBuildOutcome::Built
        })
    }
}

fn build_entry(entry: &Path, resolved: &ResolvedDependencies) -> Result<()> {
    for dependency in resolved.values().filter(|dependency| dependency.cacheable()) {
        dependency.build_cache(entry).with_context(|| {
            format!(
                "failed caching {} into {}",
                dependency.name(),
                entry.display()
            )
        })?;
    }
    // An entry with nothing cacheable is still marked as built.
    fs::create_dir_all(entry)
        .with_context(|| format!("failed to create cache entry {}", entry.display()))
}

fn remove_stamp(stamp: &Path) -> Result<()> {
    match fs::remove_file(stamp) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to remove cache stamp {}", stamp.display())),
    }
}

fn remove_cache_entry(entry: &Path, trash: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(entry)
        .with_context(|| format!("failed to inspect cache entry {}", entry.display()))?;
    if !metadata.is_dir() {
        anyhow::bail!("cache entry {} is not a directory", entry.display());
    }
    fs::rename(entry, trash).with_context(|| {
        format!(
            "failed to move cache entry {} aside to {}",
            entry.display(),
            trash.display()
        )
    })?;
    fs::remove_dir_all(trash)
        .with_context(|| format!("failed to remove stale cache entry {}", trash.display()))
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
