mod app_config;
mod cache;
mod engine;
mod manager;
mod null;
mod resolved;

pub use app_config::{
    default_config_path, AppConfig, CONTAINER_DESTINATIONS, DEPENDENCY_RESOLVERS_CONFIG_FILE,
    TOOL_DEPENDENCY_DIR, USE_CACHED_DEPENDENCY_MANAGER, USE_TOOL_DEPENDENCIES,
};
pub use cache::{
    hash_dependencies, hash_dependency_keys, CacheBuildOutcome, CacheLayout,
    CachedDependencyManager, CACHE_DIR_OPTION, PRECACHE_OPTION,
};
pub use engine::DependencyManager;
pub use manager::{build_dependency_manager, DependencyManagement};
pub use null::NullDependencyManager;
pub use resolved::ResolvedDependencies;
