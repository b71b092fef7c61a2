//! Core of the media library server.
//! Cached repositories, mutation hooks and cascades over the catalog.

pub mod config;
pub mod db;
pub mod library;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{CacheConfig, ConfigError, DatabaseConfig, LibraryConfig, LoggingConfig};
pub use library::{Library, LibraryError, LibraryStats, LibraryStores, ReconcileReport};
pub use logging::{default_log_level, init_logging, logging_status};
pub use repo::{
    CacheMode, ChangeSet, ChangeTracker, Entity, HookError, MutationHooks, RepoError, RepoResult,
    Repository, TrackerScope,
};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
