//! Generic cached repository substrate.
//!
//! # Responsibility
//! - Mirror one entity table in memory with secondary indexes.
//! - Route every mutation through typed Begin/End hooks so one repository's
//!   commit can cascade into another's.
//! - Track changed keys for incremental consumers.
//!
//! # Invariants
//! - Cache and indexes are mutually consistent after every completed
//!   mutation; readers never see intermediate state.
//! - Begin hooks precede the durable write and cache update; End hooks
//!   follow them, outside every lock.
//! - Change sets only grow until a consumer drains them.

mod cache;
pub mod cascade;
mod entity;
mod error;
mod guard;
pub mod hooks;
pub mod index;
mod repository;
pub mod scope;
pub mod tracker;

pub use cache::CacheMode;
pub use cascade::{AncestorWalk, CascadeGraph, CascadeGraphError};
pub use entity::Entity;
pub use error::{HookError, HookResult, RepoError, RepoResult};
pub use hooks::{MutationHooks, NoHooks};
pub use index::{Index, IndexSet, NoIndexes};
pub use repository::{Repository, RepositoryDiagnostics};
pub use scope::{AddOrUpdateScope, AddScope, BatchUpdateScope, UpdateScope};
pub use tracker::{ChangeSet, ChangeTracker, ConsumerId, TrackerScope};
