//! Error taxonomy of the mutation pipeline.
//!
//! # Invariants
//! - `Store` and `BeginHook` failures leave cache, index and tracker untouched.
//! - `Cascade` failures happen after the primary commit; it is not rolled back.

use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;
pub type HookResult<T> = Result<T, HookError>;

/// Failure raised by a Begin/End hook.
#[derive(Debug)]
pub enum HookError {
    /// Domain rule refused the mutation.
    Rejected(String),
    /// A downstream repository mutation failed.
    Cascade(Box<RepoError>),
    /// Hook's registry was dropped before the hook ran.
    Detached(&'static str),
}

impl Display for HookError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "rejected: {reason}"),
            Self::Cascade(err) => write!(f, "cascade failed: {err}"),
            Self::Detached(repository) => {
                write!(f, "registry for `{repository}` hooks is no longer alive")
            }
        }
    }
}

impl Error for HookError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Cascade(err) => Some(err.as_ref()),
            Self::Rejected(_) | Self::Detached(_) => None,
        }
    }
}

impl From<RepoError> for HookError {
    fn from(value: RepoError) -> Self {
        Self::Cascade(Box::new(value))
    }
}

/// Repository operation failure.
#[derive(Debug)]
pub enum RepoError {
    /// Durable write or read failed; in-memory state is unchanged.
    Store {
        repository: &'static str,
        source: StoreError,
    },
    /// Begin hook refused or failed before any durable write.
    BeginHook {
        repository: &'static str,
        key: String,
        source: HookError,
    },
    /// End hook failed after the primary commit succeeded.
    Cascade {
        repository: &'static str,
        key: String,
        source: HookError,
    },
    /// Update commit targeted an entity that no longer exists.
    NotFound {
        repository: &'static str,
        key: String,
    },
}

impl RepoError {
    /// True when the primary mutation is durable despite this error.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Cascade { .. })
    }

    pub fn repository(&self) -> &'static str {
        match self {
            Self::Store { repository, .. }
            | Self::BeginHook { repository, .. }
            | Self::Cascade { repository, .. }
            | Self::NotFound { repository, .. } => repository,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store { repository, source } => {
                write!(f, "{repository}: store failure: {source}")
            }
            Self::BeginHook {
                repository,
                key,
                source,
            } => write!(f, "{repository}[{key}]: begin hook failed: {source}"),
            Self::Cascade {
                repository,
                key,
                source,
            } => write!(
                f,
                "{repository}[{key}]: committed, but end hook failed: {source}"
            ),
            Self::NotFound { repository, key } => {
                write!(f, "{repository}[{key}]: entity not found")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store { source, .. } => Some(source),
            Self::BeginHook { source, .. } | Self::Cascade { source, .. } => Some(source),
            Self::NotFound { .. } => None,
        }
    }
}
