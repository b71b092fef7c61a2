//! Two-phase mutation hooks.
//!
//! # Invariants
//! - `begin_*` runs under the repository's commit mutex, before any durable
//!   write. It may adjust the entity and read other repositories, but must
//!   not mutate them.
//! - `end_*` runs after the commit mutex and cache lock are released; this
//!   is where cascades into other repositories happen.

use crate::repo::error::HookResult;
use crate::repo::Entity;

/// Typed Begin/End callbacks for one entity type.
pub trait MutationHooks<T: Entity>: Send + Sync + 'static {
    /// Per-call parameters threaded from the caller to both phases.
    type Params: Default + Clone + Send + Sync;
    /// Value handed from `begin_save` to `end_save`.
    type SaveContext: Send;
    /// Value handed from `begin_delete` to `end_delete`.
    type DeleteContext: Send;

    fn begin_save(
        &self,
        entity: &mut T,
        original: Option<&T>,
        params: &Self::Params,
    ) -> HookResult<Self::SaveContext>;

    fn end_save(
        &self,
        entity: &T,
        context: Self::SaveContext,
        params: &Self::Params,
    ) -> HookResult<()>;

    fn begin_delete(&self, entity: &T, params: &Self::Params) -> HookResult<Self::DeleteContext>;

    fn end_delete(
        &self,
        entity: &T,
        context: Self::DeleteContext,
        params: &Self::Params,
    ) -> HookResult<()>;
}

/// Hooks for repositories without side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl<T: Entity> MutationHooks<T> for NoHooks {
    type Params = ();
    type SaveContext = ();
    type DeleteContext = ();

    fn begin_save(&self, _entity: &mut T, _original: Option<&T>, _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn end_save(&self, _entity: &T, _context: (), _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn begin_delete(&self, _entity: &T, _params: &()) -> HookResult<()> {
        Ok(())
    }

    fn end_delete(&self, _entity: &T, _context: (), _params: &()) -> HookResult<()> {
        Ok(())
    }
}
