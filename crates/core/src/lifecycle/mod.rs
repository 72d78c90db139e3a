//! Shared state-machine plumbing for batches and orders.
//!
//! Each entity carries a serde-tagged state enum with a static transition
//! table. Stores persist transitions with compare-and-swap on the state
//! type, so concurrent or redelivered handlers converge on one outcome.

pub(crate) mod sqlite;
mod store;

pub use store::{LifecycleStore, StoreError, TransitionRecord};

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// A state in an entity lifecycle.
pub trait LifecycleState: Clone + Debug + Serialize + DeserializeOwned + Send + Sync {
    /// Stable snake_case name, stored alongside the JSON state.
    fn state_type(&self) -> &'static str;

    fn is_terminal(&self) -> bool;

    /// Whether the static transition table has an edge `self -> next`.
    fn can_transition_to(&self, next: &Self) -> bool;

    /// Human-readable failure reason carried by this state, if any.
    fn failure_reason(&self) -> Option<&str> {
        None
    }
}

/// An entity driven through a lifecycle.
pub trait Lifecycle: Clone + Send + Sync {
    type State: LifecycleState;

    fn id(&self) -> &str;
    fn state(&self) -> &Self::State;
    fn cancel_requested(&self) -> bool;
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validate `next` against the transition table and apply it with CAS.
///
/// The expected state is the one `entity` was loaded with; a concurrent
/// writer surfaces as [`StoreError::Conflict`].
pub fn advance<E, S>(store: &S, entity: &E, next: E::State) -> Result<E, LifecycleError>
where
    E: Lifecycle,
    S: LifecycleStore<E> + ?Sized,
{
    let current = entity.state();
    if !current.can_transition_to(&next) {
        return Err(LifecycleError::InvalidTransition {
            id: entity.id().to_string(),
            from: current.state_type(),
            to: next.state_type(),
        });
    }
    let updated = store.compare_and_swap(entity.id(), current.state_type(), &next)?;
    Ok(updated)
}
