//! Runs a reducer, then carries out its effects.

use std::future::Future;
use tracing::trace;
use wedding_rsvp_core::{Reducer, Result};

/// Carries out one kind of effect against the stores.
///
/// Effects run one at a time, in the order the reducer returned them. An
/// executor may refresh `state` from what the store returns, for example
/// to pick up fields the store owns.
pub trait Executor<S, E>: Sync {
    /// Execute one effect.
    fn execute<'a>(&'a self, state: &'a mut S, effect: E) -> impl Future<Output = Result<()>> + Send + 'a;
}

/// Reduce `action` over `state` and execute the resulting effects in order.
///
/// The first effect that fails stops the rest; effects already executed stay
/// applied.
///
/// # Errors
///
/// The reducer's refusal, or the first effect's failure.
pub async fn dispatch<R, X>(
    reducer: &R,
    env: &R::Environment,
    executor: &X,
    state: &mut R::State,
    action: R::Action,
) -> Result<()>
where
    R: Reducer,
    X: Executor<R::State, R::Effect>,
{
    let effects = reducer.reduce(state, action, env)?;
    trace!(count = effects.len(), "Executing effects");
    for effect in effects {
        executor.execute(state, effect).await?;
    }
    Ok(())
}
