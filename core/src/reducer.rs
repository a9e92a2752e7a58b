//! The reducer seam.
//!
//! Business rules for a document live in a [`Reducer`]: given the current
//! state and an action, it validates the action, updates the state in place
//! and returns descriptions of the writes that make the change durable. It
//! performs no I/O, so every rule can be tested without a store.
//!
//! The runtime loads the state, calls [`Reducer::reduce`] and then carries
//! out the returned effects in order:
//!
//! ```text
//!            ┌────────────────────────────┐
//! action ───▶│ reduce(&mut state, action) │───▶ [effect, effect, ...] ───▶ executor ───▶ stores
//!            └────────────────────────────┘
//! ```

use crate::error::Result;

/// Pure business logic for one kind of document.
///
/// # Example
///
/// ```ignore
/// impl Reducer for WeddingReducer {
///     type State = WeddingState;
///     type Action = WeddingAction;
///     type Effect = WeddingEffect;
///     type Environment = WeddingEnvironment;
///
///     fn reduce(
///         &self,
///         state: &mut WeddingState,
///         action: WeddingAction,
///         env: &WeddingEnvironment,
///     ) -> Result<Vec<WeddingEffect>> {
///         match action {
///             WeddingAction::Archive { caller } => { /* rules */ Ok(vec![]) }
///             _ => Ok(vec![]),
///         }
///     }
/// }
/// ```
pub trait Reducer {
    /// The state this reducer operates on.
    type State;

    /// The actions it accepts.
    type Action;

    /// Descriptions of the writes it asks for.
    type Effect;

    /// Injected dependencies, such as the clock.
    type Environment;

    /// Reduce an action into state changes and effects.
    ///
    /// On success the state reflects the action and the effects, executed in
    /// order, make it durable. An empty vector means nothing needs writing.
    ///
    /// # Errors
    ///
    /// The action is refused. The state is left unchanged.
    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> Result<Vec<Self::Effect>>;
}
