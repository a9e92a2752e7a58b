//! Reducers for the documents that have lifecycle rules.
//!
//! Each aggregate defines its state, the actions it accepts, the effects it
//! asks for and a [`Reducer`](wedding_rsvp_core::Reducer) tying them together.
//! The services load state, dispatch an action and execute the effects.

pub mod rsvp;
pub mod wedding;

pub use rsvp::{RsvpAction, RsvpEffect, RsvpEnvironment, RsvpReducer, RsvpState};
pub use wedding::{WeddingAction, WeddingEffect, WeddingEnvironment, WeddingReducer, WeddingState};
