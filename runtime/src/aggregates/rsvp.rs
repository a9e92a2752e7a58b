//! RSVP responses.
//!
//! A response is written before its guest is pointed at it. On delete the
//! guest is unlinked before the response goes. Anything that changes the
//! wedding's totals ends with a counter reconciliation.

use chrono::Duration;
use std::sync::Arc;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{
    GuestId, Reducer, Result, Rsvp, RsvpError, RsvpId, RsvpPatch, RsvpSource, RsvpSubmission, UserId,
    Wedding, WeddingId,
};

/// Commands on one response.
#[derive(Debug, Clone)]
pub enum RsvpAction {
    /// Record a new response.
    Submit {
        /// The response, with `guest_id` already resolved.
        submission: RsvpSubmission,
        /// Intake channel.
        source: RsvpSource,
    },
    /// Apply a partial update.
    Update {
        /// Signed-in user, if any. The wedding owner is never time-limited.
        caller: Option<UserId>,
        /// Fields to change.
        patch: RsvpPatch,
    },
    /// Remove the response.
    Delete {
        /// Requesting user.
        caller: UserId,
    },
}

/// Writes an RSVP action asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RsvpEffect {
    /// Store a new response.
    Insert(Rsvp),
    /// Overwrite the response's answers.
    Replace(Rsvp),
    /// Point the response's guest at it. Best effort.
    MirrorOntoGuest,
    /// Clear the guest's link if it still points at this response.
    UnlinkGuest(GuestId),
    /// Delete the response.
    Delete(RsvpId),
    /// Recompute the wedding's counters.
    Reconcile(WeddingId),
}

impl RsvpEffect {
    /// Label for metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Replace(_) => "replace",
            Self::MirrorOntoGuest => "mirror_onto_guest",
            Self::UnlinkGuest(_) => "unlink_guest",
            Self::Delete(_) => "delete",
            Self::Reconcile(_) => "reconcile",
        }
    }
}

/// One response and the wedding it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct RsvpState {
    /// Id of the response.
    pub id: RsvpId,
    /// The wedding, whose settings the response is checked against.
    pub wedding: Wedding,
    /// The response, if it exists.
    pub rsvp: Option<Rsvp>,
}

impl RsvpState {
    /// State for a response about to be recorded under `id`.
    #[must_use]
    pub const fn new(id: RsvpId, wedding: Wedding) -> Self {
        Self {
            id,
            wedding,
            rsvp: None,
        }
    }

    /// State for an existing response.
    #[must_use]
    pub fn loaded(rsvp: Rsvp, wedding: Wedding) -> Self {
        Self {
            id: rsvp.id,
            wedding,
            rsvp: Some(rsvp),
        }
    }

    fn existing(&self) -> Result<&Rsvp> {
        self.rsvp
            .as_ref()
            .ok_or_else(|| RsvpError::RsvpNotFound(self.id.to_string()))
    }
}

/// Dependencies of the RSVP reducer.
#[derive(Clone)]
pub struct RsvpEnvironment {
    /// Timestamps and the edit window.
    pub clock: Arc<dyn Clock>,
    /// How long a non-owner may edit after submitting.
    pub edit_window: Duration,
}

impl RsvpEnvironment {
    /// Create the environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, edit_window: Duration) -> Self {
        Self { clock, edit_window }
    }
}

/// Rules for recording, editing and removing responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct RsvpReducer;

impl Reducer for RsvpReducer {
    type State = RsvpState;
    type Action = RsvpAction;
    type Effect = RsvpEffect;
    type Environment = RsvpEnvironment;

    fn reduce(
        &self,
        state: &mut RsvpState,
        action: RsvpAction,
        env: &RsvpEnvironment,
    ) -> Result<Vec<RsvpEffect>> {
        let wedding_id = state.wedding.id;
        let cap = state.wedding.rsvp.effective_plus_one_cap();

        match action {
            RsvpAction::Submit { submission, source } => {
                if state.rsvp.is_some() {
                    return Err(RsvpError::validation("id", "already exists"));
                }
                let submission = submission.normalized(&state.wedding.rsvp, cap)?;
                let guest_id = submission.guest_id;
                let now = env.clock.now();
                let rsvp = Rsvp::from_submission(state.id, wedding_id, guest_id, submission, source, now);

                let mut effects = vec![RsvpEffect::Insert(rsvp.clone())];
                if guest_id.is_some() {
                    effects.push(RsvpEffect::MirrorOntoGuest);
                }
                effects.push(RsvpEffect::Reconcile(wedding_id));
                state.rsvp = Some(rsvp);
                Ok(effects)
            }

            RsvpAction::Update { caller, patch } => {
                let now = env.clock.now();
                let current = state.existing()?;
                let is_owner = caller.is_some_and(|user| state.wedding.is_owned_by(&user));
                if !is_owner && now - current.submitted_at > env.edit_window {
                    return Err(RsvpError::RsvpCannotModify);
                }

                let mut next = current.clone();
                let affects_counters = patch.apply(&mut next, &state.wedding.rsvp, cap, now)?;
                let mut effects = vec![RsvpEffect::Replace(next.clone()), RsvpEffect::MirrorOntoGuest];
                if affects_counters {
                    effects.push(RsvpEffect::Reconcile(wedding_id));
                }
                state.rsvp = Some(next);
                Ok(effects)
            }

            RsvpAction::Delete { caller } => {
                let guest_id = state.existing()?.guest_id;
                if !state.wedding.is_owned_by(&caller) {
                    return Err(RsvpError::Unauthorized);
                }

                let mut effects: Vec<_> = guest_id.map(RsvpEffect::UnlinkGuest).into_iter().collect();
                effects.push(RsvpEffect::Delete(state.id));
                effects.push(RsvpEffect::Reconcile(wedding_id));
                state.rsvp = None;
                Ok(effects)
            }
        }
    }
}
