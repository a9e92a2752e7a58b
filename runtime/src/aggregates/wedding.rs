//! Wedding lifecycle.
//!
//! ```text
//!            publish            archive
//!  draft ─────────────▶ published ─────────▶ archived
//!    │                      │                   ▲
//!    │                      │ event date passed │
//!    │                      ▼                   │
//!    │                   expired ───────────────┤
//!    └──────────────────────────────────────────┘
//!                       archive
//! ```
//!
//! Publishing needs couple and event details. Archived and expired weddings
//! cannot be published again. Publishing or archiving twice changes nothing.
//! Expiry is applied in bulk by the sweeper, not through this reducer.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_core::{
    NewWedding, Reducer, Result, RsvpError, UserId, Wedding, WeddingId, WeddingPatch, WeddingStatus,
};

/// Commands on one wedding.
#[derive(Debug, Clone)]
pub enum WeddingAction {
    /// Create a draft.
    Create {
        /// Owner of the new wedding.
        owner: UserId,
        /// Owner input.
        input: NewWedding,
    },
    /// Apply a partial update.
    Update {
        /// Requesting user.
        caller: UserId,
        /// Fields to change.
        patch: WeddingPatch,
    },
    /// Make the wedding live at its slug.
    Publish {
        /// Requesting user.
        caller: UserId,
    },
    /// Retire the wedding.
    Archive {
        /// Requesting user.
        caller: UserId,
    },
    /// Remove the wedding with its guests and RSVPs.
    Delete {
        /// Requesting user.
        caller: UserId,
    },
}

/// Writes a wedding action asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum WeddingEffect {
    /// Store a new wedding.
    Insert(Wedding),
    /// Overwrite the owner-editable fields.
    SaveContent(Wedding),
    /// Move to a new status.
    SetStatus {
        /// Wedding.
        id: WeddingId,
        /// New status.
        status: WeddingStatus,
        /// `updated_at` to record.
        at: DateTime<Utc>,
    },
    /// Delete the wedding and its children.
    Delete(WeddingId),
}

impl WeddingEffect {
    /// Label for metrics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::SaveContent(_) => "save_content",
            Self::SetStatus { .. } => "set_status",
            Self::Delete(_) => "delete",
        }
    }
}

/// One wedding, or the id it will be created under.
#[derive(Debug, Clone, PartialEq)]
pub struct WeddingState {
    /// Id of the wedding.
    pub id: WeddingId,
    /// The document, if it exists.
    pub wedding: Option<Wedding>,
}

impl WeddingState {
    /// State for a wedding about to be created under `id`.
    #[must_use]
    pub const fn new(id: WeddingId) -> Self {
        Self { id, wedding: None }
    }

    /// State for an existing wedding.
    #[must_use]
    pub fn loaded(wedding: Wedding) -> Self {
        Self {
            id: wedding.id,
            wedding: Some(wedding),
        }
    }

    /// Current status, if the wedding exists.
    #[must_use]
    pub fn status(&self) -> Option<WeddingStatus> {
        self.wedding.as_ref().map(|w| w.status)
    }

    /// The wedding, checked to belong to `caller`.
    fn owned_by(&mut self, caller: &UserId) -> Result<&mut Wedding> {
        let id = self.id;
        let wedding = self
            .wedding
            .as_mut()
            .ok_or_else(|| RsvpError::not_found("wedding", id))?;
        if !wedding.is_owned_by(caller) {
            return Err(RsvpError::Unauthorized);
        }
        Ok(wedding)
    }
}

/// Dependencies of the wedding reducer.
#[derive(Clone)]
pub struct WeddingEnvironment {
    /// Timestamps.
    pub clock: Arc<dyn Clock>,
}

impl WeddingEnvironment {
    /// Create the environment.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// `updated_at` for a change made at `now`, strictly after `previous`.
fn next_updated_at(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(previous + Duration::milliseconds(1))
}

/// Lifecycle rules for weddings.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeddingReducer;

impl Reducer for WeddingReducer {
    type State = WeddingState;
    type Action = WeddingAction;
    type Effect = WeddingEffect;
    type Environment = WeddingEnvironment;

    fn reduce(
        &self,
        state: &mut WeddingState,
        action: WeddingAction,
        env: &WeddingEnvironment,
    ) -> Result<Vec<WeddingEffect>> {
        match action {
            WeddingAction::Create { owner, input } => {
                if state.wedding.is_some() {
                    return Err(RsvpError::validation("id", "already exists"));
                }
                input.validate()?;
                let wedding = Wedding::draft(state.id, owner, input, env.clock.now());
                state.wedding = Some(wedding.clone());
                Ok(vec![WeddingEffect::Insert(wedding)])
            }

            WeddingAction::Update { caller, patch } => {
                // Bad input is reported before existence or ownership.
                patch.validate()?;
                let wedding = state.owned_by(&caller)?;
                patch.apply(wedding);
                wedding.updated_at = next_updated_at(wedding.updated_at, env.clock.now());
                Ok(vec![WeddingEffect::SaveContent(wedding.clone())])
            }

            WeddingAction::Publish { caller } => {
                let wedding = state.owned_by(&caller)?;
                match wedding.status {
                    WeddingStatus::Published => return Ok(vec![]),
                    WeddingStatus::Draft => wedding.ensure_publishable()?,
                    WeddingStatus::Archived | WeddingStatus::Expired => {
                        return Err(RsvpError::validation(
                            "status",
                            format!("a {} wedding cannot be published", wedding.status.as_str()),
                        ));
                    }
                }
                let at = next_updated_at(wedding.updated_at, env.clock.now());
                wedding.status = WeddingStatus::Published;
                wedding.updated_at = at;
                if wedding.published_at.is_none() {
                    wedding.published_at = Some(at);
                }
                Ok(vec![WeddingEffect::SetStatus {
                    id: wedding.id,
                    status: WeddingStatus::Published,
                    at,
                }])
            }

            WeddingAction::Archive { caller } => {
                let wedding = state.owned_by(&caller)?;
                if wedding.status == WeddingStatus::Archived {
                    return Ok(vec![]);
                }
                let at = next_updated_at(wedding.updated_at, env.clock.now());
                wedding.status = WeddingStatus::Archived;
                wedding.updated_at = at;
                Ok(vec![WeddingEffect::SetStatus {
                    id: wedding.id,
                    status: WeddingStatus::Archived,
                    at,
                }])
            }

            WeddingAction::Delete { caller } => {
                let id = state.owned_by(&caller)?.id;
                state.wedding = None;
                Ok(vec![WeddingEffect::Delete(id)])
            }
        }
    }
}
