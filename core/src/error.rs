//! Error taxonomy for the RSVP core.
//!
//! Every failure a caller can observe has a contract-level kind (see
//! [`RsvpError::kind`]). Validation errors carry the path of the offending field
//! (for example `plus_ones[2].first_name`); storage errors wrap backend failures
//! with context.

/// Error type for wedding, guest and RSVP operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RsvpError {
    /// A wedding or guest does not exist.
    #[error("{resource} {id} not found")]
    NotFound {
        /// Kind of document that was looked up.
        resource: &'static str,
        /// The id or slug that was looked up.
        id: String,
    },

    /// Another wedding already uses the slug.
    #[error("slug '{0}' is already taken")]
    SlugTaken(String),

    /// An RSVP already exists for this e-mail address or guest.
    #[error("an RSVP has already been submitted for this {0}")]
    DuplicateRsvp(String),

    /// Another guest of the same wedding already uses the e-mail address.
    #[error("a guest with e-mail {0} already exists for this wedding")]
    DuplicateGuest(String),

    /// More plus-ones than the wedding allows.
    #[error("at most {max} plus-ones are allowed, got {given}")]
    TooManyPlusOnes {
        /// Effective cap at submission time.
        max: u8,
        /// Number of plus-ones in the request.
        given: usize,
    },

    /// The wedding no longer (or not yet) accepts responses.
    #[error("RSVPs are closed: {0}")]
    RsvpClosed(String),

    /// The edit window for a non-owner has elapsed.
    #[error("this RSVP can no longer be modified")]
    RsvpCannotModify,

    /// The RSVP does not exist.
    #[error("RSVP {0} not found")]
    RsvpNotFound(String),

    /// The wedding is not published or not public.
    #[error("this wedding is not public")]
    WeddingNotPublic,

    /// The caller does not own the wedding.
    #[error("you are not allowed to access this wedding")]
    Unauthorized,

    /// Input failed validation.
    #[error("{field}: {message}")]
    Validation {
        /// Path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Storage backend failure (I/O, serialization, deadline).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, RsvpError>;

impl RsvpError {
    /// Build a validation error for `field`.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Build a not-found error for a resource.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Wrap a backend error with context.
    #[must_use]
    pub fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    /// Contract-level name of this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::SlugTaken(_) => "SLUG_TAKEN",
            Self::DuplicateRsvp(_) => "DUPLICATE_RSVP",
            Self::DuplicateGuest(_) => "DUPLICATE_GUEST",
            Self::TooManyPlusOnes { .. } => "TOO_MANY_PLUS_ONES",
            Self::RsvpClosed(_) => "RSVP_CLOSED",
            Self::RsvpCannotModify => "RSVP_CANNOT_MODIFY",
            Self::RsvpNotFound(_) => "RSVP_NOT_FOUND",
            Self::WeddingNotPublic => "WEDDING_NOT_PUBLIC",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Validation { .. } => "VALIDATION",
            Self::Storage(_) => "STORAGE",
        }
    }

    /// Whether an automatic retry may succeed.
    ///
    /// Only storage failures are retried; everything else is a decision.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
