//! Pre-registered invitees.
//!
//! Guests are owned by their wedding. A guest may carry a back-reference to
//! the RSVP it responded with, together with a mirror of that RSVP's status
//! and submission time for roster views.

use crate::error::{Result, RsvpError};
use crate::id::{GuestId, ImportBatchId, RsvpId, UserId, WeddingId};
use crate::rsvp::RsvpStatus;
use crate::{non_blank, normalize_email};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upper bound for a guest's personal plus-one allowance.
pub const GUEST_MAX_PLUS_ONES_LIMIT: u8 = 3;

/// Which side of the couple invited the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Invited by the bride.
    Bride,
    /// Invited by the groom.
    Groom,
    /// Shared invitee.
    #[default]
    Both,
}

impl Side {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bride => "bride",
            Self::Groom => "groom",
            Self::Both => "both",
        }
    }
}

/// Delivery state of the invitation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    /// Not sent yet.
    #[default]
    Pending,
    /// Handed to the mailer.
    Sent,
    /// Accepted by the recipient's server.
    Delivered,
    /// Opened by the recipient.
    Opened,
    /// Rejected by the recipient's server.
    Bounced,
}

impl InvitationStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Opened => "opened",
            Self::Bounced => "bounced",
        }
    }
}

/// RSVP fields mirrored onto a linked guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpLink {
    /// The linked response.
    pub rsvp_id: RsvpId,
    /// Its current status.
    pub rsvp_status: RsvpStatus,
    /// When it was submitted.
    pub rsvp_submitted_at: DateTime<Utc>,
}

/// A pre-registered invitee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    /// Document id.
    pub id: GuestId,
    /// Owning wedding.
    pub wedding_id: WeddingId,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Normalized e-mail, unique per wedding when present.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// Inviting side.
    pub side: Side,
    /// Whether this guest may bring plus-ones.
    pub plus_one_allowed: bool,
    /// Personal plus-one allowance, 0 to 3.
    pub max_plus_ones: u8,
    /// Delivery state of the invitation.
    pub invitation_status: InvitationStatus,
    /// Linked response.
    pub rsvp_id: Option<RsvpId>,
    /// Mirror of the linked response's status.
    pub rsvp_status: Option<RsvpStatus>,
    /// Mirror of the linked response's submission time.
    pub rsvp_submitted_at: Option<DateTime<Utc>>,
    /// Bulk import this guest came from.
    pub import_batch_id: Option<ImportBatchId>,
    /// Account that created the guest.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl Guest {
    /// Build a guest from validated input.
    #[must_use]
    pub fn from_new(
        id: GuestId,
        wedding_id: WeddingId,
        created_by: UserId,
        input: NewGuest,
        import_batch_id: Option<ImportBatchId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            wedding_id,
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email: input.email,
            phone: non_blank(input.phone),
            side: input.side,
            plus_one_allowed: input.plus_one_allowed,
            max_plus_ones: input.max_plus_ones,
            invitation_status: input.invitation_status,
            rsvp_id: None,
            rsvp_status: None,
            rsvp_submitted_at: None,
            import_batch_id,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Plus-ones this guest may bring, ignoring the wedding-level cap.
    #[must_use]
    pub const fn personal_plus_one_cap(&self) -> u8 {
        if self.plus_one_allowed {
            self.max_plus_ones
        } else {
            0
        }
    }

    /// Set or clear the mirrored RSVP fields.
    pub fn set_rsvp_link(&mut self, link: Option<RsvpLink>) {
        self.rsvp_id = link.map(|l| l.rsvp_id);
        self.rsvp_status = link.map(|l| l.rsvp_status);
        self.rsvp_submitted_at = link.map(|l| l.rsvp_submitted_at);
    }

    fn search_haystack(&self) -> String {
        format!(
            "{} {} {}",
            self.first_name,
            self.last_name,
            self.email.as_deref().unwrap_or_default()
        )
        .to_lowercase()
    }
}

/// Owner input for a guest.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewGuest {
    /// Given name.
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// E-mail address.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// Inviting side.
    #[serde(default)]
    pub side: Side,
    /// Whether the guest may bring plus-ones.
    #[serde(default)]
    pub plus_one_allowed: bool,
    /// Personal plus-one allowance.
    #[serde(default)]
    pub max_plus_ones: u8,
    /// Initial invitation state.
    #[serde(default)]
    pub invitation_status: InvitationStatus,
}

impl NewGuest {
    /// Validate and normalize the input. `prefix` is prepended to field paths,
    /// e.g. `guests[3]` for a bulk row.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] for a blank first name, a malformed
    /// e-mail or a plus-one allowance above the limit.
    pub fn normalized(mut self, prefix: &str) -> Result<Self> {
        let path = |field: &str| {
            if prefix.is_empty() {
                field.to_string()
            } else {
                format!("{prefix}.{field}")
            }
        };

        if self.first_name.trim().is_empty() {
            return Err(RsvpError::validation(path("first_name"), "is required"));
        }
        if self.max_plus_ones > GUEST_MAX_PLUS_ONES_LIMIT {
            return Err(RsvpError::validation(
                path("max_plus_ones"),
                format!("must be between 0 and {GUEST_MAX_PLUS_ONES_LIMIT}"),
            ));
        }
        self.email = normalize_email(&path("email"), self.email.as_deref())?;
        Ok(self)
    }
}

/// Partial update of a guest. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuestPatch {
    /// New given name.
    pub first_name: Option<String>,
    /// New family name.
    pub last_name: Option<String>,
    /// New e-mail; an empty string clears it.
    pub email: Option<String>,
    /// New phone; an empty string clears it.
    pub phone: Option<String>,
    /// New side.
    pub side: Option<Side>,
    /// New plus-one flag.
    pub plus_one_allowed: Option<bool>,
    /// New plus-one allowance.
    pub max_plus_ones: Option<u8>,
    /// New invitation state.
    pub invitation_status: Option<InvitationStatus>,
}

impl GuestPatch {
    /// Apply the patch to `guest`, validating the fields it touches.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] for a blank first name, a malformed
    /// e-mail or a plus-one allowance above the limit.
    pub fn apply(self, guest: &mut Guest) -> Result<()> {
        if let Some(first_name) = self.first_name {
            let first_name = first_name.trim();
            if first_name.is_empty() {
                return Err(RsvpError::validation("first_name", "must not be blank"));
            }
            guest.first_name = first_name.to_string();
        }
        if let Some(last_name) = self.last_name {
            guest.last_name = last_name.trim().to_string();
        }
        if let Some(email) = self.email {
            guest.email = normalize_email("email", Some(&email))?;
        }
        if let Some(phone) = self.phone {
            guest.phone = non_blank(Some(phone));
        }
        if let Some(side) = self.side {
            guest.side = side;
        }
        if let Some(allowed) = self.plus_one_allowed {
            guest.plus_one_allowed = allowed;
        }
        if let Some(max) = self.max_plus_ones {
            if max > GUEST_MAX_PLUS_ONES_LIMIT {
                return Err(RsvpError::validation(
                    "max_plus_ones",
                    format!("must be between 0 and {GUEST_MAX_PLUS_ONES_LIMIT}"),
                ));
            }
            guest.max_plus_ones = max;
        }
        if let Some(status) = self.invitation_status {
            guest.invitation_status = status;
        }
        Ok(())
    }
}

/// Filters for guest listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuestFilter {
    /// Only guests from this side.
    pub side: Option<Side>,
    /// Only guests in this invitation state.
    pub invitation_status: Option<InvitationStatus>,
    /// Only guests with (or without) a linked RSVP.
    pub has_rsvp: Option<bool>,
    /// Case-insensitive substring over names and e-mail.
    pub search: Option<String>,
}

impl GuestFilter {
    /// Whether `guest` passes the filter.
    #[must_use]
    pub fn matches(&self, guest: &Guest) -> bool {
        if self.side.is_some_and(|s| s != guest.side) {
            return false;
        }
        if self
            .invitation_status
            .is_some_and(|s| s != guest.invitation_status)
        {
            return false;
        }
        if self.has_rsvp.is_some_and(|h| h != guest.rsvp_id.is_some()) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => guest.search_haystack().contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

/// Failure of one row in a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkRowError {
    /// Zero-based row index in the request.
    pub row: usize,
    /// Contract-level error kind.
    pub kind: &'static str,
    /// Human readable reason.
    pub message: String,
}

/// Outcome of a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkImportReport {
    /// Batch id shared by every inserted guest.
    pub import_batch_id: ImportBatchId,
    /// Number of guests inserted.
    pub inserted: usize,
    /// Ids of the inserted guests in request order.
    pub guest_ids: Vec<GuestId>,
    /// Rows that were rejected.
    pub errors: Vec<BulkRowError>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn input(email: Option<&str>) -> NewGuest {
        NewGuest {
            first_name: " Ana ".into(),
            last_name: "Diaz".into(),
            email: email.map(str::to_string),
            phone: Some("  ".into()),
            side: Side::Bride,
            plus_one_allowed: true,
            max_plus_ones: 2,
            invitation_status: InvitationStatus::Pending,
        }
    }

    fn guest() -> Guest {
        let new = input(Some("Ana@Example.com")).normalized("").unwrap();
        Guest::from_new(
            GuestId::new(),
            WeddingId::new(),
            UserId::new("owner"),
            new,
            None,
            Utc::now(),
        )
    }

    #[test]
    fn normalizes_names_email_and_phone() {
        let guest = guest();
        assert_eq!(guest.first_name, "Ana");
        assert_eq!(guest.email.as_deref(), Some("ana@example.com"));
        assert_eq!(guest.phone, None);
        assert_eq!(guest.rsvp_id, None);
    }

    #[test]
    fn bulk_row_paths_are_prefixed() {
        let mut bad = input(Some("nope"));
        bad.max_plus_ones = 0;
        let err = bad.normalized("guests[4]").unwrap_err();
        assert!(matches!(err, RsvpError::Validation { field, .. } if field == "guests[4].email"));
    }

    #[test]
    fn plus_one_allowance_is_bounded() {
        let mut new = input(None);
        new.max_plus_ones = 4;
        assert!(new.normalized("").is_err());
    }

    #[test]
    fn patch_can_clear_email() {
        let mut guest = guest();
        GuestPatch {
            email: Some(String::new()),
            ..GuestPatch::default()
        }
        .apply(&mut guest)
        .unwrap();
        assert_eq!(guest.email, None);
    }

    #[test]
    fn filter_on_rsvp_presence() {
        let mut guest = guest();
        let with = GuestFilter {
            has_rsvp: Some(true),
            ..GuestFilter::default()
        };
        assert!(!with.matches(&guest));

        guest.set_rsvp_link(Some(RsvpLink {
            rsvp_id: RsvpId::new(),
            rsvp_status: RsvpStatus::Attending,
            rsvp_submitted_at: Utc::now(),
        }));
        assert!(with.matches(&guest));
        assert_eq!(guest.rsvp_status, Some(RsvpStatus::Attending));
    }

    #[test]
    fn personal_cap_respects_flag() {
        let mut guest = guest();
        assert_eq!(guest.personal_plus_one_cap(), 2);
        guest.plus_one_allowed = false;
        assert_eq!(guest.personal_plus_one_cap(), 0);
    }
}
