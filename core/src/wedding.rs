//! The wedding invitation document.
//!
//! A wedding is created as a `draft`, becomes `published` on owner action and
//! may later be `archived` or `expired`. Only a published wedding with
//! `is_public = true` is reachable through its slug on the public path.
//!
//! Counters (`rsvp_count`, `guest_count`, `total_attending`) are a cache for
//! listing views. They are written only by the counter reconciler; nothing in
//! this module touches them.

use crate::error::{Result, RsvpError};
use crate::id::{UserId, WeddingId};
use crate::slug::Slug;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Upper bound for `RsvpSettings::max_plus_ones`.
pub const MAX_PLUS_ONES_LIMIT: u8 = 5;

/// Lifecycle state of a wedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeddingStatus {
    /// Being composed; not reachable publicly.
    Draft,
    /// Live at its slug.
    Published,
    /// The event is over.
    Expired,
    /// Retired by the owner.
    Archived,
}

impl WeddingStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Expired => "expired",
            Self::Archived => "archived",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "expired" => Some(Self::Expired),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

/// One half of the couple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    /// Given name.
    #[serde(alias = "first")]
    pub first_name: String,
    /// Family name.
    #[serde(default, alias = "last")]
    pub last_name: String,
    /// Reference to an uploaded portrait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl Partner {
    fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Couple details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Couple {
    /// First partner.
    pub partner1: Partner,
    /// Second partner.
    pub partner2: Partner,
    /// Shared story shown on the invitation page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story: Option<String>,
}

/// Where and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// Event title (e.g. "Ceremony").
    pub title: String,
    /// Calendar date of the event.
    pub date: NaiveDate,
    /// Local start time as entered by the couple.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Venue name.
    pub venue_name: String,
    /// Venue street address.
    pub venue_address: String,
    /// Link to a map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_url: Option<String>,
    /// Dress code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dress_code: Option<String>,
}

/// Visual theme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    /// Palette as CSS colour strings.
    #[serde(default)]
    pub palette: Vec<String>,
    /// Font family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    /// Opaque front-end settings.
    #[serde(default)]
    pub custom_settings: serde_json::Value,
}

/// Answer type of a custom question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// Free text.
    Text,
    /// Exactly one of `options`.
    SingleChoice,
    /// Any subset of `options`.
    MultipleChoice,
    /// Yes or no.
    YesNo,
}

/// A question the couple adds to the RSVP form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomQuestion {
    /// Stable id referenced by answers.
    pub id: String,
    /// Question text.
    pub question: String,
    /// Answer type.
    #[serde(rename = "type", default = "default_question_kind")]
    pub kind: QuestionKind,
    /// Whether every response must answer it.
    #[serde(default)]
    pub required: bool,
    /// Choices for the choice kinds.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

const fn default_question_kind() -> QuestionKind {
    QuestionKind::Text
}

const fn default_true() -> bool {
    true
}

const fn default_max_plus_ones() -> u8 {
    1
}

/// RSVP intake settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpSettings {
    /// Whether responses are accepted at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Last moment a public response is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Whether responders may bring plus-ones.
    #[serde(default = "default_true")]
    pub allow_plus_one: bool,
    /// Plus-ones per response, 0 to 5.
    #[serde(default = "default_max_plus_ones")]
    pub max_plus_ones: u8,
    /// Ask for an e-mail address.
    #[serde(default = "default_true")]
    pub collect_email: bool,
    /// Ask for a phone number.
    #[serde(default)]
    pub collect_phone: bool,
    /// Ask about dietary requirements.
    #[serde(default = "default_true")]
    pub collect_dietary: bool,
    /// Extra questions in display order.
    #[serde(default)]
    pub custom_questions: Vec<CustomQuestion>,
}

impl Default for RsvpSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            deadline: None,
            allow_plus_one: true,
            max_plus_ones: default_max_plus_ones(),
            collect_email: true,
            collect_phone: false,
            collect_dietary: true,
            custom_questions: Vec::new(),
        }
    }
}

impl RsvpSettings {
    /// Plus-ones a single response may carry right now.
    #[must_use]
    pub const fn effective_plus_one_cap(&self) -> u8 {
        if self.allow_plus_one {
            self.max_plus_ones
        } else {
            0
        }
    }

    /// Look up a custom question by id.
    #[must_use]
    pub fn question(&self, id: &str) -> Option<&CustomQuestion> {
        self.custom_questions.iter().find(|q| q.id == id)
    }

    /// Whether a response submitted at `now` is still on time.
    #[must_use]
    pub fn deadline_open(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_none_or(|deadline| now <= deadline)
    }

    /// Check bounds and question definitions.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] with a path under `rsvp`.
    pub fn validate(&self) -> Result<()> {
        if self.max_plus_ones > MAX_PLUS_ONES_LIMIT {
            return Err(RsvpError::validation(
                "rsvp.max_plus_ones",
                format!("must be between 0 and {MAX_PLUS_ONES_LIMIT}"),
            ));
        }

        let mut seen = HashSet::new();
        for (i, q) in self.custom_questions.iter().enumerate() {
            if q.id.trim().is_empty() {
                return Err(RsvpError::validation(
                    format!("rsvp.custom_questions[{i}].id"),
                    "is required",
                ));
            }
            if !seen.insert(q.id.as_str()) {
                return Err(RsvpError::validation(
                    format!("rsvp.custom_questions[{i}].id"),
                    format!("duplicate question id '{}'", q.id),
                ));
            }
            if q.question.trim().is_empty() {
                return Err(RsvpError::validation(
                    format!("rsvp.custom_questions[{i}].question"),
                    "is required",
                ));
            }
            let needs_options = matches!(
                q.kind,
                QuestionKind::SingleChoice | QuestionKind::MultipleChoice
            );
            if needs_options && q.options.is_empty() {
                return Err(RsvpError::validation(
                    format!("rsvp.custom_questions[{i}].options"),
                    "choice questions need at least one option",
                ));
            }
        }
        Ok(())
    }
}

/// Denormalized counters carried on the wedding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeddingCounters {
    /// Number of RSVPs.
    pub rsvp_count: u64,
    /// Number of pre-registered guests.
    pub guest_count: u64,
    /// Sum of `attendance_count` over attending RSVPs.
    pub total_attending: u64,
    /// Public page views.
    pub view_count: u64,
}

/// Counters written by the reconciler in one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Number of RSVPs.
    pub rsvp_count: u64,
    /// Number of pre-registered guests.
    pub guest_count: u64,
    /// Sum of `attendance_count` over attending RSVPs.
    pub total_attending: u64,
}

/// A wedding invitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wedding {
    /// Document id.
    pub id: WeddingId,
    /// Owning account.
    pub user_id: UserId,
    /// Public address.
    pub slug: Slug,
    /// Page title.
    pub title: String,
    /// Couple details.
    pub couple: Option<Couple>,
    /// Event details.
    pub event: Option<EventDetails>,
    /// Visual theme.
    pub theme: Theme,
    /// RSVP intake settings.
    pub rsvp: RsvpSettings,
    /// Whether a published wedding is reachable by slug.
    pub is_public: bool,
    /// Lifecycle state.
    pub status: WeddingStatus,
    /// Cached counts.
    #[serde(flatten)]
    pub counters: WeddingCounters,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last content change.
    pub updated_at: DateTime<Utc>,
    /// First publication.
    pub published_at: Option<DateTime<Utc>>,
    /// Last public view.
    pub last_viewed_at: Option<DateTime<Utc>>,
}

impl Wedding {
    /// Build a fresh draft from owner input.
    #[must_use]
    pub fn draft(id: WeddingId, owner: UserId, input: NewWedding, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: owner,
            slug: input.slug,
            title: input.title.trim().to_string(),
            couple: input.couple,
            event: input.event,
            theme: input.theme,
            rsvp: input.rsvp,
            is_public: input.is_public,
            status: WeddingStatus::Draft,
            counters: WeddingCounters::default(),
            created_at: now,
            updated_at: now,
            published_at: None,
            last_viewed_at: None,
        }
    }

    /// Whether `user` owns this wedding.
    #[must_use]
    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// Whether the public path may show this wedding.
    #[must_use]
    pub fn is_publicly_visible(&self) -> bool {
        self.is_public && self.status == WeddingStatus::Published
    }

    /// Check that couple and event are filled in well enough to publish.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] naming the first missing field.
    pub fn ensure_publishable(&self) -> Result<()> {
        let Some(couple) = &self.couple else {
            return Err(RsvpError::validation("couple", "is required to publish"));
        };
        if couple.partner1.first_name.trim().is_empty() {
            return Err(RsvpError::validation("couple.partner1.first_name", "is required to publish"));
        }
        if couple.partner2.first_name.trim().is_empty() {
            return Err(RsvpError::validation("couple.partner2.first_name", "is required to publish"));
        }

        let Some(event) = &self.event else {
            return Err(RsvpError::validation("event", "is required to publish"));
        };
        if event.title.trim().is_empty() {
            return Err(RsvpError::validation("event.title", "is required to publish"));
        }
        if event.venue_name.trim().is_empty() {
            return Err(RsvpError::validation("event.venue_name", "is required to publish"));
        }
        Ok(())
    }

    /// Lowercased text searched by free-text filters.
    fn search_haystack(&self) -> String {
        let mut text = format!("{} {}", self.title, self.slug);
        if let Some(couple) = &self.couple {
            text.push(' ');
            text.push_str(&couple.partner1.full_name());
            text.push(' ');
            text.push_str(&couple.partner2.full_name());
        }
        text.to_lowercase()
    }
}

/// Owner input for a new wedding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewWedding {
    /// Page title.
    pub title: String,
    /// Requested slug.
    pub slug: Slug,
    /// Couple details.
    #[serde(default)]
    pub couple: Option<Couple>,
    /// Event details.
    #[serde(default)]
    pub event: Option<EventDetails>,
    /// Visual theme.
    #[serde(default)]
    pub theme: Theme,
    /// RSVP intake settings.
    #[serde(default, alias = "rsvp_settings")]
    pub rsvp: RsvpSettings,
    /// Public flag.
    #[serde(default = "default_true")]
    pub is_public: bool,
}

impl NewWedding {
    /// Validate owner input.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] for a blank title or bad RSVP settings.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(RsvpError::validation("title", "is required"));
        }
        self.rsvp.validate()
    }
}

/// Partial update of a wedding. Absent fields are left untouched.
///
/// Status, counters and timestamps are not patchable.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WeddingPatch {
    /// New title.
    pub title: Option<String>,
    /// New slug.
    pub slug: Option<Slug>,
    /// Replacement couple details.
    pub couple: Option<Couple>,
    /// Replacement event details.
    pub event: Option<EventDetails>,
    /// Replacement theme.
    pub theme: Option<Theme>,
    /// Replacement RSVP settings.
    #[serde(alias = "rsvp_settings")]
    pub rsvp: Option<RsvpSettings>,
    /// New public flag.
    pub is_public: Option<bool>,
}

impl WeddingPatch {
    /// Validate the fields present in the patch.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] for a blank title or bad RSVP settings.
    pub fn validate(&self) -> Result<()> {
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(RsvpError::validation("title", "must not be blank"));
        }
        if let Some(rsvp) = &self.rsvp {
            rsvp.validate()?;
        }
        Ok(())
    }

    /// Apply the patch to `wedding` in place.
    pub fn apply(self, wedding: &mut Wedding) {
        if let Some(title) = self.title {
            wedding.title = title.trim().to_string();
        }
        if let Some(slug) = self.slug {
            wedding.slug = slug;
        }
        if let Some(couple) = self.couple {
            wedding.couple = Some(couple);
        }
        if let Some(event) = self.event {
            wedding.event = Some(event);
        }
        if let Some(theme) = self.theme {
            wedding.theme = theme;
        }
        if let Some(rsvp) = self.rsvp {
            wedding.rsvp = rsvp;
        }
        if let Some(is_public) = self.is_public {
            wedding.is_public = is_public;
        }
    }
}

/// Filters for wedding listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WeddingFilter {
    /// Only weddings in this state.
    pub status: Option<WeddingStatus>,
    /// Case-insensitive substring over title, slug and partner names.
    pub search: Option<String>,
}

impl WeddingFilter {
    /// Whether `wedding` passes the filter.
    #[must_use]
    pub fn matches(&self, wedding: &Wedding) -> bool {
        if self.status.is_some_and(|s| s != wedding.status) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                wedding.search_haystack().contains(&term.to_lowercase())
            }
            _ => true,
        }
    }
}
