//! RSVP responses and their validation rules.
//!
//! The same checks run on submission and on every update, against the
//! wedding's settings at that moment:
//!
//! - first and last name are required
//! - `attendance_count >= 1`
//! - `plus_ones.len()` is within the effective cap ([`RsvpError::TooManyPlusOnes`])
//! - every answer refers to an existing question, and required questions are answered
//!
//! `plus_one_count` is always derived from `plus_ones`; it is never taken from input.

use crate::error::{Result, RsvpError};
use crate::id::{GuestId, RsvpId, WeddingId};
use crate::wedding::{QuestionKind, RsvpSettings};
use crate::{non_blank, normalize_email};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// A responder's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpStatus {
    /// Coming.
    Attending,
    /// Not coming.
    #[serde(alias = "not-attending")]
    NotAttending,
    /// Undecided.
    Maybe,
}

impl RsvpStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Attending => "attending",
            Self::NotAttending => "not_attending",
            Self::Maybe => "maybe",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attending" => Some(Self::Attending),
            "not_attending" | "not-attending" => Some(Self::NotAttending),
            "maybe" => Some(Self::Maybe),
            _ => None,
        }
    }
}

/// How the response reached the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpSource {
    /// The public invitation page.
    #[default]
    Web,
    /// A personal invitation link.
    DirectLink,
    /// A printed QR code.
    QrCode,
    /// Entered by the owner.
    Manual,
}

impl RsvpSource {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "web",
            Self::DirectLink => "direct_link",
            Self::QrCode => "qr_code",
            Self::Manual => "manual",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "web" => Some(Self::Web),
            "direct_link" => Some(Self::DirectLink),
            "qr_code" => Some(Self::QrCode),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// An extra attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlusOne {
    /// Given name.
    pub first_name: String,
    /// Family name.
    #[serde(default)]
    pub last_name: String,
    /// Dietary note for this attendee.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_notes: Option<String>,
}

/// An answer to one of the wedding's custom questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAnswer {
    /// Question being answered.
    pub question_id: String,
    /// The answer text. Multiple-choice answers list options separated by commas.
    pub answer: String,
}

/// A stored response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rsvp {
    /// Document id.
    pub id: RsvpId,
    /// Owning wedding.
    pub wedding_id: WeddingId,
    /// Linked pre-registered guest.
    pub guest_id: Option<GuestId>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Normalized e-mail, unique per wedding when present.
    pub email: Option<String>,
    /// Phone number.
    pub phone: Option<String>,
    /// The answer.
    pub status: RsvpStatus,
    /// Number of people this response covers.
    pub attendance_count: u32,
    /// Extra attendees in the order given.
    pub plus_ones: Vec<PlusOne>,
    /// Always `plus_ones.len()`.
    pub plus_one_count: u32,
    /// Free-text dietary notes.
    pub dietary_notes: Option<String>,
    /// Selected dietary options.
    pub dietary_selections: BTreeSet<String>,
    /// Answers in the order given.
    pub custom_answers: Vec<CustomAnswer>,
    /// Message to the couple.
    pub notes: Option<String>,
    /// Intake channel.
    pub source: RsvpSource,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether a confirmation was sent to the responder.
    pub confirmation_sent: bool,
    /// When the confirmation was sent.
    pub confirmation_sent_at: Option<DateTime<Utc>>,
}

impl Rsvp {
    /// Build a response from a validated submission.
    #[must_use]
    pub fn from_submission(
        id: RsvpId,
        wedding_id: WeddingId,
        guest_id: Option<GuestId>,
        submission: RsvpSubmission,
        source: RsvpSource,
        now: DateTime<Utc>,
    ) -> Self {
        let plus_one_count = count_u32(submission.plus_ones.len());
        Self {
            id,
            wedding_id,
            guest_id,
            first_name: submission.first_name,
            last_name: submission.last_name,
            email: submission.email,
            phone: submission.phone,
            status: submission.status,
            attendance_count: submission.attendance_count,
            plus_ones: submission.plus_ones,
            plus_one_count,
            dietary_notes: submission.dietary_notes,
            dietary_selections: submission.dietary_selections,
            custom_answers: submission.custom_answers,
            notes: submission.notes,
            source,
            submitted_at: now,
            updated_at: None,
            confirmation_sent: false,
            confirmation_sent_at: None,
        }
    }

    /// People this response adds to the headcount.
    #[must_use]
    pub const fn attending_headcount(&self) -> u32 {
        match self.status {
            RsvpStatus::Attending => self.attendance_count,
            RsvpStatus::NotAttending | RsvpStatus::Maybe => 0,
        }
    }

    /// Re-check the stored response against the wedding's current settings.
    ///
    /// # Errors
    ///
    /// See the module documentation.
    pub fn validate(&self, settings: &RsvpSettings, plus_one_cap: u8) -> Result<()> {
        check_names(&self.first_name, &self.last_name)?;
        check_response(
            self.attendance_count,
            &self.plus_ones,
            &self.custom_answers,
            settings,
            plus_one_cap,
        )
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

const fn default_attendance() -> u32 {
    1
}

/// A new response, from the public form or entered by the owner.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RsvpSubmission {
    /// Pre-registered guest this response belongs to (invitation links).
    #[serde(default)]
    pub guest_id: Option<GuestId>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// E-mail address.
    #[serde(default)]
    pub email: Option<String>,
    /// Phone number.
    #[serde(default)]
    pub phone: Option<String>,
    /// The answer.
    pub status: RsvpStatus,
    /// Number of people this response covers.
    #[serde(default = "default_attendance")]
    pub attendance_count: u32,
    /// Extra attendees.
    #[serde(default)]
    pub plus_ones: Vec<PlusOne>,
    /// Free-text dietary notes.
    #[serde(default)]
    pub dietary_notes: Option<String>,
    /// Selected dietary options.
    #[serde(default, alias = "dietary_restrictions")]
    pub dietary_selections: BTreeSet<String>,
    /// Answers to custom questions.
    #[serde(default)]
    pub custom_answers: Vec<CustomAnswer>,
    /// Message to the couple.
    #[serde(default)]
    pub notes: Option<String>,
    /// Intake channel; defaults to `web` on the public path.
    #[serde(default)]
    pub source: Option<RsvpSource>,
}

impl RsvpSubmission {
    /// Validate against `settings` and normalize free-text fields.
    ///
    /// # Errors
    ///
    /// See the module documentation. A malformed e-mail is a validation error
    /// on `email`.
    pub fn normalized(mut self, settings: &RsvpSettings, plus_one_cap: u8) -> Result<Self> {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        check_names(&self.first_name, &self.last_name)?;

        self.email = normalize_email("email", self.email.as_deref())?;
        self.phone = non_blank(self.phone);
        self.dietary_notes = non_blank(self.dietary_notes);
        self.notes = non_blank(self.notes);
        self.dietary_selections = normalize_selections(self.dietary_selections);
        self.plus_ones = normalize_plus_ones(self.plus_ones);

        check_response(
            self.attendance_count,
            &self.plus_ones,
            &self.custom_answers,
            settings,
            plus_one_cap,
        )?;
        Ok(self)
    }
}

/// Partial update of a response. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RsvpPatch {
    /// New answer.
    pub status: Option<RsvpStatus>,
    /// New headcount.
    pub attendance_count: Option<u32>,
    /// Replacement plus-ones.
    pub plus_ones: Option<Vec<PlusOne>>,
    /// New dietary notes; an empty string clears them.
    pub dietary_notes: Option<String>,
    /// Replacement dietary selections.
    #[serde(alias = "dietary_restrictions")]
    pub dietary_selections: Option<BTreeSet<String>>,
    /// Replacement answers.
    pub custom_answers: Option<Vec<CustomAnswer>>,
    /// New message; an empty string clears it.
    pub notes: Option<String>,
}

impl RsvpPatch {
    /// Apply the patch to `rsvp` and revalidate the result against `settings`.
    ///
    /// `rsvp` is left unchanged on error. Returns whether a field the wedding
    /// counters depend on changed (status, headcount or plus-one count).
    ///
    /// # Errors
    ///
    /// See the module documentation.
    pub fn apply(
        self,
        rsvp: &mut Rsvp,
        settings: &RsvpSettings,
        plus_one_cap: u8,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut next = rsvp.clone();

        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(attendance) = self.attendance_count {
            next.attendance_count = attendance;
        }
        if let Some(plus_ones) = self.plus_ones {
            next.plus_ones = normalize_plus_ones(plus_ones);
            next.plus_one_count = count_u32(next.plus_ones.len());
        }
        if let Some(notes) = self.dietary_notes {
            next.dietary_notes = non_blank(Some(notes));
        }
        if let Some(selections) = self.dietary_selections {
            next.dietary_selections = normalize_selections(selections);
        }
        if let Some(answers) = self.custom_answers {
            next.custom_answers = answers;
        }
        if let Some(notes) = self.notes {
            next.notes = non_blank(Some(notes));
        }

        next.validate(settings, plus_one_cap)?;
        next.updated_at = Some(now);

        let affects_counters = next.status != rsvp.status
            || next.attendance_count != rsvp.attendance_count
            || next.plus_one_count != rsvp.plus_one_count;
        *rsvp = next;
        Ok(affects_counters)
    }
}

/// Filters for response listings and exports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RsvpFilter {
    /// Only this answer.
    pub status: Option<RsvpStatus>,
    /// Only this intake channel.
    pub source: Option<RsvpSource>,
    /// Case-insensitive substring over names and e-mail.
    pub search: Option<String>,
    /// Submitted at or after.
    pub submitted_after: Option<DateTime<Utc>>,
    /// Submitted at or before.
    pub submitted_before: Option<DateTime<Utc>>,
}

impl RsvpFilter {
    /// Whether `rsvp` passes the filter.
    #[must_use]
    pub fn matches(&self, rsvp: &Rsvp) -> bool {
        if self.status.is_some_and(|s| s != rsvp.status) {
            return false;
        }
        if self.source.is_some_and(|s| s != rsvp.source) {
            return false;
        }
        if self.submitted_after.is_some_and(|t| rsvp.submitted_at < t) {
            return false;
        }
        if self.submitted_before.is_some_and(|t| rsvp.submitted_at > t) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => rsvp.search_haystack().contains(&term.to_lowercase()),
            _ => true,
        }
    }
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

fn normalize_selections(selections: BTreeSet<String>) -> BTreeSet<String> {
    selections
        .into_iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn normalize_plus_ones(plus_ones: Vec<PlusOne>) -> Vec<PlusOne> {
    plus_ones
        .into_iter()
        .map(|p| PlusOne {
            first_name: p.first_name.trim().to_string(),
            last_name: p.last_name.trim().to_string(),
            dietary_notes: non_blank(p.dietary_notes),
        })
        .collect()
}

fn check_names(first_name: &str, last_name: &str) -> Result<()> {
    if first_name.trim().is_empty() {
        return Err(RsvpError::validation("first_name", "is required"));
    }
    if last_name.trim().is_empty() {
        return Err(RsvpError::validation("last_name", "is required"));
    }
    Ok(())
}

fn check_response(
    attendance_count: u32,
    plus_ones: &[PlusOne],
    answers: &[CustomAnswer],
    settings: &RsvpSettings,
    plus_one_cap: u8,
) -> Result<()> {
    if attendance_count < 1 {
        return Err(RsvpError::validation("attendance_count", "must be at least 1"));
    }

    if plus_ones.len() > usize::from(plus_one_cap) {
        return Err(RsvpError::TooManyPlusOnes {
            max: plus_one_cap,
            given: plus_ones.len(),
        });
    }
    for (i, plus_one) in plus_ones.iter().enumerate() {
        if plus_one.first_name.trim().is_empty() {
            return Err(RsvpError::validation(
                format!("plus_ones[{i}].first_name"),
                "is required",
            ));
        }
    }

    check_answers(answers, settings)
}

fn check_answers(answers: &[CustomAnswer], settings: &RsvpSettings) -> Result<()> {
    let mut answered = HashSet::new();
    for (i, answer) in answers.iter().enumerate() {
        let Some(question) = settings.question(&answer.question_id) else {
            return Err(RsvpError::validation(
                format!("custom_answers[{i}].question_id"),
                format!("unknown question '{}'", answer.question_id),
            ));
        };
        if !answered.insert(answer.question_id.as_str()) {
            return Err(RsvpError::validation(
                format!("custom_answers[{i}].question_id"),
                "question answered more than once",
            ));
        }

        let value = answer.answer.trim();
        let allowed = match question.kind {
            QuestionKind::Text => true,
            _ if value.is_empty() => true,
            QuestionKind::YesNo => {
                value.eq_ignore_ascii_case("yes") || value.eq_ignore_ascii_case("no")
            }
            QuestionKind::SingleChoice => question.options.iter().any(|o| o == value),
            QuestionKind::MultipleChoice => value
                .split(',')
                .map(str::trim)
                .all(|v| question.options.iter().any(|o| o == v)),
        };
        if !allowed {
            return Err(RsvpError::validation(
                format!("custom_answers[{i}].answer"),
                "is not one of the allowed options",
            ));
        }
    }

    for question in settings.custom_questions.iter().filter(|q| q.required) {
        let present = answers
            .iter()
            .any(|a| a.question_id == question.id && !a.answer.trim().is_empty());
        if !present {
            return Err(RsvpError::validation(
                format!("custom_answers.{}", question.id),
                "is required",
            ));
        }
    }
    Ok(())
}
