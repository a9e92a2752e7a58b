//! Ready-made inputs.
//!
//! The wedding fixture matches a typical invitation: both partners named, an
//! event in June 2026, up to two plus-ones per response.

#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

use serde_json::json;
use wedding_rsvp_core::{NewGuest, NewWedding, PlusOne, RsvpStatus, RsvpSubmission, UserId};

/// The account that owns fixture weddings.
#[must_use]
pub fn owner() -> UserId {
    UserId::new("user-owner-1")
}

/// An account that owns nothing.
#[must_use]
pub fn stranger() -> UserId {
    UserId::new("user-stranger-9")
}

/// A publishable wedding at `slug` allowing two plus-ones.
#[must_use]
pub fn new_wedding(slug: &str) -> NewWedding {
    serde_json::from_value(json!({
        "title": "J&J Wedding",
        "slug": slug,
        "couple": {"partner1": {"first": "Jay"}, "partner2": {"first": "Jo"}},
        "event": {
            "title": "Ceremony",
            "date": "2026-06-20",
            "venue_name": "Hall",
            "venue_address": "1 Rd"
        },
        "rsvp": {"max_plus_ones": 2}
    }))
    .unwrap()
}

/// A wedding without couple or event details, which cannot be published.
#[must_use]
pub fn bare_wedding(slug: &str) -> NewWedding {
    serde_json::from_value(json!({"title": "Untitled", "slug": slug})).unwrap()
}

/// An attending response for one person with the given plus-ones.
#[must_use]
pub fn submission(first_name: &str, email: Option<&str>, plus_ones: usize) -> RsvpSubmission {
    RsvpSubmission {
        guest_id: None,
        first_name: first_name.to_string(),
        last_name: "Lee".to_string(),
        email: email.map(str::to_string),
        phone: None,
        status: RsvpStatus::Attending,
        attendance_count: 1,
        plus_ones: (0..plus_ones)
            .map(|i| PlusOne {
                first_name: format!("Plus{i}"),
                last_name: "Lee".to_string(),
                dietary_notes: None,
            })
            .collect(),
        dietary_notes: None,
        dietary_selections: std::collections::BTreeSet::new(),
        custom_answers: Vec::new(),
        notes: None,
        source: None,
    }
}

/// A response with an explicit status and headcount.
#[must_use]
pub fn response(first_name: &str, email: &str, status: RsvpStatus, attendance: u32) -> RsvpSubmission {
    RsvpSubmission {
        status,
        attendance_count: attendance,
        ..submission(first_name, Some(email), 0)
    }
}

/// A guest with an e-mail address and one allowed plus-one.
#[must_use]
pub fn new_guest(first_name: &str, email: Option<&str>) -> NewGuest {
    NewGuest {
        first_name: first_name.to_string(),
        last_name: "Guest".to_string(),
        email: email.map(str::to_string),
        phone: None,
        side: wedding_rsvp_core::Side::Both,
        plus_one_allowed: true,
        max_plus_ones: 1,
        invitation_status: wedding_rsvp_core::InvitationStatus::Pending,
    }
}
