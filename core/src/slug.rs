//! Public wedding addresses.
//!
//! A slug is 3 to 50 characters of lowercase ASCII letters and digits, split
//! into groups by single hyphens (`alex-and-sam`, `2026-smith`). Input is
//! trimmed and lowercased before it is checked, so `"  Alex-And-Sam "` and
//! `"alex-and-sam"` name the same wedding.

use crate::error::{Result, RsvpError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum slug length.
pub const MIN_LEN: usize = 3;

/// Maximum slug length.
pub const MAX_LEN: usize = 50;

/// Slugs that collide with top-level routes.
pub const RESERVED: &[&str] = &["admin", "api", "public", "health"];

/// A validated, normalized slug.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Normalize and validate `input`.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] on field `slug` when the normalized
    /// value has the wrong length or shape, or is reserved.
    pub fn parse(input: &str) -> Result<Self> {
        let slug = input.trim().to_lowercase();

        if !(MIN_LEN..=MAX_LEN).contains(&slug.len()) {
            return Err(RsvpError::validation(
                "slug",
                format!("must be between {MIN_LEN} and {MAX_LEN} characters"),
            ));
        }
        if !has_slug_shape(&slug) {
            return Err(RsvpError::validation(
                "slug",
                "may only contain lowercase letters, digits and single hyphens between them",
            ));
        }
        if RESERVED.contains(&slug.as_str()) {
            return Err(RsvpError::validation("slug", format!("'{slug}' is reserved")));
        }

        Ok(Self(slug))
    }

    /// Borrow the slug.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// `^[a-z0-9]+(-[a-z0-9]+)*$`
fn has_slug_shape(s: &str) -> bool {
    s.split('-').all(|group| {
        !group.is_empty()
            && group
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
    })
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = RsvpError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalizes_case_and_whitespace() {
        let slug = Slug::parse("  Alex-And-Sam ").unwrap();
        assert_eq!(slug.as_str(), "alex-and-sam");
    }

    #[test]
    fn rejects_bad_shapes() {
        for bad in ["ab", "-abc", "abc-", "a--b", "a_b_c", "hello world", "ünïcode"] {
            assert!(Slug::parse(bad).is_err(), "{bad} should be rejected");
        }
        assert!(Slug::parse(&"a".repeat(51)).is_err());
        assert!(Slug::parse(&"a".repeat(50)).is_ok());
    }

    #[test]
    fn reserved_words_are_rejected() {
        for word in RESERVED {
            assert!(Slug::parse(word).is_err());
        }
        assert!(Slug::parse("API").is_err());
        assert!(Slug::parse("admins").is_ok());
    }

    #[test]
    fn deserializes_through_validation() {
        let slug: Slug = serde_json::from_str("\"Our-Day\"").unwrap();
        assert_eq!(slug.as_str(), "our-day");
        assert!(serde_json::from_str::<Slug>("\"x\"").is_err());
    }

    proptest! {
        #[test]
        fn valid_shapes_are_accepted(s in "[a-z0-9]{3,10}(-[a-z0-9]{1,8}){0,3}") {
            prop_assume!(!RESERVED.contains(&s.as_str()));
            let slug = Slug::parse(&s).unwrap();
            prop_assert_eq!(slug.as_str(), s.as_str());
        }

        #[test]
        fn parse_is_idempotent(s in "[A-Za-z0-9-]{0,60}") {
            if let Ok(slug) = Slug::parse(&s) {
                prop_assert_eq!(Slug::parse(slug.as_str()).unwrap(), slug);
            }
        }
    }
}
