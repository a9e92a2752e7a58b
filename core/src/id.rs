//! Opaque identifiers.
//!
//! Documents are keyed by a 96-bit [`ObjectId`]:
//!
//! ```text
//! ┌────────────────────┬──────────────────────┬─────────────────┐
//! │ unix seconds (4 B) │ process random (5 B) │ counter (3 B)   │
//! └────────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! The timestamp prefix keeps index inserts roughly append-only and makes ids
//! sort by creation second. The hex form is 24 lowercase characters.

use crate::error::{Result, RsvpError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

/// 96-bit time-prefixed identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId([u8; 12]);

struct ProcessSeed {
    random: [u8; 5],
    counter: AtomicU32,
}

fn process_seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| ProcessSeed {
        random: rand::random(),
        counter: AtomicU32::new(rand::random::<u32>() & 0x00FF_FFFF),
    })
}

impl ObjectId {
    /// Allocate a new id stamped with the current time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    /// Allocate a new id stamped with `at`.
    #[must_use]
    pub fn with_timestamp(at: DateTime<Utc>) -> Self {
        let seed = process_seed();
        let count = seed.counter.fetch_add(1, Ordering::Relaxed);
        // Seconds before 1970 or after 2106 saturate.
        let secs = u32::try_from(at.timestamp().max(0)).unwrap_or(u32::MAX);

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&seed.random);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    /// Creation second encoded in the id.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        let secs = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        DateTime::from_timestamp(i64::from(secs), 0).unwrap_or_default()
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }

    /// Lowercase hex form (24 characters).
    #[must_use]
    pub fn to_hex(&self) -> String {
        use fmt::Write;
        self.0.iter().fold(String::with_capacity(24), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        })
    }

    /// Parse the 24-character hex form.
    ///
    /// # Errors
    ///
    /// Returns [`RsvpError::Validation`] if `input` is not 24 hex digits.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || RsvpError::validation("id", format!("'{input}' is not a valid id"));
        if input.len() != 24 || !input.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&input[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = RsvpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(ObjectId);

        impl $name {
            #[doc = concat!("Allocate a new `", stringify!($name), "`.")]
            #[must_use]
            pub fn new() -> Self {
                Self(ObjectId::new())
            }

            #[doc = concat!("Wrap an existing `ObjectId` as a `", stringify!($name), "`.")]
            #[must_use]
            pub const fn from_object_id(id: ObjectId) -> Self {
                Self(id)
            }

            /// The underlying object id.
            #[must_use]
            pub const fn as_object_id(&self) -> &ObjectId {
                &self.0
            }

            /// Parse the hex form.
            ///
            /// # Errors
            ///
            /// Returns [`RsvpError::Validation`] on malformed input.
            pub fn parse(input: &str) -> Result<Self> {
                ObjectId::parse(input).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = RsvpError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }
    };
}

document_id!(
    /// Identifier of a wedding document.
    WeddingId
);
document_id!(
    /// Identifier of a pre-registered guest.
    GuestId
);
document_id!(
    /// Identifier of an RSVP response.
    RsvpId
);
document_id!(
    /// Identifier shared by all guests created in one bulk import.
    ImportBatchId
);

/// Identifier of an account, as asserted by the authentication collaborator.
///
/// Account ids are issued elsewhere, so they are kept as opaque strings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Wrap an account id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
