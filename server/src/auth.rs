//! Bearer-token authentication.
//!
//! Accounts live with an external identity provider; this service only checks
//! the tokens it issues. [`TokenVerifier`] is the seam, [`JwtVerifier`] the
//! shipped implementation: HS256 compact JWTs whose `sub` claim is the user id
//! and whose `exp` claim (unix seconds) is in the future.
//!
//! Handlers take [`AuthUser`] when a caller must be signed in and
//! [`MaybeAuthUser`] when anonymous callers are allowed but owners get more.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use thiserror::Error;
use wedding_rsvp_core::UserId;
use wedding_rsvp_core::environment::Clock;
use wedding_rsvp_web::AppError;

type HmacSha256 = Hmac<Sha256>;

/// User id granted to holders of the configured test token.
pub const TEST_USER_ID: &str = "dev-user";

/// Why a bearer token was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization: Bearer` header.
    #[error("missing bearer token")]
    Missing,
    /// Not a well-formed compact JWT.
    #[error("malformed token")]
    Malformed,
    /// Header names an algorithm other than HS256.
    #[error("unsupported token algorithm")]
    UnsupportedAlgorithm,
    /// Signature does not match.
    #[error("invalid token signature")]
    BadSignature,
    /// `exp` is in the past.
    #[error("token expired")]
    Expired,
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        Self::unauthenticated(err.to_string())
    }
}

/// Checks bearer tokens.
pub trait TokenVerifier: Send + Sync {
    /// The account a token belongs to.
    ///
    /// # Errors
    ///
    /// [`AuthError`] if the token is not acceptable.
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

/// Claims read from a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry, unix seconds.
    pub exp: i64,
}

/// HS256 verifier with an optional static development token.
pub struct JwtVerifier {
    key: Vec<u8>,
    test_token: Option<String>,
    clock: Arc<dyn Clock>,
}

impl JwtVerifier {
    /// Verifier keyed with `secret`.
    #[must_use]
    pub fn new(secret: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            test_token: None,
            clock,
        }
    }

    /// Also accept `token` verbatim as [`TEST_USER_ID`].
    #[must_use]
    pub fn with_test_token(mut self, token: Option<String>) -> Self {
        self.test_token = token;
        self
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.key).map_err(|_| AuthError::Malformed)
    }

    /// Issue a token for `user` expiring at `exp`.
    ///
    /// Issuance belongs to the identity provider; this exists for local
    /// development and tests.
    ///
    /// # Errors
    ///
    /// [`AuthError::Malformed`] if the claims cannot be encoded.
    pub fn sign(&self, user: &UserId, exp: DateTime<Utc>) -> Result<String, AuthError> {
        let header = Header {
            alg: "HS256".into(),
            typ: Some("JWT".into()),
        };
        let claims = Claims {
            sub: user.as_str().to_string(),
            exp: exp.timestamp(),
        };
        let signing_input = format!("{}.{}", encode_part(&header)?, encode_part(&claims)?);

        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signing_input}.{signature}"))
    }

    fn decode_part<T: for<'de> Deserialize<'de>>(part: &str) -> Result<T, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|_| AuthError::Malformed)?;
        serde_json::from_slice(&bytes).map_err(|_| AuthError::Malformed)
    }
}

fn encode_part<T: Serialize>(value: &T) -> Result<String, AuthError> {
    let json = serde_json::to_vec(value).map_err(|_| AuthError::Malformed)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if let Some(expected) = &self.test_token {
            if constant_time_eq::constant_time_eq(token.as_bytes(), expected.as_bytes()) {
                return Ok(UserId::new(TEST_USER_ID));
            }
        }

        let (signing_input, signature) = token.rsplit_once('.').ok_or(AuthError::Malformed)?;
        let (header, payload) = signing_input
            .split_once('.')
            .filter(|(_, payload)| !payload.contains('.'))
            .ok_or(AuthError::Malformed)?;

        let header: Header = Self::decode_part(header)?;
        if header.alg != "HS256" {
            return Err(AuthError::UnsupportedAlgorithm);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let claims: Claims = Self::decode_part(payload)?;
        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::Expired);
        }
        if claims.sub.trim().is_empty() {
            return Err(AuthError::Malformed);
        }
        Ok(UserId::new(claims.sub))
    }
}

fn bearer(parts: &Parts) -> Result<Option<&str>, AuthError> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;
    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(Some(token.trim()))
        }
        _ => Err(AuthError::Malformed),
    }
}

/// A signed-in caller. Rejects with 401 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<dyn TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?.ok_or(AuthError::Missing)?;
        let verifier = Arc::<dyn TokenVerifier>::from_ref(state);
        let user = verifier.verify(token)?;
        tracing::Span::current().record("user_id", user.as_str());
        Ok(Self(user))
    }
}

/// A caller who may be anonymous.
///
/// A missing header yields `None`; a header that is present but invalid is
/// still rejected with 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaybeAuthUser(pub Option<UserId>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    Arc<dyn TokenVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer(parts)? else {
            return Ok(Self(None));
        };
        let verifier = Arc::<dyn TokenVerifier>::from_ref(state);
        Ok(Self(Some(verifier.verify(token)?)))
    }
}
