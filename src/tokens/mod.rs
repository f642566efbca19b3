//! # Verified-value tokens
//!
//! Some schema fields only accept values that arrive as a cryptographically
//! signed token: the client proves the value was checked out of band (an
//! email confirmation, a phone confirmation) before the engine will store
//! it. The row codec consumes this module through the [`TokenVerifier`]
//! trait; the shipped implementation is a stateless HS256 JWT verifier.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::names::QName;

/// How a verified value was confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationKind {
    /// Confirmed through an email round trip
    Email,
    /// Confirmed through a phone round trip
    Phone,
}

impl VerificationKind {
    /// Returns the kind name used inside token claims
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationKind::Email => "email",
            VerificationKind::Phone => "phone",
        }
    }
}

/// Structured payload extracted from a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedValue {
    /// Type the value was verified for
    pub entity: QName,
    /// Field the value was verified for
    pub field: String,
    /// How the value was confirmed
    pub kind: VerificationKind,
    /// The confirmed value
    pub value: String,
}

/// Token verification errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token has expired
    #[error("token expired")]
    Expired,

    /// Token signature is invalid
    #[error("invalid token signature")]
    InvalidSignature,

    /// Token is malformed or its claims do not parse
    #[error("malformed token")]
    Malformed,

    /// Token issuance failed
    #[error("internal error: token issuance failed")]
    IssueFailed,
}

/// Result type for token operations
pub type TokenResult<T> = Result<T, TokenError>;

/// Validates a presented token and returns its structured payload
pub trait TokenVerifier: Send + Sync {
    /// Verify a token string and extract the verified value
    fn verify(&self, token: &str) -> TokenResult<VerifiedValue>;
}

/// Claims carried by a verified-value token
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VerifiedValueClaims {
    /// Entity the value belongs to (`pkg.entity`)
    entity: String,
    /// Field the value belongs to
    field: String,
    /// Verification kind name
    kind: String,
    /// The confirmed value
    value: String,
    /// Issued at (Unix epoch seconds)
    iat: i64,
    /// Expiration (Unix epoch seconds)
    exp: i64,
    /// Issuer
    iss: String,
}

/// Stateless JWT-backed verifier.
///
/// Tokens are HS256-signed with a shared secret. Validation checks the
/// signature, the expiration window and the issuer; no storage lookup is
/// involved.
#[derive(Clone)]
pub struct JwtVerifier {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtVerifier {
    /// Create a verifier from a shared secret
    pub fn new(secret: &[u8], issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a token for an already-confirmed value.
    ///
    /// The issuing side lives with the verification flow, not this engine;
    /// the method exists so embedders and tests can mint tokens against the
    /// same secret.
    pub fn issue(&self, payload: &VerifiedValue, ttl: Duration) -> TokenResult<String> {
        let now = Utc::now();
        let claims = VerifiedValueClaims {
            entity: payload.entity.to_string(),
            field: payload.field.clone(),
            kind: payload.kind.as_str().to_string(),
            value: payload.value.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.issuer.clone(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| TokenError::IssueFailed)
    }
}

impl TokenVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> TokenResult<VerifiedValue> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["exp", "iss"]);

        let data = decode::<VerifiedValueClaims>(token, &self.decoding_key, &validation).map_err(
            |e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            },
        )?;

        let claims = data.claims;
        let entity = QName::parse(&claims.entity).map_err(|_| TokenError::Malformed)?;
        let kind = match claims.kind.as_str() {
            "email" => VerificationKind::Email,
            "phone" => VerificationKind::Phone,
            _ => return Err(TokenError::Malformed),
        };
        Ok(VerifiedValue {
            entity,
            field: claims.field,
            kind,
            value: claims.value,
        })
    }
}
